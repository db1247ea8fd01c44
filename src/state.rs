//! Run state threaded through the stage graph, and the per-field reducer that merges
//! each stage's partial update into it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EcoOpsError, Result};

pub const SEVERITY_RANGE: (u8, u8) = (1, 10);
pub const SCORE_RANGE: (u8, u8) = (0, 100);

/// Free-text hazard report that starts one run. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentReport(String);

impl IncidentReport {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EcoOpsError::Validation {
                message: "Report text cannot be empty".to_string(),
            });
        }
        Ok(Self(text))
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardData {
    #[serde(rename = "type")]
    pub hazard_type: String,
    pub location: String,
}

/// Accumulated record of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub messages: Vec<Message>,
    pub clarification_question: Option<String>,
    pub hazard: Option<HazardData>,
    pub severity: Option<u8>,
    pub population_affected: Option<u64>,
    pub action_plan: Option<Vec<String>>,
    pub response_score: Option<u8>,
    pub final_report: Option<String>,
    pub reasoning_log: Vec<String>,
}

/// Partial update produced by one stage. `None` leaves the prior value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub clarification_question: Option<String>,
    pub hazard: Option<HazardData>,
    pub severity: Option<u8>,
    pub population_affected: Option<u64>,
    pub action_plan: Option<Vec<String>>,
    pub response_score: Option<u8>,
    pub final_report: Option<String>,
    pub reasoning_log: Vec<String>,
}

/// Every public field of a finished run, as carried by the success event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub severity: u8,
    pub action_plan: Vec<String>,
    pub final_report: String,
    pub response_score: u8,
    pub hazard: HazardData,
    pub population_affected: u64,
}

impl RunState {
    /// Fresh state for a report: empty except for the report as the first user turn.
    pub fn seeded(report: &IncidentReport) -> Self {
        Self {
            messages: vec![Message {
                role: Role::User,
                content: report.text().to_string(),
            }],
            ..Self::default()
        }
    }

    /// Merge a stage's partial update.
    ///
    /// Scalar fields are right-biased: a supplied value replaces the old one, an absent
    /// one keeps it. `hazard` is write-once. `messages` and `reasoning_log` only append.
    /// Severity and score are clamped on write.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        if let Some(q) = update.clarification_question {
            self.clarification_question = Some(q);
        }

        if let Some(hazard) = update.hazard {
            match &self.hazard {
                None => self.hazard = Some(hazard),
                Some(existing) if *existing != hazard => {
                    warn!(
                        "ignoring hazard overwrite ({} at {}); hazard is already set",
                        hazard.hazard_type, hazard.location
                    );
                }
                Some(_) => {}
            }
        }

        if let Some(s) = update.severity {
            self.severity = Some(s.clamp(SEVERITY_RANGE.0, SEVERITY_RANGE.1));
        }
        if let Some(p) = update.population_affected {
            self.population_affected = Some(p);
        }
        if let Some(plan) = update.action_plan {
            self.action_plan = Some(plan);
        }
        if let Some(score) = update.response_score {
            self.response_score = Some(score.clamp(SCORE_RANGE.0, SCORE_RANGE.1));
        }
        if let Some(report) = update.final_report {
            self.final_report = Some(report);
        }

        self.reasoning_log.extend(update.reasoning_log);
    }

    /// Text of every dialogue turn, one per line.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All public fields, or `None` if any is still unset.
    pub fn summary(&self) -> Option<RunSummary> {
        Some(RunSummary {
            severity: self.severity?,
            action_plan: self.action_plan.clone()?,
            final_report: self.final_report.clone()?,
            response_score: self.response_score?,
            hazard: self.hazard.clone()?,
            population_affected: self.population_affected?,
        })
    }
}
