//! The four pipeline stages. Each reads the accumulated state, makes one model call and
//! returns a partial update; none of them touches the state directly.

use std::fmt;

use tracing::debug;

use crate::clients::{ModelBackend, ModelError};
use crate::extractor::{ActionChecklist, FieldSource, ImpactAssessment, clean_question};
use crate::prompts;
use crate::state::{HazardData, Message, Role, RunState, StateUpdate};

const BRIEFING_LOG_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Clarification,
    ImpactAssessment,
    ActionPlanning,
    Briefing,
}

impl Stage {
    /// Execution order. Fixed; there is no branching or re-entry.
    pub const SEQUENCE: [Stage; 4] = [
        Stage::Clarification,
        Stage::ImpactAssessment,
        Stage::ActionPlanning,
        Stage::Briefing,
    ];

    pub fn first() -> Stage {
        Stage::Clarification
    }

    /// The stage after this one, or `None` when the graph is done.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Clarification => Some(Stage::ImpactAssessment),
            Stage::ImpactAssessment => Some(Stage::ActionPlanning),
            Stage::ActionPlanning => Some(Stage::Briefing),
            Stage::Briefing => None,
        }
    }

    /// Wire name used as the `step` of this stage's event.
    pub fn step_name(self) -> &'static str {
        match self {
            Stage::Clarification => "clarification",
            Stage::ImpactAssessment => "impact",
            Stage::ActionPlanning => "action",
            Stage::Briefing => "briefing",
        }
    }

    pub async fn execute(
        self,
        state: &RunState,
        backend: &dyn ModelBackend,
    ) -> Result<StateUpdate, ModelError> {
        match self {
            Stage::Clarification => clarify(state, backend).await,
            Stage::ImpactAssessment => assess_impact(state, backend).await,
            Stage::ActionPlanning => plan_actions(state, backend).await,
            Stage::Briefing => brief(state, backend).await,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

async fn clarify(state: &RunState, backend: &dyn ModelBackend) -> Result<StateUpdate, ModelError> {
    let raw = backend
        .invoke(&prompts::clarification(&state.transcript()))
        .await?;
    let question = clean_question(&raw);

    Ok(StateUpdate {
        messages: vec![Message {
            role: Role::Assistant,
            content: question.clone(),
        }],
        clarification_question: Some(question),
        ..Default::default()
    })
}

async fn assess_impact(
    state: &RunState,
    backend: &dyn ModelBackend,
) -> Result<StateUpdate, ModelError> {
    // Only the citizen's turns describe the incident; the clarification question is ours.
    let report = state
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let raw = backend.invoke(&prompts::impact(&report)).await?;
    let extracted = ImpactAssessment::extract(&raw);
    log_provenance(Stage::ImpactAssessment, &extracted.fields);
    let impact = extracted.value;

    Ok(StateUpdate {
        reasoning_log: vec![format!("Impact Agent: Analyzed incident - {}", impact.summary)],
        hazard: Some(HazardData {
            hazard_type: impact.hazard_type,
            location: impact.location,
        }),
        severity: Some(impact.severity),
        population_affected: Some(impact.population_affected),
        ..Default::default()
    })
}

async fn plan_actions(
    state: &RunState,
    backend: &dyn ModelBackend,
) -> Result<StateUpdate, ModelError> {
    let raw = backend.invoke(&prompts::action(state)).await?;
    let extracted = ActionChecklist::extract(&raw);
    log_provenance(Stage::ActionPlanning, &extracted.fields);
    let plan = extracted.value;

    Ok(StateUpdate {
        reasoning_log: vec![format!(
            "Action Agent: Generated {} action steps - GreenPT Score: {}",
            plan.action_plan.len(),
            plan.greenpt_score
        )],
        action_plan: Some(plan.action_plan),
        response_score: Some(plan.greenpt_score),
        ..Default::default()
    })
}

async fn brief(state: &RunState, backend: &dyn ModelBackend) -> Result<StateUpdate, ModelError> {
    let report = backend.invoke(&prompts::briefing(state)).await?;
    let preview: String = report.chars().take(BRIEFING_LOG_PREVIEW_CHARS).collect();

    Ok(StateUpdate {
        reasoning_log: vec![format!(
            "Briefing Agent: Final report generated - {}...",
            preview
        )],
        final_report: Some(report),
        ..Default::default()
    })
}

fn log_provenance(stage: Stage, fields: &crate::extractor::FieldSet) {
    debug!(
        stage = %stage,
        parsed = fields.count(FieldSource::Parsed),
        recovered = fields.count(FieldSource::Recovered),
        defaulted = fields.count(FieldSource::Defaulted),
        "extraction provenance"
    );
}
