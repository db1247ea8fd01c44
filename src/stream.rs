//! Stream emitter: turns one pipeline run into an ordered stream of progress events
//! and serializes them as NDJSON.
//!
//! The stream is pull-driven. A stage's model call only starts when the consumer asks for
//! the next event, so a slow reader throttles the run and dropping the stream cancels the
//! in-flight call. Exactly one terminal event (`end` or `error`) closes every stream that is
//! read to completion.

use futures_util::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::error::{EcoOpsError, Result};
use crate::graph::PipelineRun;
use crate::stages::Stage;
use crate::state::{HazardData, RunState, RunSummary};

/// One line of the wire protocol: `{"step": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    Clarification {
        clarification_question: String,
    },
    Impact {
        severity: u8,
        population_affected: u64,
        hazard_data: HazardData,
    },
    Action {
        action_plan: Vec<String>,
        greenpt_score: u8,
    },
    Briefing {
        final_report: String,
    },
    End(EndPayload),
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPayload {
    pub severity: u8,
    pub action_plan: Vec<String>,
    pub final_report: String,
    pub greenpt_score: u8,
    pub hazard_data: HazardData,
    pub population_affected: u64,
}

impl From<RunSummary> for EndPayload {
    fn from(s: RunSummary) -> Self {
        Self {
            severity: s.severity,
            action_plan: s.action_plan,
            final_report: s.final_report,
            greenpt_score: s.response_score,
            hazard_data: s.hazard,
            population_affected: s.population_affected,
        }
    }
}

impl StreamEvent {
    /// The fields a completed stage made public.
    pub fn for_stage(stage: Stage, state: &RunState) -> Self {
        match stage {
            Stage::Clarification => StreamEvent::Clarification {
                clarification_question: state.clarification_question.clone().unwrap_or_default(),
            },
            Stage::ImpactAssessment => StreamEvent::Impact {
                severity: state.severity.unwrap_or(5),
                population_affected: state.population_affected.unwrap_or(0),
                hazard_data: state.hazard.clone().unwrap_or_else(|| HazardData {
                    hazard_type: "unknown".to_string(),
                    location: "unknown".to_string(),
                }),
            },
            Stage::ActionPlanning => StreamEvent::Action {
                action_plan: state.action_plan.clone().unwrap_or_default(),
                greenpt_score: state.response_score.unwrap_or(75),
            },
            Stage::Briefing => StreamEvent::Briefing {
                final_report: state.final_report.clone().unwrap_or_default(),
            },
        }
    }

    /// Success event for a finished run, or an error if any public field is missing.
    pub fn terminal(state: &RunState) -> Self {
        match state.summary() {
            Some(summary) => StreamEvent::End(summary.into()),
            None => StreamEvent::Error {
                error: "run finished without a complete assessment".to_string(),
            },
        }
    }

    pub fn step(&self) -> &'static str {
        match self {
            StreamEvent::Clarification { .. } => "clarification",
            StreamEvent::Impact { .. } => "impact",
            StreamEvent::Action { .. } => "action",
            StreamEvent::Briefing { .. } => "briefing",
            StreamEvent::End(_) => "end",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End(_) | StreamEvent::Error { .. })
    }
}

struct Emitter {
    run: PipelineRun,
    terminated: bool,
}

impl Emitter {
    fn finish(&mut self, event: &StreamEvent) {
        self.terminated = true;
        info!(run_id = %self.run.id(), outcome = event.step(), "run finished");
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        if !self.terminated {
            warn!(
                run_id = %self.run.id(),
                "event stream dropped before its terminal event; run cancelled"
            );
        }
    }
}

/// Drive `run` to the end, yielding one event per completed stage and then one terminal event.
pub fn event_stream(run: PipelineRun) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let emitter = Emitter {
        run,
        terminated: false,
    };
    stream::unfold(Some(emitter), |slot| async move {
        let mut emitter = slot?;
        match emitter.run.advance().await {
            Ok(Some(stage)) => {
                let event = StreamEvent::for_stage(stage, emitter.run.state());
                Some((event, Some(emitter)))
            }
            Ok(None) => {
                let event = StreamEvent::terminal(emitter.run.state());
                emitter.finish(&event);
                Some((event, None))
            }
            Err(e) => {
                let event = StreamEvent::Error {
                    error: e.to_string(),
                };
                emitter.finish(&event);
                Some((event, None))
            }
        }
    })
}

/// One NDJSON line, newline included.
pub fn encode_line(event: &StreamEvent) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

/// Encoded byte stream for a chunked HTTP body.
pub fn ndjson_stream(run: PipelineRun) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
    event_stream(run).map(|event| {
        encode_line(&event).inspect_err(|e| warn!(error = %e, "failed to encode stream event"))
    })
}

/// Write each event and flush it before pulling the next one.
///
/// Returns the last event written (the terminal one for a complete run). A write failure
/// ends the run without further events and is reported as a transport error.
pub async fn write_ndjson<S, W>(events: S, writer: &mut W) -> Result<Option<StreamEvent>>
where
    S: Stream<Item = StreamEvent>,
    W: AsyncWrite + Unpin,
{
    futures_util::pin_mut!(events);
    let mut last = None;
    while let Some(event) = events.next().await {
        let line = encode_line(&event)?;
        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(error = %e, step = event.step(), "transport write failed; ending run");
            return Err(EcoOpsError::Transport {
                message: e.to_string(),
            });
        }
        last = Some(event);
    }
    Ok(last)
}
