//! Stage graph: drives one run through Clarification → Impact → Action → Briefing → Terminal.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, Span, info, info_span, warn};
use uuid::Uuid;

use crate::clients::ModelBackend;
use crate::error::{EcoOpsError, Result};
use crate::stages::Stage;
use crate::state::{IncidentReport, RunState};

/// Where a run currently sits in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Pending(Stage),
    Terminal,
}

/// One independent execution of the graph. Owns its state; nothing is shared between runs.
pub struct PipelineRun {
    id: Uuid,
    state: RunState,
    cursor: Cursor,
    backend: Arc<dyn ModelBackend>,
    /// Parent of everything logged while a stage runs, so each line carries the run id.
    span: Span,
}

impl PipelineRun {
    pub fn new(report: &IncidentReport, backend: Arc<dyn ModelBackend>) -> Self {
        let id = Uuid::new_v4();
        info!(
            run_id = %id,
            provider = backend.provider(),
            report_chars = report.text().len(),
            "starting incident run"
        );
        Self {
            id,
            state: RunState::seeded(report),
            cursor: Cursor::Pending(Stage::first()),
            backend,
            span: info_span!("run", run_id = %id),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run the next stage and merge its update.
    ///
    /// Returns the stage that completed, or `Ok(None)` once the graph is terminal. A model
    /// failure moves the run straight to Terminal; already-merged results stay in place.
    pub async fn advance(&mut self) -> Result<Option<Stage>> {
        let span = self.span.clone();
        self.step().instrument(span).await
    }

    async fn step(&mut self) -> Result<Option<Stage>> {
        let stage = match self.cursor {
            Cursor::Pending(stage) => stage,
            Cursor::Terminal => return Ok(None),
        };

        let started = Instant::now();
        let update = match stage.execute(&self.state, self.backend.as_ref()).await {
            Ok(update) => update,
            Err(e) => {
                warn!(run_id = %self.id, stage = %stage, error = %e, "stage failed; aborting run");
                self.cursor = Cursor::Terminal;
                return Err(EcoOpsError::model(stage.step_name(), e));
            }
        };

        self.state.apply(update);
        self.cursor = stage.next().map_or(Cursor::Terminal, Cursor::Pending);
        info!(
            run_id = %self.id,
            stage = %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage complete"
        );
        Ok(Some(stage))
    }

    /// Drive every remaining stage and hand back the final state.
    pub async fn run_to_completion(mut self) -> Result<RunState> {
        while self.advance().await?.is_some() {}
        Ok(self.state)
    }
}
