//! EcoOps incident pipeline: turns a citizen's free-text hazard report into a structured
//! assessment by running four model-backed stages in order and streaming their results.

pub mod clients;
pub mod config;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod http;
pub mod prompts;
pub mod stages;
pub mod state;
pub mod stream;

pub use clients::{ChatCompletionsClient, ModelBackend, ModelError};
pub use config::Config;
pub use error::{EcoOpsError, Result};
pub use graph::PipelineRun;
pub use state::{IncidentReport, RunState};
pub use stream::{StreamEvent, event_stream, write_ndjson};
