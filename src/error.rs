//! Domain-specific error types for the incident pipeline

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::clients::ModelError;

/// Main error type for the incident pipeline
#[derive(Error, Debug)]
pub enum EcoOpsError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed or missing request input; rejected before a run starts.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Backend call failure during a stage. Fatal to the run.
    #[error("Model invocation failed during {stage} stage: {message}")]
    ModelInvocation { stage: String, message: String },

    /// Failure writing to an already-open event stream.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EcoOpsError {
    pub fn model(stage: &str, err: ModelError) -> Self {
        EcoOpsError::ModelInvocation {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }

    /// Status used when the error happens before any stream is opened.
    pub fn http_status(&self) -> StatusCode {
        match self {
            EcoOpsError::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error body sent with a pre-stream rejection.
    pub fn to_json_body(&self) -> String {
        let message = match self {
            EcoOpsError::Validation { message } => message.clone(),
            other => other.to_string(),
        };
        json!({ "error": message }).to_string()
    }
}

impl From<anyhow::Error> for EcoOpsError {
    fn from(err: anyhow::Error) -> Self {
        EcoOpsError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EcoOpsError {
    fn from(err: serde_json::Error) -> Self {
        EcoOpsError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for EcoOpsError {
    fn from(err: std::io::Error) -> Self {
        EcoOpsError::Transport {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for EcoOpsError {
    fn from(err: toml::de::Error) -> Self {
        EcoOpsError::Config {
            message: format!("Invalid config file: {}", err),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EcoOpsError>;
