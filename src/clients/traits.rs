use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider returned no completion")]
    EmptyResponse,
}

/// Prompt in, raw text out. Stages never see which provider answered.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError>;

    /// Short provider label for logs.
    fn provider(&self) -> &str;
}
