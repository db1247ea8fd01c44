pub mod chat;
pub mod traits;

pub use chat::ChatCompletionsClient;
pub use traits::{ModelBackend, ModelError};
