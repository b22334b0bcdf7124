use super::models::{AiConfig, AiMessage, AiProviderResponse, FunctionDef};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Model API request failed: {0}")]
    Transport(String),

    #[error("Model API request timed out")]
    Timeout,

    #[error("Unexpected model API response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request, offering `functions` to the model.
    ///
    /// An empty `functions` slice means plain text completion.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        functions: &[FunctionDef],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError>;
}

// Blanket implementation for Box<dyn AiProvider> so the dispatcher can hold
// whichever provider main() picked at runtime.
#[async_trait]
impl AiProvider for Box<dyn AiProvider> {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        functions: &[FunctionDef],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        (**self).chat_complete(messages, functions, config).await
    }
}
