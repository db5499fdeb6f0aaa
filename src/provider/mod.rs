pub mod hosted;
pub mod local;
pub mod types;

use async_trait::async_trait;

use crate::{config::schema::ProviderConfig, error::ProviderError};

pub use hosted::HostedProvider;
pub use local::LocalProvider;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role};

/// Uniform chat/embedding capability over local or hosted model backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run a chat completion and return the normalised response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Generate an embedding vector for `text`.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Base URL, for diagnostics.
    fn base_url(&self) -> &str;
}

/// Build the provider selected by configuration.
pub fn from_config(config: &ProviderConfig) -> Result<std::sync::Arc<dyn ChatProvider>, ProviderError> {
    let provider: std::sync::Arc<dyn ChatProvider> = match config.kind.as_str() {
        "hosted" => std::sync::Arc::new(HostedProvider::new(
            &config.base_url,
            &config.api_key,
            config.request_timeout_secs,
        )?),
        _ => std::sync::Arc::new(LocalProvider::new(
            &config.base_url,
            config.request_timeout_secs,
        )?),
    };
    Ok(provider)
}
