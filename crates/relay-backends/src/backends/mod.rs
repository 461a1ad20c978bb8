pub mod gemini;
pub mod openai;

use crate::config::{BackendConfig, BackendProvider};
use crate::stream::BackendStream;
use async_trait::async_trait;
use relay_core::{ChatMessage, RelayResult};
use std::sync::Arc;

pub use gemini::GeminiBackend;
pub use openai::OpenAiCompatBackend;

/// Trait for streaming chat backends.
///
/// Each provider implements this trait to turn an ordered conversation into
/// a stream of text fragments. Implementations hold no per-request state.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `ChatBackend` for your struct
/// 3. Add the variant to `BackendProvider` in `config.rs`
/// 4. Wire it up in [`build_backend`]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Name used in logs, stats, and error messages.
    fn name(&self) -> &str;

    /// Start a streaming completion over the full conversation.
    ///
    /// Errors returned here happen before any fragment was produced; errors
    /// after that point arrive through the returned stream.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> RelayResult<BackendStream>;
}

/// Build the adapter for one configured backend.
pub fn build_backend(config: BackendConfig) -> Arc<dyn ChatBackend> {
    match config.provider {
        BackendProvider::OpenAiCompatible => Arc::new(OpenAiCompatBackend::new(config)),
        BackendProvider::Gemini => Arc::new(GeminiBackend::new(config)),
    }
}
