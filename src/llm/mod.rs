//! LLM integration for the interviewer.
//!
//! - [`provider`]: the backend-agnostic `LlmProvider` trait
//! - `rig_adapter`: `LlmProvider` over rig-core's OpenAI models (chat,
//!   transcription, speech)
//! - [`openai`]: realtime session minting over reqwest
//! - [`proxy`]: the `CompletionProxy` the interview flow calls through

pub mod openai;
pub mod provider;
pub mod proxy;
mod rig_adapter;

pub use openai::RealtimeClient;
pub use provider::*;
pub use proxy::{CompletionProxy, Extraction, ProxyResult, ProxyUnavailable};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use rig::client::audio_generation::AudioGenerationClient;
use rig::client::transcription::TranscriptionClient;
use secrecy::ExposeSecret;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(&config.api_base)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            })?;

    // Chat Completions rather than Responses, so `response_format` and
    // `max_tokens` pass straight through.
    let chat = client.completion_model(&config.chat_model).completions_api();
    let transcription = client.transcription_model(&config.transcribe_model);
    let speech = client.audio_generation_model(&config.tts_model);

    tracing::info!(
        "Using OpenAI-compatible API at {} (model: {})",
        config.api_base,
        config.chat_model
    );
    Ok(Arc::new(RigAdapter::new(chat, transcription, speech, config)))
}
