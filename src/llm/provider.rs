//! Provider trait and request/response types for the external model API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw audio to transcribe.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl AudioInput {
    pub fn webm(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "audio.webm".to_string(),
        }
    }
}

/// Request to mint an ephemeral realtime voice session. Model and voice fall
/// back to the provider's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RealtimeSessionRequest {
    pub instructions: String,
    pub model: Option<String>,
    pub voice: Option<String>,
}

/// Minted realtime session returned to the browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeSession {
    pub token: String,
    pub model: String,
    pub voice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Backend-agnostic interface to the chat / speech provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model used for chat completions.
    fn model_name(&self) -> &str;

    /// Run a chat completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Speech-to-text.
    async fn transcribe(&self, audio: AudioInput) -> Result<String, LlmError>;

    /// Text-to-speech; returns encoded audio (MP3).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, LlmError>;

    /// Mint an ephemeral realtime session token.
    async fn create_realtime_session(
        &self,
        request: RealtimeSessionRequest,
    ) -> Result<RealtimeSession, LlmError>;
}
