//! Completion proxy — the only caller of the external model.
//!
//! Every call returns a [`ProxyResult`]. Transport, status, and parse errors
//! are turned into a [`ProxyUnavailable`] carrying generic user-facing text;
//! nothing from the provider escapes as an error past this boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::InterviewError;
use crate::interview::prompts::{
    API_ERROR_MESSAGE, EXTRACTION_SYSTEM_PROMPT, SPEECH_ERROR_MESSAGE,
    TRANSCRIPTION_ERROR_MESSAGE,
};

use super::provider::{
    AudioInput, ChatMessage, CompletionRequest, LlmProvider, RealtimeSession,
    RealtimeSessionRequest,
};

/// Failure side of a proxy call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyUnavailable {
    /// Safe to show to the candidate.
    pub message: String,
    /// Diagnostic detail for logs.
    pub reason: String,
}

impl From<ProxyUnavailable> for InterviewError {
    fn from(failure: ProxyUnavailable) -> Self {
        InterviewError::ProxyUnavailable {
            message: failure.message,
            reason: failure.reason,
        }
    }
}

/// Outcome of a proxy call. Callers must check which side they got.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyResult<T> {
    Success(T),
    Failure(ProxyUnavailable),
}

impl<T> ProxyResult<T> {
    fn failure(message: &str, reason: impl ToString) -> Self {
        Self::Failure(ProxyUnavailable {
            message: message.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, ProxyUnavailable> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl ProxyResult<String> {
    /// The reply on success, the generic failure text otherwise.
    pub fn message(&self) -> &str {
        match self {
            Self::Success(text) => text,
            Self::Failure(failure) => &failure.message,
        }
    }
}

/// Structured answer extracted from a free-form reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub answer: Option<String>,
    pub is_valid: bool,
    pub confidence: f32,
    pub needs_clarification: bool,
    pub clarification_message: Option<String>,
}

impl Extraction {
    /// Used when extraction fails: the raw input, at reduced confidence.
    pub fn fallback(raw: &str) -> Self {
        Self {
            answer: Some(raw.to_string()),
            is_valid: true,
            confidence: 0.5,
            needs_clarification: false,
            clarification_message: None,
        }
    }

    /// Parse the model's JSON reply. Missing fields take lenient defaults;
    /// anything that is not a JSON object is rejected.
    pub fn parse(text: &str) -> Result<Self, String> {
        let body = strip_code_fence(text);
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
        let obj = value
            .as_object()
            .ok_or_else(|| "extraction reply is not a JSON object".to_string())?;

        let answer = match obj.get("answer") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let confidence = obj
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|c| c as f32)
            .unwrap_or(0.8)
            .clamp(0.0, 1.0);

        Ok(Self {
            answer,
            is_valid: obj.get("is_valid").and_then(|v| v.as_bool()).unwrap_or(true),
            confidence,
            needs_clarification: obj
                .get("needs_clarification")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            clarification_message: obj
                .get("clarification_message")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }

    /// The extracted answer, or `raw` if the model returned none.
    pub fn answer_or<'a>(&'a self, raw: &'a str) -> &'a str {
        self.answer
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(raw)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Wraps an [`LlmProvider`] with the request shaping and failure policy
/// used by the interview flow.
pub struct CompletionProxy {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionProxy {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.5,
            max_tokens: 150,
        }
    }

    pub fn with_limits(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Send `history + [prompt]` and return the reply.
    ///
    /// The prompt goes in as a system turn. On success both the prompt and
    /// the reply are appended to `history`; on failure `history` is left
    /// as it was.
    pub async fn complete(&self, prompt: &str, history: &mut Vec<ChatMessage>) -> ProxyResult<String> {
        let mut messages = history.clone();
        messages.push(ChatMessage::system(prompt));
        let request = CompletionRequest::new(messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                debug!(
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Completion succeeded"
                );
                history.push(ChatMessage::system(prompt));
                history.push(ChatMessage::assistant(&response.content));
                ProxyResult::Success(response.content)
            }
            Ok(_) => {
                warn!("Completion returned an empty reply");
                ProxyResult::failure(API_ERROR_MESSAGE, "empty reply")
            }
            Err(e) => {
                warn!(error = %e, "Completion call failed");
                ProxyResult::failure(API_ERROR_MESSAGE, e)
            }
        }
    }

    /// Ask for a structured extraction and parse the JSON reply.
    pub async fn extract(&self, prompt: &str) -> ProxyResult<Extraction> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .with_temperature(0.3)
        .json();

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Extraction call failed");
                return ProxyResult::failure(API_ERROR_MESSAGE, e);
            }
        };

        match Extraction::parse(&response.content) {
            Ok(extraction) => ProxyResult::Success(extraction),
            Err(reason) => {
                warn!(reason = %reason, raw = %response.content, "Failed to parse extraction JSON");
                ProxyResult::failure(API_ERROR_MESSAGE, reason)
            }
        }
    }

    /// Speech-to-text.
    pub async fn transcribe(&self, audio: AudioInput) -> ProxyResult<String> {
        if audio.bytes.is_empty() {
            return ProxyResult::failure(TRANSCRIPTION_ERROR_MESSAGE, "empty audio");
        }
        match self.llm.transcribe(audio).await {
            Ok(text) => ProxyResult::Success(text),
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                ProxyResult::failure(TRANSCRIPTION_ERROR_MESSAGE, e)
            }
        }
    }

    /// Text-to-speech. Failures are returned, never replaced by empty audio.
    pub async fn synthesize(&self, text: &str) -> ProxyResult<Vec<u8>> {
        match self.llm.synthesize(text).await {
            Ok(audio) if !audio.is_empty() => ProxyResult::Success(audio),
            Ok(_) => ProxyResult::failure(SPEECH_ERROR_MESSAGE, "empty audio"),
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed");
                ProxyResult::failure(SPEECH_ERROR_MESSAGE, e)
            }
        }
    }

    /// Mint an ephemeral realtime session carrying `instructions`.
    pub async fn realtime_session(&self, instructions: String) -> ProxyResult<RealtimeSession> {
        let request = RealtimeSessionRequest {
            instructions,
            ..Default::default()
        };
        match self.llm.create_realtime_session(request).await {
            Ok(session) => ProxyResult::Success(session),
            Err(e) => {
                warn!(error = %e, "Realtime session creation failed");
                ProxyResult::failure(API_ERROR_MESSAGE, e)
            }
        }
    }
}
