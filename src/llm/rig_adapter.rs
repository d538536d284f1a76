//! Bridges rig-core's completion, transcription and audio models to
//! [`LlmProvider`]. Realtime minting has no rig counterpart and goes through
//! [`RealtimeClient`].

use std::time::Duration;

use async_trait::async_trait;
use rig::audio_generation::AudioGenerationModel;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use rig::transcription::TranscriptionModel;

use crate::config::LlmConfig;
use crate::error::LlmError;

use super::openai::RealtimeClient;
use super::provider::{
    AudioInput, ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, RealtimeSession,
    RealtimeSessionRequest, Role,
};

const PROVIDER: &str = "openai";

/// [`LlmProvider`] over rig models.
pub struct RigAdapter<M, T, A> {
    chat: M,
    transcription: T,
    speech: A,
    realtime: RealtimeClient,
    model_name: String,
    default_temperature: f32,
    tts_voice: String,
    transcribe_language: Option<String>,
    speech_timeout: Duration,
}

impl<M, T, A> RigAdapter<M, T, A>
where
    M: CompletionModel + 'static,
    T: TranscriptionModel + 'static,
    A: AudioGenerationModel + 'static,
{
    pub fn new(chat: M, transcription: T, speech: A, config: &LlmConfig) -> Self {
        Self {
            chat,
            transcription,
            speech,
            realtime: RealtimeClient::new(config.clone()),
            model_name: config.chat_model.clone(),
            default_temperature: config.temperature,
            tts_voice: config.tts_voice.clone(),
            transcribe_language: config.transcribe_language.clone(),
            speech_timeout: config.speech_timeout,
        }
    }
}

fn request_failed(reason: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason: reason.to_string(),
    }
}

/// A chat request in rig's shape: leading system messages become the
/// preamble, the final user message the prompt, and the rest history.
#[derive(Debug)]
struct RigChat {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

fn split_messages(messages: &[ChatMessage]) -> Result<RigChat, LlmError> {
    let (last, earlier) = messages
        .split_last()
        .ok_or_else(|| request_failed("completion request has no messages"))?;
    if last.role != Role::User {
        return Err(request_failed("completion request must end with a user message"));
    }

    let leading = earlier.iter().take_while(|m| m.role == Role::System).count();
    let preamble = (leading > 0).then(|| {
        earlier[..leading]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    });

    // Later system turns have no slot in rig's history; they are sent as
    // user turns so their text still reaches the model.
    let history = earlier[leading..]
        .iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            Role::System | Role::User => Message::user(m.content.clone()),
        })
        .collect();

    Ok(RigChat {
        preamble,
        history,
        prompt: Message::user(last.content.clone()),
    })
}

/// Provider-specific body fields that rig has no builder method for.
fn additional_params(request: &CompletionRequest) -> Option<serde_json::Value> {
    request
        .json_mode
        .then(|| serde_json::json!({ "response_format": { "type": "json_object" } }))
}

fn token_count(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl<M, T, A> LlmProvider for RigAdapter<M, T, A>
where
    M: CompletionModel + 'static,
    T: TranscriptionModel + 'static,
    A: AudioGenerationModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let chat = split_messages(&request.messages)?;
        let temperature = request.temperature.unwrap_or(self.default_temperature);

        let mut builder = self
            .chat
            .completion_request(chat.prompt)
            .messages(chat.history)
            .temperature(f64::from(temperature));
        if let Some(preamble) = chat.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if let Some(params) = additional_params(&request) {
            builder = builder.additional_params(params);
        }

        let response = builder.send().await.map_err(request_failed)?;

        let content = response
            .choice
            .into_iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let content = content.trim();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "chat completion had no text content".to_string(),
            });
        }

        Ok(CompletionResponse {
            content: content.to_string(),
            input_tokens: token_count(response.usage.input_tokens),
            output_tokens: token_count(response.usage.output_tokens),
        })
    }

    async fn transcribe(&self, audio: AudioInput) -> Result<String, LlmError> {
        let mut builder = self
            .transcription
            .transcription_request()
            .data(audio.bytes)
            .filename(Some(audio.file_name));
        if let Some(ref language) = self.transcribe_language {
            builder = builder.language(language.clone());
        }
        let response = builder.send().await.map_err(request_failed)?;
        Ok(response.text.trim().to_string())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, LlmError> {
        let request = self
            .speech
            .audio_generation_request()
            .text(text)
            .voice(&self.tts_voice)
            .send();
        let response = tokio::time::timeout(self.speech_timeout, request)
            .await
            .map_err(|_| LlmError::Timeout {
                provider: PROVIDER.to_string(),
                timeout: self.speech_timeout,
            })?
            .map_err(request_failed)?;
        Ok(response.audio)
    }

    async fn create_realtime_session(
        &self,
        request: RealtimeSessionRequest,
    ) -> Result<RealtimeSession, LlmError> {
        self.realtime.create_session(request).await
    }
}
