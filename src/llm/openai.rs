//! Realtime session minting against an OpenAI-compatible REST API.
//!
//! rig-core has no realtime support, so this one endpoint is called
//! directly with reqwest.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::LlmConfig;
use crate::error::LlmError;

use super::provider::{RealtimeSession, RealtimeSessionRequest};

const PROVIDER: &str = "openai";

/// Mints ephemeral realtime tokens.
pub struct RealtimeClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl RealtimeClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
    }

    /// Send a request and turn transport errors and non-2xx statuses into
    /// `LlmError`s.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        let request = match timeout {
            Some(t) => request.timeout(t),
            None => request,
        };
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    provider: PROVIDER.to_string(),
                    timeout: timeout.unwrap_or_default(),
                }
            } else {
                LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, retry_after, &body))
    }
}

/// Map a non-success HTTP status to an error.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        },
        _ => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("HTTP {status}: {}", truncate(body, 300)),
        },
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn invalid(reason: impl Into<String>) -> LlmError {
    LlmError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason: reason.into(),
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RealtimeSessionBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl RealtimeClient {
    /// Mint a realtime session; model and voice default to the configured ones.
    pub async fn create_session(
        &self,
        request: RealtimeSessionRequest,
    ) -> Result<RealtimeSession, LlmError> {
        let model = request
            .model
            .unwrap_or_else(|| self.config.realtime_model.clone());
        let voice = request
            .voice
            .unwrap_or_else(|| self.config.realtime_voice.clone());
        let body = serde_json::json!({
            "model": model,
            "voice": voice,
            "instructions": request.instructions,
        });
        let resp = self
            .send(
                self.post("realtime/sessions")
                    .header("OpenAI-Beta", "realtime=v1")
                    .json(&body),
                Some(self.config.realtime_timeout),
            )
            .await?;
        let session: RealtimeSessionBody = resp
            .json()
            .await
            .map_err(|e| invalid(format!("realtime session body: {e}")))?;

        Ok(RealtimeSession {
            token: session.client_secret.value,
            model: session.model.unwrap_or(model),
            voice: session.voice.unwrap_or(voice),
            expires_at: session.client_secret.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> LlmConfig {
        LlmConfig::with_api_key(SecretString::from("sk-test"))
    }

    #[test]
    fn status_errors_are_classified() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, ""),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), ""),
            LlmError::RateLimited {
                retry_after: Some(_),
                ..
            }
        ));
        let err = status_error(StatusCode::BAD_GATEWAY, None, "upstream down");
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn urls_are_under_the_api_base() {
        let client = RealtimeClient::new(config());
        assert_eq!(
            client.url("realtime/sessions"),
            "https://api.openai.com/v1/realtime/sessions"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_request_failure() {
        let mut cfg = config();
        cfg.api_base = "http://127.0.0.1:9/v1".to_string();
        let client = RealtimeClient::new(cfg);
        let err = client
            .create_session(RealtimeSessionRequest {
                instructions: "Ask one question.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
