//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default OpenAI-compatible API base.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// HTTP server and session settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP API listens on.
    pub port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Idle time after which an in-flight session is dropped.
    pub session_ttl: Duration,
    /// How often the session sweep runs.
    pub sweep_interval: Duration,
    /// Directory for rolling log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/ai-interviewer.db"),
            session_ttl: Duration::from_secs(1800), // 30 minutes
            sweep_interval: Duration::from_secs(60),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Read server settings from `INTERVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_env("INTERVIEW_PORT")?.unwrap_or(defaults.port);

        let db_path = std::env::var("INTERVIEW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let session_ttl = parse_env::<u64>("INTERVIEW_SESSION_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);

        let log_dir = std::env::var("INTERVIEW_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            port,
            db_path,
            session_ttl,
            sweep_interval: defaults.sweep_interval,
            log_dir,
        })
    }
}

/// Settings for the external chat / speech provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    /// API base, always ending in `/v1`.
    pub api_base: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub transcribe_model: String,
    pub transcribe_language: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    /// Wall-clock limit for text-to-speech calls.
    pub speech_timeout: Duration,
    /// Wall-clock limit for realtime session minting.
    pub realtime_timeout: Duration,
}

impl LlmConfig {
    /// Build a config with defaults around the given key.
    pub fn with_api_key(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.5,
            max_tokens: 150,
            transcribe_model: "whisper-1".to_string(),
            transcribe_language: Some("en".to_string()),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            realtime_model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            realtime_voice: "alloy".to_string(),
            speech_timeout: Duration::from_secs(60),
            realtime_timeout: Duration::from_secs(15),
        }
    }

    /// Read provider settings from `OPENAI_*` environment variables.
    ///
    /// `OPENAI_API_BASE` wins over `OPENAI_BASE_URL`; either is normalized to
    /// end in `/v1`. `TRANSCRIBE_MODEL` is accepted as an alias of
    /// `OPENAI_TRANSCRIBE_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let mut config = Self::with_api_key(SecretString::from(api_key));

        if let Some(base) = env_non_empty("OPENAI_API_BASE").or_else(|| env_non_empty("OPENAI_BASE_URL")) {
            config.api_base = normalize_api_base(&base);
        }
        if let Some(model) = env_non_empty("OPENAI_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) =
            env_non_empty("OPENAI_TRANSCRIBE_MODEL").or_else(|| env_non_empty("TRANSCRIBE_MODEL"))
        {
            config.transcribe_model = model;
        }
        if let Some(model) = env_non_empty("OPENAI_TTS_MODEL") {
            config.tts_model = model;
        }
        if let Some(model) = env_non_empty("OPENAI_REALTIME_MODEL") {
            config.realtime_model = model;
        }

        let realtime_voice = env_non_empty("OPENAI_REALTIME_VOICE")
            .or_else(|| env_non_empty("OPENAI_TTS_VOICE"))
            .unwrap_or_else(|| config.realtime_voice.clone());
        config.tts_voice = env_non_empty("OPENAI_TTS_VOICE").unwrap_or_else(|| realtime_voice.clone());
        config.realtime_voice = realtime_voice;

        Ok(config)
    }
}

/// Persona of the AI interviewer.
#[derive(Debug, Clone)]
pub struct InterviewerConfig {
    pub name: String,
    pub personality: String,
}

impl Default for InterviewerConfig {
    fn default() -> Self {
        Self {
            name: "Alex".to_string(),
            personality: "professional, friendly, and encouraging".to_string(),
        }
    }
}

/// Parse an optional environment variable; a set but malformed value is an
/// error rather than a silent fallback.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_non_empty(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            }),
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strip trailing slashes and make sure the base ends in `/v1`.
pub fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn normalize_adds_version_suffix() {
        assert_eq!(normalize_api_base("https://proxy.local"), "https://proxy.local/v1");
        assert_eq!(normalize_api_base("https://proxy.local/"), "https://proxy.local/v1");
    }

    #[test]
    fn normalize_keeps_existing_suffix() {
        assert_eq!(normalize_api_base("https://api.openai.com/v1/"), "https://api.openai.com/v1");
    }

    #[test]
    fn llm_defaults() {
        let config = LlmConfig::with_api_key(SecretString::from("sk-test"));
        assert_eq!(config.api_key.expose_secret(), "sk-test");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 150);
        assert_eq!(config.transcribe_model, "whisper-1");
        assert_eq!(config.speech_timeout, Duration::from_secs(60));
        assert_eq!(config.realtime_timeout, Duration::from_secs(15));
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        // SAFETY: the key is used by this test only.
        unsafe { std::env::set_var("INTERVIEW_TEST_TTL_SECS", "half an hour") };
        let err = parse_env::<u64>("INTERVIEW_TEST_TTL_SECS").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "INTERVIEW_TEST_TTL_SECS"
        ));

        unsafe { std::env::set_var("INTERVIEW_TEST_TTL_SECS", "90") };
        assert_eq!(parse_env::<u64>("INTERVIEW_TEST_TTL_SECS").unwrap(), Some(90));

        unsafe { std::env::remove_var("INTERVIEW_TEST_TTL_SECS") };
        assert_eq!(parse_env::<u64>("INTERVIEW_TEST_TTL_SECS").unwrap(), None);
    }

    #[test]
    fn interviewer_defaults() {
        let persona = InterviewerConfig::default();
        assert_eq!(persona.name, "Alex");
        assert!(persona.personality.contains("friendly"));
    }
}
