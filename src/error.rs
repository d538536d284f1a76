//! Error types for the interviewer service.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Interview error: {0}")]
    Interview(#[from] InterviewError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// External model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Interview session errors.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("Answer out of sequence: cursor {cursor} of {total}, completed={completed}")]
    OutOfSequence {
        cursor: usize,
        total: usize,
        completed: bool,
    },

    #[error("Session {id} not found")]
    SessionNotFound { id: Uuid },

    #[error("Session {id} was modified concurrently (expected version {expected}, found {found})")]
    SessionConflict { id: Uuid, expected: u64, found: u64 },

    #[error("Interview {id} not found")]
    InterviewNotFound { id: Uuid },

    #[error("Interview {id} has no answered questions to submit")]
    NothingToSubmit { id: Uuid },

    /// `message` is safe to show to the candidate; `reason` is for logs.
    #[error("{message}")]
    ProxyUnavailable { message: String, reason: String },
}

/// Input validation errors. Each variant names the offending field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid email address in {field}: {value}")]
    InvalidEmail { field: String, value: String },

    #[error("Question {question_id} is not part of interview {interview_id}")]
    UnknownQuestion { question_id: Uuid, interview_id: Uuid },

    #[error("Question {question_id} requires an answer")]
    MissingRequired { question_id: Uuid },

    #[error("Invalid option for question {question_id}: {value:?} (allowed: {allowed:?})")]
    InvalidSelection {
        question_id: Uuid,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
