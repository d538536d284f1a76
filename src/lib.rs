//! AI Interviewer — interview forms with an AI-conducted conversational mode.

pub mod config;
pub mod error;
pub mod interview;
pub mod llm;
pub mod store;
