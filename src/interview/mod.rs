//! Interview forms, the progression tracker, and the AI conversational flow.

pub mod conductor;
pub mod model;
pub mod prompts;
pub mod routes;
pub mod sessions;
pub mod tracker;
pub mod validation;

pub use conductor::Conductor;
pub use routes::{AppState, interview_routes};
pub use sessions::{InMemorySessionStore, InterviewSession, SessionStore, spawn_sweep_task};
pub use tracker::Tracker;
