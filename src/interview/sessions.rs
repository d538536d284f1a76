//! Session store — in-flight AI interview sessions keyed by id.
//!
//! Entries expire after an idle TTL and carry a version that is bumped on
//! every save; a save against a stale version is rejected with
//! `SessionConflict` rather than silently overwriting a racing write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::InterviewError;
use crate::llm::ChatMessage;

use super::model::CandidateInfo;
use super::tracker::Tracker;

/// Default idle timeout, matching a typical conversation timeout.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// One candidate's AI interview in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub tracker: Tracker,
    /// Chat history sent to the model: system prompt, prompts, replies.
    pub history: Vec<ChatMessage>,
    pub interview_id: Uuid,
    pub interview_title: String,
    #[serde(default)]
    pub candidate: Option<CandidateInfo>,
    /// Set once the closing message has been produced.
    #[serde(default)]
    pub closed: bool,
    /// Store version this copy was loaded at.
    #[serde(default)]
    pub version: u64,
}

impl InterviewSession {
    pub fn new(
        tracker: Tracker,
        interview_id: Uuid,
        interview_title: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            history: vec![ChatMessage::system(system_prompt)],
            interview_id,
            interview_title: interview_title.into(),
            candidate: None,
            closed: false,
            version: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.tracker.id()
    }
}

/// Keyed store of in-flight sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Add a new session at version 0.
    async fn insert(&self, session: InterviewSession);

    /// Load a session. Unknown and expired ids are `SessionNotFound`.
    async fn get(&self, id: Uuid) -> Result<InterviewSession, InterviewError>;

    /// Write back a session loaded with [`get`](Self::get). On success the
    /// caller's copy moves to the new version.
    async fn save(&self, session: &mut InterviewSession) -> Result<(), InterviewError>;

    /// Remove a session only if it is still at `version`, handing it to the
    /// caller. Used to claim a session for submission exactly once.
    async fn take(&self, id: Uuid, version: u64) -> Result<InterviewSession, InterviewError>;

    /// Put back a session taken with [`take`](Self::take), keeping its version.
    async fn restore(&self, session: InterviewSession);

    /// Drop a session, returning it if it was present.
    async fn remove(&self, id: Uuid) -> Option<InterviewSession>;

    /// Drop every expired session; returns how many were removed.
    async fn purge_expired(&self) -> usize;

    async fn len(&self) -> usize;
}

struct Entry {
    session: InterviewSession,
    touched: Instant,
}

/// Process-local [`SessionStore`]. Sessions do not survive restarts.
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Arc<Self> {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.touched.elapsed() >= self.ttl
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, mut session: InterviewSession) {
        session.version = 0;
        let id = session.id();
        self.entries.write().await.insert(
            id,
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        debug!(session_id = %id, "Session stored");
    }

    async fn get(&self, id: Uuid) -> Result<InterviewSession, InterviewError> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(&id) {
            None => return Err(InterviewError::SessionNotFound { id }),
            Some(entry) => self.is_expired(entry),
        };
        if expired {
            entries.remove(&id);
            info!(session_id = %id, "Session expired");
            return Err(InterviewError::SessionNotFound { id });
        }

        let entry = entries
            .get_mut(&id)
            .ok_or(InterviewError::SessionNotFound { id })?;
        entry.touched = Instant::now();
        Ok(entry.session.clone())
    }

    async fn save(&self, session: &mut InterviewSession) -> Result<(), InterviewError> {
        let id = session.id();
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or(InterviewError::SessionNotFound { id })?;

        if entry.session.version != session.version {
            return Err(InterviewError::SessionConflict {
                id,
                expected: session.version,
                found: entry.session.version,
            });
        }

        session.version += 1;
        entry.session = session.clone();
        entry.touched = Instant::now();
        Ok(())
    }

    async fn take(&self, id: Uuid, version: u64) -> Result<InterviewSession, InterviewError> {
        let mut entries = self.entries.write().await;
        let found = entries
            .get(&id)
            .map(|entry| entry.session.version)
            .ok_or(InterviewError::SessionNotFound { id })?;
        if found != version {
            return Err(InterviewError::SessionConflict {
                id,
                expected: version,
                found,
            });
        }
        entries
            .remove(&id)
            .map(|entry| entry.session)
            .ok_or(InterviewError::SessionNotFound { id })
    }

    async fn restore(&self, session: InterviewSession) {
        let id = session.id();
        self.entries.write().await.insert(
            id,
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        debug!(session_id = %id, "Session restored");
    }

    async fn remove(&self, id: Uuid) -> Option<InterviewSession> {
        self.entries.write().await.remove(&id).map(|e| e.session)
    }

    async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.touched.elapsed() < self.ttl);
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Spawn a background task that purges expired sessions every `every`.
pub fn spawn_sweep_task(
    store: Arc<dyn SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                info!(purged, "Expired interview sessions purged");
            }
        }
    })
}
