//! Interview conductor — coordinates sessions, the completion proxy, the
//! tracker and the store for both the AI flow and static form submissions.
//!
//! Each step loads the session, mutates a private copy, and saves it back
//! with the version it was loaded at, so two racing steps on the same
//! session end in one success and one `SessionConflict`. Submitting claims
//! the session with a version-checked `take`, so it yields one response.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::InterviewerConfig;
use crate::error::{Error, InterviewError, Result, ValidationError};
use crate::llm::{AudioInput, CompletionProxy, Extraction, RealtimeSession};
use crate::store::Database;

use super::model::{
    AnswerRecord, CandidateInfo, Interview, InterviewResponse, Question, QuestionKind,
    ResponseSource,
};
use super::prompts::{
    ALREADY_COMPLETED, ANSWER_RECEIVED, DEFAULT_CLARIFICATION, VOICE_CLOSING, completion_prompt,
    extraction_prompt, question_prompt, realtime_instructions, selection_clarification,
    start_prompt, system_prompt, voice_greeting, voice_next_question, voice_no_questions,
};
use super::sessions::{InterviewSession, SessionStore};
use super::tracker::{AnswerDraft, Snapshot, Speaker, Tracker, Turn, TurnKind};
use super::validation::{FormSubmission, validate_answer, validate_candidate, validate_submission};

/// Reply to starting a session.
#[derive(Debug, Clone, Serialize)]
pub struct StartReply {
    pub success: bool,
    pub session_id: Uuid,
    pub message: String,
    pub total_questions: usize,
}

/// Reply to one conversational step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    pub needs_clarification: bool,
    pub answer_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_question_id: Option<Uuid>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_questions: Option<usize>,
}

/// Full state of a session, for review or resumption.
#[derive(Debug, Clone, Serialize)]
pub struct SessionData {
    pub session_id: Uuid,
    pub interview_id: Uuid,
    pub interview_title: String,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    pub current_question: usize,
    pub total_questions: usize,
    pub answers: Snapshot,
    pub transcript: Vec<Turn>,
}

/// Result of persisting a response.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReply {
    pub success: bool,
    pub message: String,
    pub response_id: Uuid,
    pub answers_saved: usize,
}

impl SubmitReply {
    fn new(response_id: Uuid, answers_saved: usize) -> Self {
        Self {
            success: true,
            message: "Interview submitted successfully!".to_string(),
            response_id,
            answers_saved,
        }
    }
}

/// One spoken interviewer turn. `audio_base64` is absent when speech
/// synthesis failed; the text is always present.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceTurn {
    pub success: bool,
    pub session_id: Uuid,
    pub assistant_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    pub format: &'static str,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    pub total_questions: usize,
}

/// Ephemeral realtime token plus the instructions it was minted with.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeOffer {
    pub success: bool,
    pub interview_id: Uuid,
    #[serde(flatten)]
    pub session: RealtimeSession,
    pub instructions: String,
    pub questions: Vec<Question>,
}

/// Coordinates AI interview sessions and response persistence.
pub struct Conductor {
    db: Arc<dyn Database>,
    sessions: Arc<dyn SessionStore>,
    proxy: Arc<CompletionProxy>,
    persona: InterviewerConfig,
}

impl Conductor {
    pub fn new(
        db: Arc<dyn Database>,
        sessions: Arc<dyn SessionStore>,
        proxy: Arc<CompletionProxy>,
        persona: InterviewerConfig,
    ) -> Self {
        Self {
            db,
            sessions,
            proxy,
            persona,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// An active interview and its ordered questions.
    async fn active_interview(&self, id: Uuid) -> Result<(Interview, Vec<Question>)> {
        let interview = self
            .db
            .get_interview(id)
            .await?
            .filter(|i| i.is_active)
            .ok_or(InterviewError::InterviewNotFound { id })?;
        let questions = self.db.list_questions(id).await?;
        Ok((interview, questions))
    }

    // ── AI flow ─────────────────────────────────────────────────────

    /// Create a session for an active interview and produce the greeting.
    pub async fn start(
        &self,
        interview_id: Uuid,
        candidate: Option<CandidateInfo>,
    ) -> Result<StartReply> {
        let (interview, questions) = self.active_interview(interview_id).await?;
        let candidate = candidate.map(|c| validate_candidate(&c)).transpose()?;

        let tracker = Tracker::start(questions);
        let total_questions = tracker.total();
        let mut session = InterviewSession::new(
            tracker,
            interview.id,
            interview.title.clone(),
            system_prompt(&self.persona),
        );
        session.candidate = candidate;

        let prompt = start_prompt(&self.persona, &interview, total_questions);
        let result = self.proxy.complete(&prompt, &mut session.history).await;
        session.tracker.log(Speaker::System, TurnKind::Prompt, prompt);
        session
            .tracker
            .log(Speaker::Assistant, TurnKind::Greeting, result.message());

        let session_id = session.id();
        self.sessions.insert(session).await;
        info!(
            session_id = %session_id,
            interview_id = %interview_id,
            total_questions,
            "Interview session started"
        );

        Ok(StartReply {
            success: result.is_success(),
            session_id,
            message: result.message().to_string(),
            total_questions,
        })
    }

    /// Ask the question at the cursor (or close the interview if none is left).
    pub async fn next_question(&self, session_id: Uuid) -> Result<Reply> {
        let mut session = self.sessions.get(session_id).await?;
        let reply = self.ask_current(&mut session).await;
        self.sessions.save(&mut session).await?;
        Ok(reply)
    }

    /// Interpret one candidate reply to the current question.
    ///
    /// The answer is extracted through the proxy (falling back to the raw
    /// text), validated, and recorded; then the next question is asked or
    /// the interview is closed. Ambiguous or invalid answers produce a
    /// follow-up instead and leave the cursor where it is.
    pub async fn respond(&self, session_id: Uuid, text: &str) -> Result<Reply> {
        let mut session = self.sessions.get(session_id).await?;

        if session.closed {
            return Ok(already_completed(&session));
        }
        let Some(question) = session.tracker.current().cloned() else {
            let reply = self.close(&mut session).await;
            self.sessions.save(&mut session).await?;
            return Ok(reply);
        };

        if text.trim().is_empty() {
            let reply = followup(&mut session, &question, text, DEFAULT_CLARIFICATION);
            self.sessions.save(&mut session).await?;
            return Ok(reply);
        }

        let extraction = self
            .proxy
            .extract(&extraction_prompt(&question, text))
            .await
            .ok()
            .unwrap_or_else(|| Extraction::fallback(text));

        if extraction.needs_clarification {
            let message = extraction
                .clarification_message
                .as_deref()
                .unwrap_or(DEFAULT_CLARIFICATION)
                .to_string();
            let reply = followup(&mut session, &question, text, &message);
            self.sessions.save(&mut session).await?;
            return Ok(reply);
        }

        let value = match validate_answer(&question, extraction.answer_or(text)) {
            Ok(value) => value,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Answer rejected");
                let message = match err {
                    ValidationError::InvalidSelection { .. } => selection_clarification(&question),
                    _ => DEFAULT_CLARIFICATION.to_string(),
                };
                let reply = followup(&mut session, &question, text, &message);
                self.sessions.save(&mut session).await?;
                return Ok(reply);
            }
        };

        match session
            .tracker
            .record(AnswerDraft::new(value, text, extraction.confidence))
        {
            Ok(_) => {}
            Err(InterviewError::OutOfSequence { .. }) => return Ok(already_completed(&session)),
            Err(e) => return Err(e.into()),
        }

        let mut reply = if session.tracker.is_complete() {
            self.close(&mut session).await
        } else {
            let mut next = self.ask_current(&mut session).await;
            next.message = format!("{ANSWER_RECEIVED} {}", next.message);
            next
        };
        reply.answer_saved = true;
        reply.answered_question_id = Some(question.id);

        self.sessions.save(&mut session).await?;
        Ok(reply)
    }

    /// Produce the closing message. Calling it again is harmless.
    pub async fn complete(&self, session_id: Uuid) -> Result<Reply> {
        let mut session = self.sessions.get(session_id).await?;
        if session.closed {
            return Ok(already_completed(&session));
        }
        let reply = self.close(&mut session).await;
        self.sessions.save(&mut session).await?;
        Ok(reply)
    }

    pub async fn status(&self, session_id: Uuid) -> Result<SessionData> {
        let session = self.sessions.get(session_id).await?;
        let tracker = &session.tracker;
        Ok(SessionData {
            session_id,
            interview_id: session.interview_id,
            interview_title: session.interview_title.clone(),
            started_at: tracker.started_at(),
            completed: session.closed,
            current_question: tracker.cursor(),
            total_questions: tracker.total(),
            answers: tracker.snapshot(),
            transcript: tracker.transcript().to_vec(),
        })
    }

    /// Persist the session's snapshot as a response and drop the session.
    ///
    /// The candidate given here wins over one supplied at start; one of the
    /// two is required.
    pub async fn submit(
        &self,
        session_id: Uuid,
        candidate: Option<CandidateInfo>,
    ) -> Result<SubmitReply> {
        let session = self.sessions.get(session_id).await?;
        let candidate = candidate
            .or_else(|| session.candidate.clone())
            .ok_or_else(|| ValidationError::MissingField {
                field: "candidate_name".to_string(),
            })?;
        let candidate = validate_candidate(&candidate)?;

        let snapshot = session.tracker.snapshot();
        if snapshot.is_empty() && session.tracker.total() > 0 {
            return Err(InterviewError::NothingToSubmit { id: session_id }.into());
        }
        self.persist_session(session, &candidate).await
    }

    /// Claim the session and store its snapshot as an AI response.
    ///
    /// The claim removes the session only if nobody saved or submitted it
    /// since `session` was loaded, so a response is written at most once per
    /// session. A failed write puts the session back.
    async fn persist_session(
        &self,
        session: InterviewSession,
        candidate: &CandidateInfo,
    ) -> Result<SubmitReply> {
        let session_id = session.id();
        if self.db.get_interview(session.interview_id).await?.is_none() {
            return Err(InterviewError::InterviewNotFound {
                id: session.interview_id,
            }
            .into());
        }

        let claimed = self.sessions.take(session_id, session.version).await?;
        match self.write_response(&claimed, candidate).await {
            Ok(reply) => {
                info!(
                    session_id = %session_id,
                    response_id = %reply.response_id,
                    answers = reply.answers_saved,
                    "AI interview submitted"
                );
                Ok(reply)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Submit failed, session restored");
                self.sessions.restore(claimed).await;
                Err(e)
            }
        }
    }

    async fn write_response(
        &self,
        session: &InterviewSession,
        candidate: &CandidateInfo,
    ) -> Result<SubmitReply> {
        let snapshot = session.tracker.snapshot();
        let stored = self.db.upsert_candidate(candidate).await?;
        let response_id = Uuid::new_v4();
        let answers: Vec<AnswerRecord> = snapshot
            .entries()
            .iter()
            .map(|entry| AnswerRecord {
                id: Uuid::new_v4(),
                response_id,
                question_id: entry.question_id,
                answer_text: entry.answer.clone(),
                selected_options: if entry.kind.is_choice() {
                    vec![entry.answer.clone()]
                } else {
                    Vec::new()
                },
            })
            .collect();

        let response = InterviewResponse {
            id: response_id,
            interview_id: session.interview_id,
            candidate_id: Some(stored.id),
            source: ResponseSource::Ai,
            submitted_at: Utc::now(),
            answers_json: serde_json::json!({
                "source": ResponseSource::Ai,
                "started_at": session.tracker.started_at(),
                "completed": session.closed,
                "answers": snapshot,
                "transcript": session.tracker.transcript(),
            }),
        };
        self.db.insert_response(&response, &answers).await?;
        Ok(SubmitReply::new(response_id, answers.len()))
    }

    // ── Voice flow ──────────────────────────────────────────────────

    /// Start a scripted voice interview: a fixed greeting plus the first
    /// question, spoken. No chat completion is involved, so the flow keeps
    /// working while the model is down.
    pub async fn start_voice(
        &self,
        interview_id: Uuid,
        candidate: CandidateInfo,
    ) -> Result<VoiceTurn> {
        let (interview, questions) = self.active_interview(interview_id).await?;
        let candidate = validate_candidate(&candidate)?;

        let tracker = Tracker::start(questions);
        let mut session = InterviewSession::new(
            tracker,
            interview.id,
            interview.title.clone(),
            system_prompt(&self.persona),
        );
        let first = session.tracker.current().cloned();
        let text = match first {
            Some(first) => voice_greeting(&candidate.name, &interview.title, &first),
            None => {
                session.tracker.finish();
                session.closed = true;
                voice_no_questions(&candidate.name)
            }
        };
        session.candidate = Some(candidate);
        session
            .tracker
            .log(Speaker::Assistant, TurnKind::Greeting, text.clone());

        let turn = self.voice_turn(&session, text, None).await;
        let session_id = session.id();
        self.sessions.insert(session).await;
        info!(session_id = %session_id, interview_id = %interview_id, "Voice session started");
        Ok(turn)
    }

    /// Record one spoken (already transcribed) answer and speak the next
    /// question. The last answer closes the session and stores the response.
    pub async fn respond_voice(&self, session_id: Uuid, text: &str) -> Result<VoiceTurn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::MissingField {
                field: "text".to_string(),
            }
            .into());
        }
        let mut session = self.sessions.get(session_id).await?;
        if session.closed {
            return Ok(self.voice_turn(&session, ALREADY_COMPLETED.to_string(), None).await);
        }
        let Some(question) = session.tracker.current().cloned() else {
            return Ok(self.voice_turn(&session, ALREADY_COMPLETED.to_string(), None).await);
        };

        session.tracker.log(Speaker::User, TurnKind::Answer, text);
        let value = match validate_answer(&question, text) {
            Ok(value) => value,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Spoken answer rejected");
                let message = match err {
                    ValidationError::InvalidSelection { .. } => selection_clarification(&question),
                    _ => DEFAULT_CLARIFICATION.to_string(),
                };
                session
                    .tracker
                    .log(Speaker::Assistant, TurnKind::Followup, message.clone());
                self.sessions.save(&mut session).await?;
                return Ok(self.voice_turn(&session, message, None).await);
            }
        };
        session.tracker.record(AnswerDraft::new(value, text, 1.0))?;

        if let Some(next) = session.tracker.current() {
            let message = voice_next_question(next);
            session
                .tracker
                .log(Speaker::Assistant, TurnKind::Question, message.clone());
            self.sessions.save(&mut session).await?;
            return Ok(self.voice_turn(&session, message, None).await);
        }

        session.tracker.finish();
        session.closed = true;
        session
            .tracker
            .log(Speaker::Assistant, TurnKind::Completion, VOICE_CLOSING);
        self.sessions.save(&mut session).await?;

        let candidate = session
            .candidate
            .clone()
            .ok_or_else(|| ValidationError::MissingField {
                field: "candidate_name".to_string(),
            })?;
        let closing = session.clone();
        let submitted = self.persist_session(session, &candidate).await?;
        Ok(self
            .voice_turn(&closing, VOICE_CLOSING.to_string(), Some(submitted.response_id))
            .await)
    }

    /// Speak `text`; a synthesis failure still returns the text.
    async fn voice_turn(
        &self,
        session: &InterviewSession,
        text: String,
        response_id: Option<Uuid>,
    ) -> VoiceTurn {
        let audio_base64 = match self.proxy.synthesize(&text).await.into_result() {
            Ok(audio) => Some(BASE64.encode(audio)),
            Err(e) => {
                warn!(session_id = %session.id(), reason = %e.reason, "Speech unavailable, text only");
                None
            }
        };
        let tracker = &session.tracker;
        VoiceTurn {
            success: true,
            session_id: session.id(),
            assistant_text: text,
            audio_base64,
            format: "mp3",
            done: session.closed,
            response_id,
            question_number: tracker.current().map(|_| tracker.cursor() + 1),
            total_questions: tracker.total(),
        }
    }

    // ── Static form ─────────────────────────────────────────────────

    /// Validate and persist a complete form submission.
    pub async fn submit_form(
        &self,
        interview_id: Uuid,
        submission: FormSubmission,
    ) -> Result<SubmitReply> {
        let (_, questions) = self.active_interview(interview_id).await?;
        let (candidate, validated) = validate_submission(interview_id, &questions, &submission)?;

        let stored = self.db.upsert_candidate(&candidate).await?;
        let response_id = Uuid::new_v4();

        let summary: Vec<serde_json::Value> = validated
            .iter()
            .map(|a| {
                let text = questions
                    .iter()
                    .find(|q| q.id == a.question_id)
                    .map(|q| q.text.as_str())
                    .unwrap_or_default();
                serde_json::json!({
                    "question_id": a.question_id,
                    "question_text": text,
                    "answer": a.answer_text,
                    "selected_options": a.selected_options,
                })
            })
            .collect();

        let answers: Vec<AnswerRecord> = validated
            .into_iter()
            .map(|a| AnswerRecord {
                id: Uuid::new_v4(),
                response_id,
                question_id: a.question_id,
                answer_text: a.answer_text,
                selected_options: a.selected_options,
            })
            .collect();

        let response = InterviewResponse {
            id: response_id,
            interview_id,
            candidate_id: Some(stored.id),
            source: submission.source,
            submitted_at: Utc::now(),
            answers_json: serde_json::json!({
                "source": submission.source,
                "answers": summary,
                "transcript": submission.transcript,
            }),
        };
        self.db.insert_response(&response, &answers).await?;

        info!(
            interview_id = %interview_id,
            response_id = %response_id,
            source = %submission.source,
            "Form response submitted"
        );
        Ok(SubmitReply::new(response_id, answers.len()))
    }

    // ── Speech and realtime ─────────────────────────────────────────

    /// Transcribe candidate audio for a live session.
    pub async fn transcribe(&self, session_id: Uuid, audio: Vec<u8>) -> Result<String> {
        self.sessions.get(session_id).await?;
        let text = self
            .proxy
            .transcribe(AudioInput::webm(audio))
            .await
            .into_result()
            .map_err(InterviewError::from)?;
        Ok(text)
    }

    /// Text-to-speech for any interviewer line.
    pub async fn speak(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "text".to_string(),
            }
            .into());
        }
        let audio = self
            .proxy
            .synthesize(text)
            .await
            .into_result()
            .map_err(InterviewError::from)?;
        Ok(audio)
    }

    /// Mint a realtime voice session scripted with the interview's questions.
    pub async fn realtime(&self, interview_id: Uuid) -> Result<RealtimeOffer> {
        let (interview, questions) = self.active_interview(interview_id).await?;
        let instructions = realtime_instructions(&self.persona, &interview, &questions);
        let session = self
            .proxy
            .realtime_session(instructions.clone())
            .await
            .into_result()
            .map_err(|f| Error::from(InterviewError::from(f)))?;

        info!(interview_id = %interview_id, model = %session.model, "Realtime session minted");
        Ok(RealtimeOffer {
            success: true,
            interview_id,
            session,
            instructions,
            questions,
        })
    }

    // ── Steps shared by the handlers above ──────────────────────────

    async fn ask_current(&self, session: &mut InterviewSession) -> Reply {
        if session.closed {
            return already_completed(session);
        }
        let Some(question) = session.tracker.current().cloned() else {
            return self.close(session).await;
        };

        let prompt = question_prompt(&question);
        let result = self.proxy.complete(&prompt, &mut session.history).await;
        session.tracker.log(Speaker::System, TurnKind::Prompt, prompt);
        session
            .tracker
            .log(Speaker::Assistant, TurnKind::Question, result.message());

        Reply {
            success: result.is_success(),
            message: result.message().to_string(),
            ..question_reply(&session.tracker, &question)
        }
    }

    async fn close(&self, session: &mut InterviewSession) -> Reply {
        if session.closed {
            return already_completed(session);
        }
        let prompt = completion_prompt(&self.persona);
        let result = self.proxy.complete(&prompt, &mut session.history).await;
        session.tracker.log(Speaker::System, TurnKind::Prompt, prompt);
        session
            .tracker
            .log(Speaker::Assistant, TurnKind::Completion, result.message());
        session.tracker.finish();
        session.closed = true;

        info!(
            session_id = %session.id(),
            answered = session.tracker.answered(),
            total = session.tracker.total(),
            "Interview completed"
        );

        Reply {
            success: true,
            message: result.message().to_string(),
            total_questions: session.tracker.total(),
            completed: true,
            answers: Some(session.tracker.snapshot()),
            answered_questions: Some(session.tracker.answered()),
            ..Reply::default()
        }
    }
}

/// Position fields for a reply about `question`.
fn question_reply(tracker: &Tracker, question: &Question) -> Reply {
    Reply {
        total_questions: tracker.total(),
        question_number: Some(tracker.cursor() + 1),
        question_id: Some(question.id),
        question_type: Some(question.kind),
        is_required: Some(question.is_required),
        ..Reply::default()
    }
}

/// Log the unaccepted answer and a follow-up; the cursor stays put.
fn followup(session: &mut InterviewSession, question: &Question, raw: &str, message: &str) -> Reply {
    session.tracker.log(Speaker::User, TurnKind::Answer, raw);
    session.tracker.log(Speaker::Assistant, TurnKind::Followup, message);
    Reply {
        success: true,
        message: message.to_string(),
        needs_clarification: true,
        ..question_reply(&session.tracker, question)
    }
}

fn already_completed(session: &InterviewSession) -> Reply {
    Reply {
        success: true,
        message: ALREADY_COMPLETED.to_string(),
        total_questions: session.tracker.total(),
        completed: true,
        ..Reply::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::model::Section;
    use crate::interview::sessions::InMemorySessionStore;
    use crate::interview::validation::AnswerItem;
    use crate::llm::LlmProvider;
    use crate::llm::test_support::ScriptedLlm;
    use crate::store::LibSqlBackend;

    struct Fixture {
        conductor: Conductor,
        llm: Arc<ScriptedLlm>,
        backend: Arc<LibSqlBackend>,
        db: Arc<dyn Database>,
        interview: Interview,
        name: Question,
        color: Question,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let db: Arc<dyn Database> = backend.clone();
        let interview = Interview::new("Backend Screen", "");
        db.insert_interview(&interview).await.unwrap();
        let section = Section::new(interview.id, "Basics", 0);
        db.insert_section(&section).await.unwrap();
        let name = Question::new(section.id, "Name?", 0);
        let color = Question::new(section.id, "Favorite color?", 1).with_options(["Red", "Blue"]);
        db.insert_question(&name).await.unwrap();
        db.insert_question(&color).await.unwrap();

        let llm = ScriptedLlm::new();
        let proxy = Arc::new(CompletionProxy::new(llm.clone() as Arc<dyn LlmProvider>));
        let conductor = Conductor::new(
            db.clone(),
            InMemorySessionStore::new(),
            proxy,
            InterviewerConfig::default(),
        );
        Fixture {
            conductor,
            llm,
            backend,
            db,
            interview,
            name,
            color,
        }
    }

    fn extraction(answer: &str) -> String {
        serde_json::json!({
            "answer": answer,
            "is_valid": true,
            "confidence": 0.9,
            "needs_clarification": false,
        })
        .to_string()
    }

    fn alice() -> CandidateInfo {
        CandidateInfo {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_greets_and_stores_session() {
        let f = fixture().await;
        f.llm.push_reply("Welcome to the Backend Screen!");
        let start = f.conductor.start(f.interview.id, None).await.unwrap();
        assert!(start.success);
        assert_eq!(start.total_questions, 2);
        assert_eq!(start.message, "Welcome to the Backend Screen!");

        let data = f.conductor.status(start.session_id).await.unwrap();
        assert_eq!(data.current_question, 0);
        assert_eq!(data.transcript.len(), 2);
        assert_eq!(data.transcript[1].kind, TurnKind::Greeting);
    }

    #[tokio::test]
    async fn start_unknown_or_inactive_interview_is_not_found() {
        let f = fixture().await;
        let err = f.conductor.start(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Interview(InterviewError::InterviewNotFound { .. })
        ));

        let mut inactive = f.interview.clone();
        inactive.is_active = false;
        f.db.update_interview(&inactive).await.unwrap();
        assert!(f.conductor.start(f.interview.id, None).await.is_err());
    }

    #[tokio::test]
    async fn full_conversation_then_submit() {
        let f = fixture().await;
        let start = f.conductor.start(f.interview.id, Some(alice())).await.unwrap();
        let id = start.session_id;

        f.llm.push_reply("What's your name?");
        let q1 = f.conductor.next_question(id).await.unwrap();
        assert_eq!(q1.question_number, Some(1));
        assert_eq!(q1.question_id, Some(f.name.id));

        f.llm.push_reply(&extraction("Alice"));
        f.llm.push_reply("Which color do you like, Red or Blue?");
        let r1 = f.conductor.respond(id, "My name is Alice").await.unwrap();
        assert!(r1.answer_saved);
        assert_eq!(r1.answered_question_id, Some(f.name.id));
        assert_eq!(r1.question_number, Some(2));
        assert!(r1.message.starts_with(ANSWER_RECEIVED));

        f.llm.push_reply(&extraction("blue"));
        f.llm.push_reply("Thanks for your time!");
        let r2 = f.conductor.respond(id, "Blue, definitely").await.unwrap();
        assert!(r2.completed);
        assert_eq!(r2.message, "Thanks for your time!");
        let answers = r2.answers.unwrap();
        assert_eq!(answers.pairs(), vec![(f.name.id, "Alice"), (f.color.id, "Blue")]);

        let again = f.conductor.respond(id, "one more thing").await.unwrap();
        assert_eq!(again.message, ALREADY_COMPLETED);

        let submitted = f.conductor.submit(id, None).await.unwrap();
        assert_eq!(submitted.answers_saved, 2);

        let detail = f.db.get_response(submitted.response_id).await.unwrap().unwrap();
        assert_eq!(detail.response.source, ResponseSource::Ai);
        assert_eq!(detail.answers[1].selected_options, vec!["Blue".to_string()]);
        assert_eq!(detail.candidate.unwrap().email, "alice@example.com");
        assert!(matches!(
            f.conductor.status(id).await,
            Err(Error::Interview(InterviewError::SessionNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn invalid_selection_asks_again_without_advancing() {
        let f = fixture().await;
        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        f.llm.push_reply(&extraction("Alice"));
        f.conductor.respond(id, "Alice").await.unwrap();

        f.llm.push_reply(&extraction("Green"));
        let reply = f.conductor.respond(id, "Green").await.unwrap();
        assert!(reply.needs_clarification);
        assert!(!reply.answer_saved);
        assert!(reply.message.contains("Red, Blue"));
        assert_eq!(f.conductor.status(id).await.unwrap().current_question, 1);
    }

    #[tokio::test]
    async fn model_clarification_is_relayed() {
        let f = fixture().await;
        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        f.llm.push_reply(
            r#"{"needs_clarification": true, "clarification_message": "Could you spell that?"}"#,
        );
        let reply = f.conductor.respond(id, "uh").await.unwrap();
        assert!(reply.needs_clarification);
        assert_eq!(reply.message, "Could you spell that?");
        assert_eq!(reply.question_number, Some(1));
    }

    #[tokio::test]
    async fn extraction_failure_falls_back_to_raw_answer() {
        let f = fixture().await;
        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        f.llm.push_reply("this is not json");
        let reply = f.conductor.respond(id, "Bob").await.unwrap();
        assert!(reply.answer_saved);

        let data = f.conductor.status(id).await.unwrap();
        let entry = &data.answers.entries()[0];
        assert_eq!(entry.answer, "Bob");
        assert_eq!(entry.confidence, 0.5);
    }

    #[tokio::test]
    async fn proxy_failure_is_reported_in_band() {
        let f = fixture().await;
        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        f.llm.push_failure();
        let reply = f.conductor.next_question(id).await.unwrap();
        assert!(!reply.success);
        assert_eq!(reply.message, crate::interview::prompts::API_ERROR_MESSAGE);
        assert_eq!(reply.question_number, Some(1));
    }

    #[tokio::test]
    async fn complete_is_idempotent_and_works_without_questions() {
        let f = fixture().await;
        let empty = Interview::new("Empty", "");
        f.db.insert_interview(&empty).await.unwrap();
        let id = f.conductor.start(empty.id, None).await.unwrap().session_id;

        let first = f.conductor.complete(id).await.unwrap();
        assert!(first.completed);
        assert_ne!(first.message, ALREADY_COMPLETED);
        let second = f.conductor.complete(id).await.unwrap();
        assert_eq!(second.message, ALREADY_COMPLETED);

        let submitted = f.conductor.submit(id, Some(alice())).await.unwrap();
        assert_eq!(submitted.answers_saved, 0);
    }

    #[tokio::test]
    async fn submit_requires_candidate_and_answers() {
        let f = fixture().await;
        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        assert!(matches!(
            f.conductor.submit(id, None).await,
            Err(Error::Validation(ValidationError::MissingField { .. }))
        ));
        assert!(matches!(
            f.conductor.submit(id, Some(alice())).await,
            Err(Error::Interview(InterviewError::NothingToSubmit { .. }))
        ));
    }

    #[tokio::test]
    async fn form_submission_is_validated_and_stored() {
        let f = fixture().await;
        let submission = FormSubmission {
            candidate_name: "Alice".to_string(),
            candidate_email: "alice@example.com".to_string(),
            candidate_phone: Some("555-0100".to_string()),
            candidate_location: None,
            answers: vec![
                AnswerItem {
                    question: f.name.id,
                    text: "Alice".to_string(),
                    option_values: vec![],
                },
                AnswerItem {
                    question: f.color.id,
                    text: String::new(),
                    option_values: vec!["red".to_string()],
                },
            ],
            transcript: String::new(),
            source: ResponseSource::Form,
        };
        let reply = f.conductor.submit_form(f.interview.id, submission).await.unwrap();
        assert_eq!(reply.answers_saved, 2);

        let detail = f.db.get_response(reply.response_id).await.unwrap().unwrap();
        assert_eq!(detail.answers[1].answer_text, "Red");
        assert_eq!(detail.response.answers_json["answers"][0]["question_text"], "Name?");
        assert_eq!(detail.candidate.unwrap().phone.as_deref(), Some("555-0100"));
    }

    /// Store whose loads yield to the scheduler, so two tasks interleave
    /// between loading a session and claiming it.
    struct YieldingStore(Arc<InMemorySessionStore>);

    #[async_trait::async_trait]
    impl SessionStore for YieldingStore {
        async fn insert(&self, session: InterviewSession) {
            self.0.insert(session).await
        }
        async fn get(&self, id: Uuid) -> std::result::Result<InterviewSession, InterviewError> {
            let session = self.0.get(id).await;
            tokio::task::yield_now().await;
            session
        }
        async fn save(
            &self,
            session: &mut InterviewSession,
        ) -> std::result::Result<(), InterviewError> {
            self.0.save(session).await
        }
        async fn take(
            &self,
            id: Uuid,
            version: u64,
        ) -> std::result::Result<InterviewSession, InterviewError> {
            self.0.take(id, version).await
        }
        async fn restore(&self, session: InterviewSession) {
            self.0.restore(session).await
        }
        async fn remove(&self, id: Uuid) -> Option<InterviewSession> {
            self.0.remove(id).await
        }
        async fn purge_expired(&self) -> usize {
            self.0.purge_expired().await
        }
        async fn len(&self) -> usize {
            self.0.len().await
        }
    }

    #[tokio::test]
    async fn concurrent_submits_store_one_response() {
        let f = fixture().await;
        let llm = ScriptedLlm::new();
        let proxy = Arc::new(CompletionProxy::new(llm.clone() as Arc<dyn LlmProvider>));
        let conductor = Conductor::new(
            f.db.clone(),
            Arc::new(YieldingStore(InMemorySessionStore::new())),
            proxy,
            InterviewerConfig::default(),
        );
        let id = conductor
            .start(f.interview.id, Some(alice()))
            .await
            .unwrap()
            .session_id;
        llm.push_reply(&extraction("Alice"));
        conductor.respond(id, "Alice").await.unwrap();

        let (a, b) = tokio::join!(conductor.submit(id, None), conductor.submit(id, None));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser,
            Err(Error::Interview(
                InterviewError::SessionNotFound { .. } | InterviewError::SessionConflict { .. }
            ))
        ));
        assert_eq!(f.db.list_responses(f.interview.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_restores_the_session() {
        let f = fixture().await;
        let id = f
            .conductor
            .start(f.interview.id, Some(alice()))
            .await
            .unwrap()
            .session_id;
        f.llm.push_reply(&extraction("Alice"));
        f.conductor.respond(id, "Alice").await.unwrap();

        f.backend
            .conn()
            .execute("DROP TABLE answers", ())
            .await
            .unwrap();
        assert!(matches!(
            f.conductor.submit(id, None).await,
            Err(Error::Database(_))
        ));
        let data = f.conductor.status(id).await.unwrap();
        assert_eq!(data.answers.len(), 1);
        assert!(f.db.list_responses(f.interview.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn voice_session_walks_questions_and_persists() {
        let f = fixture().await;
        let start = f.conductor.start_voice(f.interview.id, alice()).await.unwrap();
        assert!(start.assistant_text.starts_with("Hello Alice. Welcome to the interview for Backend Screen."));
        assert!(start.assistant_text.ends_with("First question: Name?"));
        assert_eq!(start.audio_base64.as_deref(), Some("bXAz"));
        assert_eq!(start.question_number, Some(1));
        assert!(!start.done);
        assert!(f.llm.requests().is_empty());

        let id = start.session_id;
        let second = f.conductor.respond_voice(id, "Alice").await.unwrap();
        assert_eq!(
            second.assistant_text,
            "Thank you. Next question: Favorite color? Options are: Red; Blue"
        );

        let retry = f.conductor.respond_voice(id, "green").await.unwrap();
        assert!(retry.assistant_text.contains("Red, Blue"));
        assert_eq!(retry.question_number, Some(2));

        f.llm.fail_audio();
        let last = f.conductor.respond_voice(id, "blue").await.unwrap();
        assert!(last.done);
        assert_eq!(last.assistant_text, VOICE_CLOSING);
        assert!(last.audio_base64.is_none());

        let detail = f.db.get_response(last.response_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(detail.answers[1].answer_text, "Blue");
        assert_eq!(detail.candidate.unwrap().full_name, "Alice");
        assert!(f.conductor.status(id).await.is_err());
    }

    #[tokio::test]
    async fn voice_session_without_questions_is_done_at_once() {
        let f = fixture().await;
        let empty = Interview::new("Empty", "");
        f.db.insert_interview(&empty).await.unwrap();
        let turn = f.conductor.start_voice(empty.id, alice()).await.unwrap();
        assert!(turn.done);
        assert_eq!(turn.total_questions, 0);
        assert!(turn.assistant_text.contains("no questions configured"));
        assert!(matches!(
            f.conductor.respond_voice(turn.session_id, " ").await,
            Err(Error::Validation(ValidationError::MissingField { .. }))
        ));
    }

    #[tokio::test]
    async fn transcribe_needs_live_session_and_surfaces_failure() {
        let f = fixture().await;
        assert!(f.conductor.transcribe(Uuid::new_v4(), vec![1]).await.is_err());

        let id = f.conductor.start(f.interview.id, None).await.unwrap().session_id;
        assert_eq!(
            f.conductor.transcribe(id, vec![1, 2]).await.unwrap(),
            "transcribed words"
        );
        f.llm.fail_audio();
        assert!(matches!(
            f.conductor.transcribe(id, vec![1, 2]).await,
            Err(Error::Interview(InterviewError::ProxyUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn realtime_offer_carries_instructions() {
        let f = fixture().await;
        let offer = f.conductor.realtime(f.interview.id).await.unwrap();
        assert_eq!(offer.session.token, "ek_test");
        assert!(offer.instructions.contains("1. Name?"));
        assert_eq!(offer.questions.len(), 2);
        assert_eq!(f.llm.last_instructions().unwrap(), offer.instructions);
    }
}
