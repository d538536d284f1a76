//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::model::{
    AnswerRecord, Candidate, CandidateInfo, Interview, InterviewDetail, InterviewResponse,
    Question, ResponseDetail, Section,
};

/// Backend-agnostic database trait covering interview forms, candidates,
/// and submitted responses.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Interviews ──────────────────────────────────────────────────

    async fn insert_interview(&self, interview: &Interview) -> Result<(), DatabaseError>;

    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>, DatabaseError>;

    /// Newest first. With `active_only`, inactive forms are skipped.
    async fn list_interviews(&self, active_only: bool) -> Result<Vec<Interview>, DatabaseError>;

    /// Overwrite title, description and active flag.
    async fn update_interview(&self, interview: &Interview) -> Result<(), DatabaseError>;

    /// Delete an interview with its sections, questions and responses.
    /// Returns `false` if it did not exist.
    async fn delete_interview(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Sections ────────────────────────────────────────────────────

    async fn insert_section(&self, section: &Section) -> Result<(), DatabaseError>;

    /// Sections of an interview in display order.
    async fn list_sections(&self, interview_id: Uuid) -> Result<Vec<Section>, DatabaseError>;

    // ── Questions ───────────────────────────────────────────────────

    async fn insert_question(&self, question: &Question) -> Result<(), DatabaseError>;

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, DatabaseError>;

    async fn update_question(&self, question: &Question) -> Result<(), DatabaseError>;

    async fn delete_question(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// All questions of an interview, ordered by position (ties by section
    /// order, then insertion).
    async fn list_questions(&self, interview_id: Uuid) -> Result<Vec<Question>, DatabaseError>;

    /// Interview with its sections and ordered questions.
    async fn get_interview_detail(
        &self,
        id: Uuid,
    ) -> Result<Option<InterviewDetail>, DatabaseError> {
        let Some(interview) = self.get_interview(id).await? else {
            return Ok(None);
        };
        let sections = self.list_sections(id).await?;
        let questions = self.list_questions(id).await?;
        Ok(Some(InterviewDetail {
            interview,
            sections,
            questions,
        }))
    }

    // ── Candidates ──────────────────────────────────────────────────

    /// Find the candidate by email, updating the name, or create one.
    async fn upsert_candidate(&self, info: &CandidateInfo) -> Result<Candidate, DatabaseError>;

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, DatabaseError>;

    // ── Responses ───────────────────────────────────────────────────

    /// Insert a response and its answers atomically.
    async fn insert_response(
        &self,
        response: &InterviewResponse,
        answers: &[AnswerRecord],
    ) -> Result<(), DatabaseError>;

    /// Responses for an interview, newest first.
    async fn list_responses(
        &self,
        interview_id: Uuid,
    ) -> Result<Vec<InterviewResponse>, DatabaseError>;

    /// A response with its candidate and answers.
    async fn get_response(&self, id: Uuid) -> Result<Option<ResponseDetail>, DatabaseError>;
}
