//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::model::{
    AnswerRecord, Candidate, CandidateInfo, Interview, InterviewResponse, Question, QuestionKind,
    ResponseDetail, ResponseSource, Section,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid '{s}': {e}")))
}

fn parse_string_list(s: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Serialization(format!("bad list: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn query_err(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

const INTERVIEW_COLUMNS: &str = "id, title, description, is_active, created_at, updated_at";

fn row_to_interview(row: &libsql::Row) -> Result<Interview, DatabaseError> {
    let err = query_err("interview row");
    let id: String = row.get(0).map_err(&err)?;
    let created: String = row.get(4).map_err(&err)?;
    let updated: String = row.get(5).map_err(&err)?;
    Ok(Interview {
        id: parse_uuid(&id)?,
        title: row.get(1).map_err(&err)?,
        description: row.get(2).map_err(&err)?,
        is_active: row.get::<i64>(3).map_err(&err)? != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const SECTION_COLUMNS: &str = "id, interview_id, title, description, sort_order";

fn row_to_section(row: &libsql::Row) -> Result<Section, DatabaseError> {
    let err = query_err("section row");
    let id: String = row.get(0).map_err(&err)?;
    let interview_id: String = row.get(1).map_err(&err)?;
    Ok(Section {
        id: parse_uuid(&id)?,
        interview_id: parse_uuid(&interview_id)?,
        title: row.get(2).map_err(&err)?,
        description: row.get(3).map_err(&err)?,
        order: row.get(4).map_err(&err)?,
    })
}

const QUESTION_COLUMNS: &str =
    "q.id, q.section_id, q.text, q.kind, q.is_required, q.position, q.options";

fn row_to_question(row: &libsql::Row) -> Result<Question, DatabaseError> {
    let err = query_err("question row");
    let id: String = row.get(0).map_err(&err)?;
    let section_id: String = row.get(1).map_err(&err)?;
    let kind: String = row.get(3).map_err(&err)?;
    let options: String = row.get(6).map_err(&err)?;
    Ok(Question {
        id: parse_uuid(&id)?,
        section_id: parse_uuid(&section_id)?,
        text: row.get(2).map_err(&err)?,
        kind: kind.parse::<QuestionKind>().unwrap_or_default(),
        is_required: row.get::<i64>(4).map_err(&err)? != 0,
        position: row.get(5).map_err(&err)?,
        options: parse_string_list(&options)?,
    })
}

const CANDIDATE_COLUMNS: &str = "id, full_name, email, phone, location, created_at, updated_at";

fn row_to_candidate(row: &libsql::Row) -> Result<Candidate, DatabaseError> {
    let err = query_err("candidate row");
    let id: String = row.get(0).map_err(&err)?;
    let created: String = row.get(5).map_err(&err)?;
    let updated: String = row.get(6).map_err(&err)?;
    Ok(Candidate {
        id: parse_uuid(&id)?,
        full_name: row.get(1).map_err(&err)?,
        email: row.get(2).map_err(&err)?,
        phone: row.get::<Option<String>>(3).map_err(&err)?,
        location: row.get::<Option<String>>(4).map_err(&err)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const RESPONSE_COLUMNS: &str = "id, interview_id, candidate_id, source, submitted_at, answers_json";

fn row_to_response(row: &libsql::Row) -> Result<InterviewResponse, DatabaseError> {
    let err = query_err("response row");
    let id: String = row.get(0).map_err(&err)?;
    let interview_id: String = row.get(1).map_err(&err)?;
    let candidate_id: Option<String> = row.get(2).map_err(&err)?;
    let source: String = row.get(3).map_err(&err)?;
    let submitted: String = row.get(4).map_err(&err)?;
    let answers_json: String = row.get(5).map_err(&err)?;
    Ok(InterviewResponse {
        id: parse_uuid(&id)?,
        interview_id: parse_uuid(&interview_id)?,
        candidate_id: candidate_id.as_deref().map(parse_uuid).transpose()?,
        source: source.parse::<ResponseSource>().unwrap_or_default(),
        submitted_at: parse_datetime(&submitted),
        answers_json: serde_json::from_str(&answers_json)
            .map_err(|e| DatabaseError::Serialization(format!("answers_json: {e}")))?,
    })
}

fn row_to_answer(row: &libsql::Row) -> Result<AnswerRecord, DatabaseError> {
    let err = query_err("answer row");
    let id: String = row.get(0).map_err(&err)?;
    let response_id: String = row.get(1).map_err(&err)?;
    let question_id: String = row.get(2).map_err(&err)?;
    let selected: String = row.get(4).map_err(&err)?;
    Ok(AnswerRecord {
        id: parse_uuid(&id)?,
        response_id: parse_uuid(&response_id)?,
        question_id: parse_uuid(&question_id)?,
        answer_text: row.get(3).map_err(&err)?,
        selected_options: parse_string_list(&selected)?,
    })
}

/// Collect every row of a query with `map`.
async fn collect<T>(
    mut rows: libsql::Rows,
    op: &'static str,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err(op))? {
        out.push(map(&row)?);
    }
    Ok(out)
}

/// First row of a query mapped with `map`, if any.
async fn first<T>(
    mut rows: libsql::Rows,
    op: &'static str,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Option<T>, DatabaseError> {
    match rows.next().await.map_err(query_err(op))? {
        Some(row) => Ok(Some(map(&row)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Interviews ──────────────────────────────────────────────────

    async fn insert_interview(&self, interview: &Interview) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO interviews (id, title, description, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    interview.id.to_string(),
                    interview.title.clone(),
                    interview.description.clone(),
                    interview.is_active as i64,
                    interview.created_at.to_rfc3339(),
                    interview.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err("insert_interview"))?;
        debug!(interview_id = %interview.id, "Interview inserted");
        Ok(())
    }

    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_interview"))?;
        first(rows, "get_interview", row_to_interview).await
    }

    async fn list_interviews(&self, active_only: bool) -> Result<Vec<Interview>, DatabaseError> {
        let sql = if active_only {
            format!(
                "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE is_active = 1 ORDER BY created_at DESC"
            )
        } else {
            format!("SELECT {INTERVIEW_COLUMNS} FROM interviews ORDER BY created_at DESC")
        };
        let rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(query_err("list_interviews"))?;
        collect(rows, "list_interviews", row_to_interview).await
    }

    async fn update_interview(&self, interview: &Interview) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE interviews SET title = ?1, description = ?2, is_active = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    interview.title.clone(),
                    interview.description.clone(),
                    interview.is_active as i64,
                    interview.updated_at.to_rfc3339(),
                    interview.id.to_string(),
                ],
            )
            .await
            .map_err(query_err("update_interview"))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "interview".to_string(),
                id: interview.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_interview(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("delete_interview"))?;
        let id = id.to_string();

        tx.execute(
            "DELETE FROM answers WHERE response_id IN (SELECT id FROM responses WHERE interview_id = ?1)",
            params![id.clone()],
        )
        .await
        .map_err(query_err("delete_interview answers"))?;
        tx.execute(
            "DELETE FROM responses WHERE interview_id = ?1",
            params![id.clone()],
        )
        .await
        .map_err(query_err("delete_interview responses"))?;
        tx.execute(
            "DELETE FROM questions WHERE section_id IN (SELECT id FROM sections WHERE interview_id = ?1)",
            params![id.clone()],
        )
        .await
        .map_err(query_err("delete_interview questions"))?;
        tx.execute(
            "DELETE FROM sections WHERE interview_id = ?1",
            params![id.clone()],
        )
        .await
        .map_err(query_err("delete_interview sections"))?;
        let deleted = tx
            .execute("DELETE FROM interviews WHERE id = ?1", params![id.clone()])
            .await
            .map_err(query_err("delete_interview"))?;

        tx.commit().await.map_err(query_err("delete_interview commit"))?;
        debug!(interview_id = %id, deleted, "Interview deleted");
        Ok(deleted > 0)
    }

    // ── Sections ────────────────────────────────────────────────────

    async fn insert_section(&self, section: &Section) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sections (id, interview_id, title, description, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    section.id.to_string(),
                    section.interview_id.to_string(),
                    section.title.clone(),
                    section.description.clone(),
                    section.order,
                ],
            )
            .await
            .map_err(query_err("insert_section"))?;
        Ok(())
    }

    async fn list_sections(&self, interview_id: Uuid) -> Result<Vec<Section>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SECTION_COLUMNS} FROM sections WHERE interview_id = ?1
                     ORDER BY sort_order, rowid"
                ),
                params![interview_id.to_string()],
            )
            .await
            .map_err(query_err("list_sections"))?;
        collect(rows, "list_sections", row_to_section).await
    }

    // ── Questions ───────────────────────────────────────────────────

    async fn insert_question(&self, question: &Question) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO questions (id, section_id, text, kind, is_required, position, options)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    question.id.to_string(),
                    question.section_id.to_string(),
                    question.text.clone(),
                    question.kind.to_string(),
                    question.is_required as i64,
                    question.position,
                    to_json(&question.options)?,
                ],
            )
            .await
            .map_err(query_err("insert_question"))?;
        Ok(())
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_question"))?;
        first(rows, "get_question", row_to_question).await
    }

    async fn update_question(&self, question: &Question) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE questions SET section_id = ?1, text = ?2, kind = ?3, is_required = ?4,
                 position = ?5, options = ?6 WHERE id = ?7",
                params![
                    question.section_id.to_string(),
                    question.text.clone(),
                    question.kind.to_string(),
                    question.is_required as i64,
                    question.position,
                    to_json(&question.options)?,
                    question.id.to_string(),
                ],
            )
            .await
            .map_err(query_err("update_question"))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "question".to_string(),
                id: question.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("delete_question"))?;
        let id = id.to_string();

        tx.execute("DELETE FROM answers WHERE question_id = ?1", params![id.clone()])
            .await
            .map_err(query_err("delete_question answers"))?;
        let deleted = tx
            .execute("DELETE FROM questions WHERE id = ?1", params![id.clone()])
            .await
            .map_err(query_err("delete_question"))?;

        tx.commit().await.map_err(query_err("delete_question commit"))?;
        Ok(deleted > 0)
    }

    async fn list_questions(&self, interview_id: Uuid) -> Result<Vec<Question>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q
                     JOIN sections s ON s.id = q.section_id
                     WHERE s.interview_id = ?1
                     ORDER BY q.position, s.sort_order, q.rowid"
                ),
                params![interview_id.to_string()],
            )
            .await
            .map_err(query_err("list_questions"))?;
        collect(rows, "list_questions", row_to_question).await
    }

    // ── Candidates ──────────────────────────────────────────────────

    async fn upsert_candidate(&self, info: &CandidateInfo) -> Result<Candidate, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        // Single statement so two first-time submissions for one email
        // cannot race on the UNIQUE constraint.
        let rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO candidates (id, full_name, email, phone, location, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     ON CONFLICT(email) DO UPDATE SET
                         full_name = excluded.full_name,
                         phone = COALESCE(excluded.phone, candidates.phone),
                         location = COALESCE(excluded.location, candidates.location),
                         updated_at = excluded.updated_at
                     RETURNING {CANDIDATE_COLUMNS}"
                ),
                params![
                    Uuid::new_v4().to_string(),
                    info.name.clone(),
                    info.email.clone(),
                    info.phone.clone(),
                    info.location.clone(),
                    now,
                ],
            )
            .await
            .map_err(query_err("upsert_candidate"))?;

        let candidate = first(rows, "upsert_candidate", row_to_candidate)
            .await?
            .ok_or_else(|| DatabaseError::Query("upsert_candidate returned no row".to_string()))?;
        debug!(candidate_id = %candidate.id, "Candidate upserted");
        Ok(candidate)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_candidate"))?;
        first(rows, "get_candidate", row_to_candidate).await
    }

    // ── Responses ───────────────────────────────────────────────────

    async fn insert_response(
        &self,
        response: &InterviewResponse,
        answers: &[AnswerRecord],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("insert_response"))?;

        tx.execute(
            "INSERT INTO responses (id, interview_id, candidate_id, source, submitted_at, answers_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                response.id.to_string(),
                response.interview_id.to_string(),
                response.candidate_id.map(|id| id.to_string()),
                response.source.to_string(),
                response.submitted_at.to_rfc3339(),
                to_json(&response.answers_json)?,
            ],
        )
        .await
        .map_err(query_err("insert_response"))?;

        for (order, answer) in answers.iter().enumerate() {
            tx.execute(
                "INSERT INTO answers (id, response_id, question_id, answer_text, selected_options, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    answer.id.to_string(),
                    answer.response_id.to_string(),
                    answer.question_id.to_string(),
                    answer.answer_text.clone(),
                    to_json(&answer.selected_options)?,
                    order as i64,
                ],
            )
            .await
            .map_err(query_err("insert_response answer"))?;
        }

        tx.commit().await.map_err(query_err("insert_response commit"))?;
        info!(
            response_id = %response.id,
            interview_id = %response.interview_id,
            answers = answers.len(),
            "Response stored"
        );
        Ok(())
    }

    async fn list_responses(
        &self,
        interview_id: Uuid,
    ) -> Result<Vec<InterviewResponse>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RESPONSE_COLUMNS} FROM responses WHERE interview_id = ?1
                     ORDER BY submitted_at DESC"
                ),
                params![interview_id.to_string()],
            )
            .await
            .map_err(query_err("list_responses"))?;
        collect(rows, "list_responses", row_to_response).await
    }

    async fn get_response(&self, id: Uuid) -> Result<Option<ResponseDetail>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {RESPONSE_COLUMNS} FROM responses WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_response"))?;
        let Some(response) = first(rows, "get_response", row_to_response).await? else {
            return Ok(None);
        };

        let candidate = match response.candidate_id {
            Some(candidate_id) => self.get_candidate(candidate_id).await?,
            None => None,
        };

        let rows = self
            .conn()
            .query(
                "SELECT id, response_id, question_id, answer_text, selected_options FROM answers
                 WHERE response_id = ?1 ORDER BY sort_order",
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_response answers"))?;
        let answers = collect(rows, "get_response answers", row_to_answer).await?;

        Ok(Some(ResponseDetail {
            response,
            candidate,
            answers,
        }))
    }
}
