//! REST endpoints: interview authoring, form submission, the AI
//! conversational flow, speech helpers, realtime minting and response review.

use std::sync::{Arc, LazyLock};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, Error, InterviewError, ValidationError};
use crate::store::Database;

use super::conductor::Conductor;
use super::model::{CandidateInfo, Interview, Question, QuestionKind, Section};
use super::validation::FormSubmission;

/// Largest accepted request body (audio uploads included).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub conductor: Arc<Conductor>,
}

/// Build the Axum router with every interview route.
pub fn interview_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/interviews", get(list_interviews).post(create_interview))
        .route(
            "/api/interviews/{id}",
            get(get_interview)
                .patch(update_interview)
                .delete(delete_interview),
        )
        .route("/api/interviews/{id}/sections", post(create_section))
        .route("/api/interviews/{id}/questions", post(create_question))
        .route(
            "/api/questions/{id}",
            patch(update_question).delete(delete_question),
        )
        .route("/api/interviews/{id}/submit", post(submit_form))
        .route("/api/interviews/{id}/responses", get(list_responses))
        .route("/api/responses/{id}", get(get_response))
        .route("/api/interviews/{id}/sessions", post(start_session))
        .route("/api/interviews/{id}/realtime", post(mint_realtime))
        .route("/api/sessions/{id}", get(session_status))
        .route("/api/sessions/{id}/next", post(next_question))
        .route("/api/sessions/{id}/answer", post(answer))
        .route("/api/sessions/{id}/complete", post(complete_session))
        .route("/api/sessions/{id}/submit", post(submit_session))
        .route("/api/sessions/{id}/transcribe", post(transcribe))
        .route("/api/interviews/{id}/voice", post(start_voice))
        .route("/api/sessions/{id}/voice", post(voice_reply))
        .route("/api/speak", post(speak))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error returned from handlers; rendered as `{"success": false, "error": ..}`.
pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Interview(e) => match e {
            InterviewError::SessionNotFound { .. } | InterviewError::InterviewNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            InterviewError::SessionConflict { .. } | InterviewError::OutOfSequence { .. } => {
                StatusCode::CONFLICT
            }
            InterviewError::NothingToSubmit { .. } => StatusCode::BAD_REQUEST,
            InterviewError::ProxyUnavailable { .. } => StatusCode::BAD_GATEWAY,
        },
        Error::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Llm(_) => StatusCode::BAD_GATEWAY,
        Error::Database(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let mut body = json!({ "success": false });

        match &self.0 {
            Error::Interview(InterviewError::ProxyUnavailable { message, reason }) => {
                warn!(reason = %reason, "External service call failed");
                body["error"] = json!(message);
            }
            Error::Validation(e) => {
                body["error"] = json!(e.to_string());
                if let Some(field) = validation_field(e) {
                    body["field"] = json!(field);
                }
            }
            e if status.is_server_error() => {
                error!(error = %e, "Request failed");
                body["error"] = json!("Internal server error");
            }
            e => body["error"] = json!(e.to_string()),
        }

        (status, Json(body)).into_response()
    }
}

/// Name of the field a validation error is about.
fn validation_field(err: &ValidationError) -> Option<String> {
    match err {
        ValidationError::MissingField { field }
        | ValidationError::InvalidEmail { field, .. }
        | ValidationError::InvalidValue { field, .. } => Some(field.clone()),
        ValidationError::UnknownQuestion { question_id, .. }
        | ValidationError::MissingRequired { question_id }
        | ValidationError::InvalidSelection { question_id, .. } => {
            Some(format!("question_{question_id}"))
        }
    }
}

type ApiResult<T = Response> = Result<T, ApiError>;

// ── Extractors ──────────────────────────────────────────────────────────
//
// Wrappers over axum's extractors whose rejections render through
// `ApiError`, so malformed requests get the same JSON error body as
// failed validation.

static MISSING_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"missing field `([^`]+)`").expect("missing field regex is valid")
});

/// JSON request body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection).into()),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> ValidationError {
    let reason = rejection.body_text();
    match MISSING_FIELD_RE.captures(&reason) {
        Some(caps) => ValidationError::MissingField {
            field: caps[1].to_string(),
        },
        None => ValidationError::InvalidValue {
            field: "body".to_string(),
            reason,
        },
    }
}

/// Path parameters.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::InvalidValue {
                field: "id".to_string(),
                reason: rejection.body_text(),
            }
            .into()),
        }
    }
}

/// Query string.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::InvalidValue {
                field: "query".to_string(),
                reason: rejection.body_text(),
            }
            .into()),
        }
    }
}

fn require(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Parse a JSON body that may be empty.
fn optional_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ValidationError::InvalidValue {
            field: "body".to_string(),
            reason: e.to_string(),
        })
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "status": "ok",
        "service": "ai-interviewer",
        "active_sessions": state.conductor.sessions().len().await,
    }))
}

// ── Interviews ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    active_only: bool,
}

async fn list_interviews(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let interviews = state.db.list_interviews(query.active_only).await?;
    Ok(Json(json!({ "success": true, "interviews": interviews })).into_response())
}

#[derive(Deserialize)]
struct CreateInterview {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    is_active: Option<bool>,
}

async fn create_interview(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateInterview>,
) -> ApiResult {
    let mut interview = Interview::new(require("title", &req.title)?, req.description.trim());
    if let Some(active) = req.is_active {
        interview.is_active = active;
    }
    state.db.insert_interview(&interview).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "interview": interview })),
    )
        .into_response())
}

async fn get_interview(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let detail = state
        .db
        .get_interview_detail(id)
        .await?
        .ok_or(InterviewError::InterviewNotFound { id })?;
    Ok(Json(json!({ "success": true, "interview": detail })).into_response())
}

#[derive(Deserialize)]
struct UpdateInterview {
    title: Option<String>,
    description: Option<String>,
    is_active: Option<bool>,
}

async fn update_interview(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateInterview>,
) -> ApiResult {
    let mut interview = state
        .db
        .get_interview(id)
        .await?
        .ok_or(InterviewError::InterviewNotFound { id })?;
    if let Some(title) = req.title {
        interview.title = require("title", &title)?;
    }
    if let Some(description) = req.description {
        interview.description = description.trim().to_string();
    }
    if let Some(active) = req.is_active {
        interview.is_active = active;
    }
    interview.updated_at = Utc::now();
    state.db.update_interview(&interview).await?;
    Ok(Json(json!({ "success": true, "interview": interview })).into_response())
}

async fn delete_interview(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    if !state.db.delete_interview(id).await? {
        return Err(InterviewError::InterviewNotFound { id }.into());
    }
    Ok(Json(json!({ "success": true })).into_response())
}

// ── Sections and questions ──────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateSection {
    title: String,
    #[serde(default)]
    description: String,
    order: Option<i64>,
}

async fn create_section(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateSection>,
) -> ApiResult {
    if state.db.get_interview(id).await?.is_none() {
        return Err(InterviewError::InterviewNotFound { id }.into());
    }
    let existing = state.db.list_sections(id).await?;
    let order = req.order.unwrap_or(existing.len() as i64);
    let mut section = Section::new(id, require("title", &req.title)?, order);
    section.description = req.description.trim().to_string();
    state.db.insert_section(&section).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "section": section })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct QuestionFields {
    section_id: Option<Uuid>,
    text: Option<String>,
    kind: Option<QuestionKind>,
    is_required: Option<bool>,
    position: Option<i64>,
    options: Option<Vec<String>>,
}

/// Apply `fields` to `question` and check the result is well-formed.
fn apply_question_fields(
    question: &mut Question,
    fields: QuestionFields,
) -> Result<(), ValidationError> {
    if let Some(text) = fields.text {
        question.text = require("text", &text)?;
    }
    if let Some(kind) = fields.kind {
        question.kind = kind;
    }
    if let Some(required) = fields.is_required {
        question.is_required = required;
    }
    if let Some(position) = fields.position {
        question.position = position;
    }
    if let Some(options) = fields.options {
        question.options = options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }

    if question.text.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "text".to_string(),
        });
    }
    if question.kind.is_choice() && question.options.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "options".to_string(),
            reason: "multiple choice questions need at least one option".to_string(),
        });
    }
    if !question.kind.is_choice() {
        question.options.clear();
    }
    Ok(())
}

/// Resolve the section a new question goes into, creating a default one for
/// interviews that have none.
async fn resolve_section(
    db: &dyn Database,
    interview_id: Uuid,
    requested: Option<Uuid>,
) -> ApiResult<Uuid> {
    let sections = db.list_sections(interview_id).await?;
    match requested {
        Some(section_id) if sections.iter().any(|s| s.id == section_id) => Ok(section_id),
        Some(_) => Err(ValidationError::InvalidValue {
            field: "section_id".to_string(),
            reason: "section does not belong to this interview".to_string(),
        }
        .into()),
        None => match sections.first() {
            Some(section) => Ok(section.id),
            None => {
                let section = Section::new(interview_id, "General", 0);
                db.insert_section(&section).await?;
                Ok(section.id)
            }
        },
    }
}

async fn create_question(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(fields): ApiJson<QuestionFields>,
) -> ApiResult {
    if state.db.get_interview(id).await?.is_none() {
        return Err(InterviewError::InterviewNotFound { id }.into());
    }
    let section_id = resolve_section(state.db.as_ref(), id, fields.section_id).await?;
    let position = state.db.list_questions(id).await?.len() as i64;

    let mut question = Question::new(section_id, "", position);
    apply_question_fields(&mut question, fields)?;
    state.db.insert_question(&question).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "question": question })),
    )
        .into_response())
}

async fn update_question(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(mut fields): ApiJson<QuestionFields>,
) -> ApiResult {
    let mut question = state
        .db
        .get_question(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "question".to_string(),
            id: id.to_string(),
        })?;
    // Moving between sections is not supported through this endpoint.
    fields.section_id = None;
    apply_question_fields(&mut question, fields)?;
    state.db.update_question(&question).await?;
    Ok(Json(json!({ "success": true, "question": question })).into_response())
}

async fn delete_question(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    if !state.db.delete_question(id).await? {
        return Err(DatabaseError::NotFound {
            entity: "question".to_string(),
            id: id.to_string(),
        }
        .into());
    }
    Ok(Json(json!({ "success": true })).into_response())
}

// ── Form submission and review ──────────────────────────────────────────

async fn submit_form(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(submission): ApiJson<FormSubmission>,
) -> ApiResult {
    let reply = state.conductor.submit_form(id, submission).await?;
    Ok((StatusCode::CREATED, Json(reply)).into_response())
}

async fn list_responses(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    if state.db.get_interview(id).await?.is_none() {
        return Err(InterviewError::InterviewNotFound { id }.into());
    }
    let responses = state.db.list_responses(id).await?;
    Ok(Json(json!({ "success": true, "responses": responses })).into_response())
}

async fn get_response(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let detail = state
        .db
        .get_response(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "response".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(json!({ "success": true, "response": detail })).into_response())
}

// ── AI conversational flow ──────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct CandidateFields {
    #[serde(default)]
    candidate_name: String,
    #[serde(default)]
    candidate_email: String,
    #[serde(default)]
    candidate_phone: Option<String>,
    #[serde(default)]
    candidate_location: Option<String>,
}

impl CandidateFields {
    /// `None` when neither field was given.
    fn into_info(self) -> Option<CandidateInfo> {
        if self.candidate_name.trim().is_empty() && self.candidate_email.trim().is_empty() {
            return None;
        }
        Some(CandidateInfo {
            name: self.candidate_name,
            email: self.candidate_email,
            phone: self.candidate_phone,
            location: self.candidate_location,
        })
    }
}

async fn start_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    let candidate = optional_body::<CandidateFields>(&body)?.and_then(CandidateFields::into_info);
    let reply = state.conductor.start(id, candidate).await?;
    Ok(Json(reply).into_response())
}

async fn session_status(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let data = state.conductor.status(id).await?;
    Ok(Json(json!({ "success": true, "session": data })).into_response())
}

async fn next_question(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let reply = state.conductor.next_question(id).await?;
    Ok(Json(reply).into_response())
}

#[derive(Deserialize)]
struct AnswerBody {
    #[serde(alias = "text")]
    message: String,
}

async fn answer(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AnswerBody>,
) -> ApiResult {
    let reply = state.conductor.respond(id, &req.message).await?;
    Ok(Json(reply).into_response())
}

async fn complete_session(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let reply = state.conductor.complete(id).await?;
    Ok(Json(reply).into_response())
}

async fn submit_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    let candidate = optional_body::<CandidateFields>(&body)?.and_then(CandidateFields::into_info);
    let reply = state.conductor.submit(id, candidate).await?;
    Ok((StatusCode::CREATED, Json(reply)).into_response())
}

// ── Scripted voice flow ─────────────────────────────────────────────────

async fn start_voice(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(fields): ApiJson<CandidateFields>,
) -> ApiResult {
    let candidate = fields
        .into_info()
        .ok_or_else(|| ValidationError::MissingField {
            field: "candidate_name".to_string(),
        })?;
    let turn = state.conductor.start_voice(id, candidate).await?;
    Ok((StatusCode::CREATED, Json(turn)).into_response())
}

async fn voice_reply(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AnswerBody>,
) -> ApiResult {
    let turn = state.conductor.respond_voice(id, &req.message).await?;
    Ok(Json(turn).into_response())
}

// ── Speech and realtime ─────────────────────────────────────────────────

async fn transcribe(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    if body.is_empty() {
        return Err(ValidationError::MissingField {
            field: "audio".to_string(),
        }
        .into());
    }
    let text = state.conductor.transcribe(id, body.to_vec()).await?;
    Ok(Json(json!({ "success": true, "text": text })).into_response())
}

#[derive(Deserialize)]
struct SpeakBody {
    text: String,
}

async fn speak(State(state): State<AppState>, ApiJson(req): ApiJson<SpeakBody>) -> ApiResult {
    let audio = state.conductor.speak(&req.text).await?;
    Ok(Json(json!({
        "success": true,
        "format": "mp3",
        "audio_base64": BASE64.encode(audio),
    }))
    .into_response())
}

async fn mint_realtime(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let offer = state.conductor.realtime(id).await?;
    Ok(Json(offer).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::InterviewerConfig;
    use crate::interview::sessions::InMemorySessionStore;
    use crate::llm::test_support::ScriptedLlm;
    use crate::llm::{CompletionProxy, LlmProvider};
    use crate::store::LibSqlBackend;

    async fn app() -> (Router, Arc<ScriptedLlm>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let llm = ScriptedLlm::new();
        let proxy = Arc::new(CompletionProxy::new(llm.clone() as Arc<dyn LlmProvider>));
        let conductor = Arc::new(Conductor::new(
            db.clone(),
            InMemorySessionStore::new(),
            proxy,
            InterviewerConfig::default(),
        ));
        (interview_routes(AppState { db, conductor }), llm)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn blank_title_is_rejected_with_field() {
        let (app, _) = app().await;
        let (status, body) =
            call(&app, "POST", "/api/interviews", Some(json!({ "title": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["field"], "title");
    }

    #[tokio::test]
    async fn authoring_builds_ordered_form() {
        let (app, _) = app().await;
        let (status, created) = call(
            &app,
            "POST",
            "/api/interviews",
            Some(json!({ "title": "Support", "description": "Tier 1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["interview"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/questions"),
            Some(json!({ "text": "Name?" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/questions"),
            Some(json!({ "text": "Shift?", "kind": "multiple_choice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "options");

        call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/questions"),
            Some(json!({ "text": "Shift?", "kind": "multiple_choice", "options": ["Day", "Night"] })),
        )
        .await;

        let (status, detail) = call(&app, "GET", &format!("/api/interviews/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["interview"]["title"], "Support");
        assert_eq!(detail["interview"]["sections"][0]["title"], "General");
        let questions = detail["interview"]["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1]["options"], json!(["Day", "Night"]));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (app, _) = app().await;
        let missing = Uuid::new_v4();
        for (method, uri) in [
            ("GET", format!("/api/interviews/{missing}")),
            ("DELETE", format!("/api/interviews/{missing}")),
            ("GET", format!("/api/sessions/{missing}")),
            ("POST", format!("/api/sessions/{missing}/next")),
            ("GET", format!("/api/responses/{missing}")),
            ("DELETE", format!("/api/questions/{missing}")),
        ] {
            let (status, body) = call(&app, method, &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn missing_json_field_is_reported_as_json() {
        let (app, _) = app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/interviews",
            Some(json!({ "description": "no title" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["field"], "title");

        let request = Request::builder()
            .method("POST")
            .uri("/api/interviews")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["field"], "body");
    }

    #[tokio::test]
    async fn malformed_ids_are_reported_as_json() {
        let (app, _) = app().await;
        for (method, uri) in [
            ("GET", "/api/interviews/not-a-uuid"),
            ("POST", "/api/sessions/42/next"),
            ("DELETE", "/api/questions/xyz"),
        ] {
            let (status, body) = call(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
            assert_eq!(body["success"], false);
            assert_eq!(body["field"], "id");
        }

        let (status, body) = call(&app, "GET", "/api/interviews?active_only=maybe", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "query");
    }

    #[tokio::test]
    async fn voice_flow_over_http() {
        let (app, llm) = app().await;
        let (_, created) =
            call(&app, "POST", "/api/interviews", Some(json!({ "title": "Support" }))).await;
        let id = created["interview"]["id"].as_str().unwrap().to_string();
        call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/questions"),
            Some(json!({ "text": "Name?" })),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/voice"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "candidate_name");

        let (status, start) = call(
            &app,
            "POST",
            &format!("/api/interviews/{id}/voice"),
            Some(json!({
                "candidate_name": "Dana",
                "candidate_email": "dana@example.com",
                "candidate_location": "Lisbon",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(start["audio_base64"], BASE64.encode(b"mp3"));
        assert!(start["assistant_text"].as_str().unwrap().ends_with("First question: Name?"));
        let session = start["session_id"].as_str().unwrap().to_string();

        llm.fail_audio();
        let (status, done) = call(
            &app,
            "POST",
            &format!("/api/sessions/{session}/voice"),
            Some(json!({ "text": "Dana" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["done"], true);
        assert!(done.get("audio_base64").is_none());

        let response_id = done["response_id"].as_str().unwrap();
        let (_, detail) = call(&app, "GET", &format!("/api/responses/{response_id}"), None).await;
        assert_eq!(detail["response"]["candidate"]["location"], "Lisbon");
    }

    #[tokio::test]
    async fn speak_returns_base64_audio_or_bad_gateway() {
        let (app, llm) = app().await;
        let (status, body) = call(&app, "POST", "/api/speak", Some(json!({ "text": "Hello" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["audio_base64"], BASE64.encode(b"mp3"));

        llm.fail_audio();
        let (status, body) = call(&app, "POST", "/api/speak", Some(json!({ "text": "Hello" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], crate::interview::prompts::SPEECH_ERROR_MESSAGE);
    }

    #[test]
    fn error_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (
                Error::from(InterviewError::SessionConflict {
                    id,
                    expected: 1,
                    found: 2,
                }),
                StatusCode::CONFLICT,
            ),
            (
                Error::from(InterviewError::SessionNotFound { id }),
                StatusCode::NOT_FOUND,
            ),
            (
                Error::from(DatabaseError::Query("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::from(ValidationError::MissingRequired { question_id: id }),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected);
        }
    }
}
