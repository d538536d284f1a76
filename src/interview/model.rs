//! Interview forms, questions, candidates, and stored responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a question is answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Short free-text answer.
    #[default]
    Text,
    /// Detailed free-text answer.
    Textarea,
    /// Exactly one of the configured options.
    MultipleChoice,
}

impl QuestionKind {
    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Short Answer",
            Self::Textarea => "Detailed Answer",
            Self::MultipleChoice => "Multiple Choice",
        }
    }

    /// Instruction shown next to the question when asked conversationally.
    pub fn answer_hint(&self) -> &'static str {
        match self {
            Self::Text => "Please provide a short answer",
            Self::Textarea => "Please provide a detailed answer",
            Self::MultipleChoice => "Please choose one of the following options",
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Self::MultipleChoice)
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::MultipleChoice => "multiple_choice",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "textarea" => Ok(Self::Textarea),
            "multiple_choice" => Ok(Self::MultipleChoice),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// An interview form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interview {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interview {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Logical grouping of questions within an interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: i64,
}

impl Section {
    pub fn new(interview_id: Uuid, title: impl Into<String>, order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            interview_id,
            title: title.into(),
            description: String::new(),
            order,
        }
    }
}

/// A single question. Single-choice questions carry their options inline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub section_id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    pub is_required: bool,
    /// Global position across the interview.
    pub position: i64,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    pub fn new(section_id: Uuid, text: impl Into<String>, position: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            section_id,
            text: text.into(),
            kind: QuestionKind::Text,
            is_required: true,
            position,
            options: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: QuestionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Turn this into a single-choice question with the given options.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kind = QuestionKind::MultipleChoice;
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }
}

/// Interview with its sections and ordered questions.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewDetail {
    #[serde(flatten)]
    pub interview: Interview,
    pub sections: Vec<Section>,
    pub questions: Vec<Question>,
}

/// Candidate, shared across responses and keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact details supplied by the candidate. Name and email are required;
/// phone and location are kept when given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateInfo {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Form,
    Ai,
    Realtime,
    #[default]
    Api,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Form => write!(f, "form"),
            Self::Ai => write!(f, "ai"),
            Self::Realtime => write!(f, "realtime"),
            Self::Api => write!(f, "api"),
        }
    }
}

impl std::str::FromStr for ResponseSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "form" => Ok(Self::Form),
            "ai" => Ok(Self::Ai),
            "realtime" => Ok(Self::Realtime),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown response source: {other}")),
        }
    }
}

/// A submitted interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewResponse {
    pub id: Uuid,
    pub interview_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<Uuid>,
    pub source: ResponseSource,
    pub submitted_at: DateTime<Utc>,
    /// Compact export blob: answers, transcript, source.
    pub answers_json: serde_json::Value,
}

/// One stored answer of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub response_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: String,
    #[serde(default)]
    pub selected_options: Vec<String>,
}

/// Response with its candidate and answers, for review.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseDetail {
    #[serde(flatten)]
    pub response: InterviewResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Candidate>,
    pub answers: Vec<AnswerRecord>,
}
