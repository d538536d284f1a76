//! Validation boundary — checks candidate input before it reaches a tracker or
//! the store.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

use super::model::{CandidateInfo, Question, ResponseSource};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

/// Check a value against a question and return the normalized answer.
///
/// Single-choice values must match one of the options; a case-insensitive
/// match is normalized to the configured spelling. Other kinds are returned
/// unchanged.
pub fn validate_answer(question: &Question, value: &str) -> Result<String, ValidationError> {
    if question.is_required && value.trim().is_empty() {
        return Err(ValidationError::MissingRequired {
            question_id: question.id,
        });
    }
    if !question.kind.is_choice() {
        return Ok(value.to_string());
    }
    match_option(question, value)
}

fn match_option(question: &Question, value: &str) -> Result<String, ValidationError> {
    if question.options.iter().any(|o| o == value) {
        return Ok(value.to_string());
    }
    let wanted = value.trim().to_lowercase();
    question
        .options
        .iter()
        .find(|o| o.trim().to_lowercase() == wanted)
        .cloned()
        .ok_or_else(|| ValidationError::InvalidSelection {
            question_id: question.id,
            value: value.to_string(),
            allowed: question.options.clone(),
        })
}

pub fn validate_email(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(ValidationError::InvalidEmail {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Candidate name and email are both required.
pub fn validate_candidate(info: &CandidateInfo) -> Result<CandidateInfo, ValidationError> {
    let name = info.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField {
            field: "candidate_name".to_string(),
        });
    }
    validate_email("candidate_email", &info.email)?;
    Ok(CandidateInfo {
        name: name.to_string(),
        email: info.email.trim().to_lowercase(),
        phone: optional_text(info.phone.as_deref()),
        location: optional_text(info.location.as_deref()),
    })
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Single answer item of a form submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerItem {
    pub question: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub option_values: Vec<String>,
}

/// A complete interview submission from the static form or the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSubmission {
    pub candidate_name: String,
    pub candidate_email: String,
    #[serde(default)]
    pub candidate_phone: Option<String>,
    #[serde(default)]
    pub candidate_location: Option<String>,
    pub answers: Vec<AnswerItem>,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub source: ResponseSource,
}

/// A submission answer that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnswer {
    pub question_id: Uuid,
    pub answer_text: String,
    pub selected_options: Vec<String>,
}

/// Validate a submission against the interview's questions.
///
/// Answers are returned in question order. Unknown questions, invalid
/// options, and unanswered required questions are rejected.
pub fn validate_submission(
    interview_id: Uuid,
    questions: &[Question],
    submission: &FormSubmission,
) -> Result<(CandidateInfo, Vec<ValidatedAnswer>), ValidationError> {
    let candidate = validate_candidate(&CandidateInfo {
        name: submission.candidate_name.clone(),
        email: submission.candidate_email.clone(),
        phone: submission.candidate_phone.clone(),
        location: submission.candidate_location.clone(),
    })?;

    let known: HashSet<Uuid> = questions.iter().map(|q| q.id).collect();
    for item in &submission.answers {
        if !known.contains(&item.question) {
            return Err(ValidationError::UnknownQuestion {
                question_id: item.question,
                interview_id,
            });
        }
    }

    let mut validated = Vec::with_capacity(questions.len());
    for question in questions {
        let item = submission.answers.iter().find(|a| a.question == question.id);
        let answer = match item {
            Some(item) => validate_item(question, item)?,
            None => None,
        };
        match answer {
            Some(answer) => validated.push(answer),
            None if question.is_required => {
                return Err(ValidationError::MissingRequired {
                    question_id: question.id,
                });
            }
            None => {}
        }
    }

    Ok((candidate, validated))
}

fn validate_item(
    question: &Question,
    item: &AnswerItem,
) -> Result<Option<ValidatedAnswer>, ValidationError> {
    if question.kind.is_choice() {
        if item.option_values.len() > 1 {
            return Err(ValidationError::InvalidValue {
                field: format!("answers[{}].option_values", question.id),
                reason: "single-choice question accepts one option".to_string(),
            });
        }
        let picked = item
            .option_values
            .first()
            .map(String::as_str)
            .unwrap_or(item.text.as_str());
        if picked.trim().is_empty() {
            return Ok(None);
        }
        let option = match_option(question, picked)?;
        return Ok(Some(ValidatedAnswer {
            question_id: question.id,
            answer_text: option.clone(),
            selected_options: vec![option],
        }));
    }

    if item.text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(ValidatedAnswer {
        question_id: question.id,
        answer_text: item.text.clone(),
        selected_options: Vec::new(),
    }))
}
