//! Interview progression tracker — walks an ordered question list one answer
//! at a time.
//!
//! The cursor only moves forward, from 0 to `questions.len()`. Once the last
//! question is answered the tracker is completed and rejects further answers
//! without touching its state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InterviewError;

use super::model::{Question, QuestionKind};

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    System,
    Assistant,
    User,
}

/// What a transcript entry was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Greeting,
    Prompt,
    Question,
    Answer,
    Followup,
    Completion,
}

/// One role-tagged utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub kind: TurnKind,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// A collected answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question_id: Uuid,
    /// Normalized value; for single-choice, the canonical option string.
    pub value: String,
    /// Informational only, always within `[0, 1]`.
    pub confidence: f32,
    /// What the candidate actually said or typed.
    pub raw: String,
}

/// Input to [`Tracker::record`].
#[derive(Debug, Clone)]
pub struct AnswerDraft {
    pub value: String,
    pub raw: String,
    pub confidence: f32,
}

impl AnswerDraft {
    /// An answer taken as-is from the candidate.
    pub fn verbatim(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            raw: value.clone(),
            value,
            confidence: 1.0,
        }
    }

    pub fn new(value: impl Into<String>, raw: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            raw: raw.into(),
            confidence,
        }
    }
}

/// Per-session progress through an interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    id: Uuid,
    questions: Vec<Question>,
    cursor: usize,
    answers: HashMap<Uuid, Answer>,
    transcript: Vec<Turn>,
    completed: bool,
    started_at: DateTime<Utc>,
}

impl Tracker {
    /// Start a tracker over a snapshot of the given questions.
    pub fn start(questions: Vec<Question>) -> Self {
        Self {
            id: Uuid::new_v4(),
            questions,
            cursor: 0,
            answers: HashMap::new(),
            transcript: Vec::new(),
            completed: false,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn answered(&self) -> usize {
        self.answers.len()
    }

    pub fn answer(&self, question_id: Uuid) -> Option<&Answer> {
        self.answers.get(&question_id)
    }

    /// Whether the closing step has run.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The question at the cursor, or `None` once every question is answered.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    /// True iff the cursor has reached the end of the question list.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.questions.len()
    }

    /// Record a verbatim answer for the current question.
    pub fn record_answer(&mut self, value: impl Into<String>) -> Result<&Answer, InterviewError> {
        self.record(AnswerDraft::verbatim(value))
    }

    /// Record an answer for the current question and advance the cursor.
    ///
    /// Fails with `OutOfSequence` (leaving the tracker untouched) when the
    /// tracker is completed or the cursor is already at the end.
    pub fn record(&mut self, draft: AnswerDraft) -> Result<&Answer, InterviewError> {
        if self.completed || self.is_complete() {
            return Err(self.out_of_sequence());
        }
        let question_id = self.questions[self.cursor].id;

        self.log(Speaker::User, TurnKind::Answer, draft.raw.clone());
        self.answers.insert(
            question_id,
            Answer {
                question_id,
                value: draft.value,
                confidence: draft.confidence.clamp(0.0, 1.0),
                raw: draft.raw,
            },
        );
        self.cursor += 1;
        if self.is_complete() {
            self.completed = true;
        }

        Ok(&self.answers[&question_id])
    }

    /// Closing step. Marks the tracker completed even when it has no
    /// questions; returns false if it was already completed.
    pub fn finish(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.cursor = self.questions.len();
        self.completed = true;
        true
    }

    /// Re-estimate the confidence of an existing answer.
    pub fn reestimate_confidence(&mut self, question_id: Uuid, confidence: f32) -> bool {
        match self.answers.get_mut(&question_id) {
            Some(answer) => {
                answer.confidence = confidence.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Append an entry to the transcript.
    pub fn log(&mut self, role: Speaker, kind: TurnKind, content: impl Into<String>) {
        self.transcript.push(Turn {
            role,
            kind,
            content: content.into(),
            at: Utc::now(),
        });
    }

    /// Answered questions, in question order.
    pub fn snapshot(&self) -> Snapshot {
        let entries = self
            .questions
            .iter()
            .filter_map(|q| {
                self.answers.get(&q.id).map(|a| SnapshotEntry {
                    question_id: q.id,
                    question_text: q.text.clone(),
                    kind: q.kind,
                    answer: a.value.clone(),
                    confidence: a.confidence,
                    raw_response: a.raw.clone(),
                })
            })
            .collect();
        Snapshot(entries)
    }

    fn out_of_sequence(&self) -> InterviewError {
        InterviewError::OutOfSequence {
            cursor: self.cursor,
            total: self.questions.len(),
            completed: self.completed,
        }
    }
}

/// One answered question of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    pub question_id: Uuid,
    pub question_text: String,
    pub kind: QuestionKind,
    pub answer: String,
    pub confidence: f32,
    pub raw_response: String,
}

/// Question → answer projection, in question order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Snapshot(pub Vec<SnapshotEntry>);

impl Snapshot {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.0
    }

    pub fn get(&self, question_id: Uuid) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.question_id == question_id)
            .map(|e| e.answer.as_str())
    }

    /// `(question_id, answer)` pairs in question order.
    pub fn pairs(&self) -> Vec<(Uuid, &str)> {
        self.0
            .iter()
            .map(|e| (e.question_id, e.answer.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_questions() -> Vec<Question> {
        let section = Uuid::new_v4();
        vec![
            Question::new(section, "Name?", 0),
            Question::new(section, "Favorite color?", 1).with_options(["Red", "Blue"]),
        ]
    }

    #[test]
    fn start_is_empty() {
        let tracker = Tracker::start(two_questions());
        assert_eq!(tracker.cursor(), 0);
        assert_eq!(tracker.answered(), 0);
        assert!(!tracker.is_complete());
        assert!(!tracker.is_completed());
        assert_eq!(tracker.current().unwrap().text, "Name?");
    }

    #[test]
    fn two_question_walkthrough() {
        let questions = two_questions();
        let (q1, q2) = (questions[0].id, questions[1].id);
        let mut tracker = Tracker::start(questions);

        tracker.record_answer("Alice").unwrap();
        assert_eq!(tracker.cursor(), 1);
        assert!(!tracker.is_complete());

        tracker.record_answer("Blue").unwrap();
        assert_eq!(tracker.cursor(), 2);
        assert!(tracker.is_complete());
        assert!(tracker.is_completed());
        assert!(tracker.current().is_none());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.pairs(), vec![(q1, "Alice"), (q2, "Blue")]);
    }

    #[test]
    fn answers_after_completion_are_rejected_without_change() {
        let mut tracker = Tracker::start(two_questions());
        tracker.record_answer("Alice").unwrap();
        tracker.record_answer("Red").unwrap();
        let before = tracker.snapshot();

        let err = tracker.record_answer("extra").unwrap_err();
        assert!(matches!(
            err,
            InterviewError::OutOfSequence {
                cursor: 2,
                total: 2,
                completed: true
            }
        ));
        assert_eq!(tracker.cursor(), 2);
        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn cursor_never_decreases() {
        let mut tracker = Tracker::start(two_questions());
        let mut last = tracker.cursor();
        for value in ["a", "b", "c", "d"] {
            let _ = tracker.record_answer(value);
            assert!(tracker.cursor() >= last);
            last = tracker.cursor();
        }
        assert_eq!(last, 2);
    }

    #[test]
    fn snapshot_has_one_entry_per_question_in_order() {
        let section = Uuid::new_v4();
        let questions: Vec<Question> = (0..5)
            .map(|i| Question::new(section, format!("Q{i}"), i))
            .collect();
        let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
        let mut tracker = Tracker::start(questions);
        for i in 0..5 {
            tracker.record_answer(format!("answer {i}")).unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 5);
        let snapshot_ids: Vec<Uuid> = snapshot.entries().iter().map(|e| e.question_id).collect();
        assert_eq!(snapshot_ids, ids);
    }

    #[test]
    fn record_appends_transcript() {
        let mut tracker = Tracker::start(two_questions());
        tracker.log(Speaker::Assistant, TurnKind::Question, "What's your name?");
        tracker
            .record(AnswerDraft::new("Alice", "I'm Alice", 0.9))
            .unwrap();

        let transcript = tracker.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, Speaker::User);
        assert_eq!(transcript[1].kind, TurnKind::Answer);
        assert_eq!(transcript[1].content, "I'm Alice");
    }

    #[test]
    fn confidence_is_clamped() {
        let mut tracker = Tracker::start(two_questions());
        let answer = tracker.record(AnswerDraft::new("Alice", "Alice", 3.0)).unwrap();
        assert_eq!(answer.confidence, 1.0);

        let id = tracker.questions()[0].id;
        assert!(tracker.reestimate_confidence(id, -0.5));
        assert_eq!(tracker.answer(id).unwrap().confidence, 0.0);
        assert!(!tracker.reestimate_confidence(Uuid::new_v4(), 0.5));
    }

    #[test]
    fn empty_interview_finishes_once() {
        let mut tracker = Tracker::start(Vec::new());
        assert!(tracker.is_complete());
        assert!(!tracker.is_completed());
        assert!(tracker.record_answer("anything").is_err());

        assert!(tracker.finish());
        assert!(tracker.is_completed());
        assert!(!tracker.finish());
    }

    #[test]
    fn tracker_serde_roundtrip() {
        let mut tracker = Tracker::start(two_questions());
        tracker.record_answer("Alice").unwrap();

        let json = serde_json::to_string(&tracker).unwrap();
        let parsed: Tracker = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), tracker.id());
        assert_eq!(parsed.cursor(), 1);
        assert_eq!(parsed.snapshot(), tracker.snapshot());
    }
}
