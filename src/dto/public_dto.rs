use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::answer::{Answer, AnswerValue};
use crate::models::question::PublicQuestion;
use crate::models::test_attempt::{
    AttemptSession, AttemptStatus, IntegrityEventType, SubmissionResult, TelemetryCounts,
};

/// Student-facing attempt payload. Questions are always the public projection;
/// the graded result appears only once the attempt is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub questions: Vec<PublicQuestion>,
    pub answers: BTreeMap<i32, Answer>,
    pub telemetry: TelemetryCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubmissionResult>,
}

impl AttemptView {
    pub fn new(session: &AttemptSession, max_tab_switches: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            test_id: session.test_id,
            student_id: session.student_id.clone(),
            class_id: session.class_id.clone(),
            status: session.status,
            started_at: session.started_at,
            deadline: session.deadline,
            remaining_seconds: if session.is_submitted() {
                0
            } else {
                session.remaining_seconds(now)
            },
            questions: session.ordered_questions.iter().map(PublicQuestion::from).collect(),
            answers: session.answers.clone(),
            telemetry: session.counts(max_tab_switches),
            result: session.is_submitted().then(|| SubmissionResult::from(session)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i32,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: i32,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftAnswerRequest {
    pub question_id: i32,
    /// `null` clears the draft; cleared drafts are never flushed.
    pub value: Option<AnswerValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftAnswerResponse {
    pub buffered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityEventRequest {
    #[serde(rename = "type")]
    pub event_type: IntegrityEventType,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub answered_count: usize,
    pub total_questions: usize,
    pub telemetry: TelemetryCounts,
}

impl StatusResponse {
    pub fn new(session: &AttemptSession, max_tab_switches: u32, now: DateTime<Utc>) -> Self {
        Self {
            attempt_id: session.id,
            status: session.status,
            deadline: session.deadline,
            remaining_seconds: if session.is_submitted() {
                0
            } else {
                session.remaining_seconds(now)
            },
            answered_count: session.answers.len(),
            total_questions: session.ordered_questions.len(),
            telemetry: session.counts(max_tab_switches),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicTestsQuery {
    pub class_id: Option<String>,
}
