use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::{Answer, AnswerValue};
use super::question::Question;
use super::test::TestDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "IN_PROGRESS",
            AttemptStatus::Submitted => "SUBMITTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityEventType {
    TabSwitch,
    CopyAttempt,
    PasteAttempt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityEvent {
    #[serde(rename = "type")]
    pub event_type: IntegrityEventType,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub tab_switch_count: u32,
    pub copy_attempt_count: u32,
    pub paste_attempt_count: u32,
    pub events: Vec<IntegrityEvent>,
    pub last_active_at: DateTime<Utc>,
}

impl Telemetry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tab_switch_count: 0,
            copy_attempt_count: 0,
            paste_attempt_count: 0,
            events: Vec::new(),
            last_active_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheatingFlagType {
    ExcessiveTabSwitches,
    CopyAttempts,
    TooFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheatingFlag {
    #[serde(rename = "type")]
    pub flag_type: CheatingFlagType,
    pub severity: FlagSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedQuestion {
    pub question: Question,
    pub student_answer: Option<AnswerValue>,
    /// `None` for essays: they carry no right/wrong signal.
    pub is_correct: Option<bool>,
    pub points_earned: i32,
    pub graded_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSession {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: AttemptStatus,
    pub ordered_questions: Vec<Question>,
    pub telemetry: Telemetry,
    #[serde(default)]
    pub answers: BTreeMap<i32, Answer>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub earned_points: Option<i32>,
    #[serde(default)]
    pub graded_questions: Vec<GradedQuestion>,
    #[serde(default)]
    pub cheating_flags: Vec<CheatingFlag>,
    pub needs_manual_grading: bool,
}

impl AttemptSession {
    /// Opens a fresh attempt. `questions` is the session's own snapshot of the order.
    pub fn open(
        test: &TestDefinition,
        student_id: &str,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id: test.id,
            student_id: student_id.to_string(),
            class_id: test.class_id.clone(),
            started_at: now,
            deadline: now + test.duration(),
            status: AttemptStatus::InProgress,
            ordered_questions: questions,
            telemetry: Telemetry::new(now),
            answers: BTreeMap::new(),
            submitted_at: None,
            earned_points: None,
            graded_questions: Vec::new(),
            cheating_flags: Vec::new(),
            needs_manual_grading: false,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }

    pub fn question(&self, question_id: i32) -> Option<&Question> {
        self.ordered_questions.iter().find(|q| q.id == question_id)
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds().max(0)
    }

    pub fn counts(&self, max_tab_switches: u32) -> TelemetryCounts {
        TelemetryCounts {
            tab_switch_count: self.telemetry.tab_switch_count,
            copy_attempt_count: self.telemetry.copy_attempt_count,
            paste_attempt_count: self.telemetry.paste_attempt_count,
            tab_switch_warning: self.telemetry.tab_switch_count > max_tab_switches,
            last_active_at: self.telemetry.last_active_at,
        }
    }
}

/// Snapshot of integrity counters returned after each recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryCounts {
    pub tab_switch_count: u32,
    pub copy_attempt_count: u32,
    pub paste_attempt_count: u32,
    /// Advisory: the caller shows a non-blocking warning when set.
    pub tab_switch_warning: bool,
    pub last_active_at: DateTime<Utc>,
}

/// The frozen outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub attempt_id: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub earned_points: i32,
    pub graded_questions: Vec<GradedQuestion>,
    pub cheating_flags: Vec<CheatingFlag>,
    pub needs_manual_grading: bool,
}

impl From<&AttemptSession> for SubmissionResult {
    fn from(s: &AttemptSession) -> Self {
        Self {
            attempt_id: s.id,
            submitted_at: s.submitted_at,
            earned_points: s.earned_points.unwrap_or(0),
            graded_questions: s.graded_questions.clone(),
            cheating_flags: s.cheating_flags.clone(),
            needs_manual_grading: s.needs_manual_grading,
        }
    }
}
