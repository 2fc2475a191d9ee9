use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::QuestionDetails;
use crate::models::test::TestKind;

/// Upper bound for a single question, mirrored in the validator attribute below.
pub const MAX_QUESTION_POINTS: i32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestion {
    #[validate(length(min = 1, message = "Question prompt is required"))]
    pub prompt: String,
    #[validate(range(min = 1, max = 1000, message = "Points must be between 1 and 1000"))]
    pub points: i32,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, message = "Class id is required"))]
    pub class_id: String,
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: TestKind,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: i32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub allow_copy_paste: bool,
    #[serde(default)]
    pub require_webcam: bool,
    #[serde(default = "default_max_tab_switches")]
    pub max_tab_switches: u32,
    #[validate(length(min = 1, message = "At least one question is required"))]
    pub questions: Vec<CreateQuestion>,
}

fn default_kind() -> TestKind {
    TestKind::Test
}

fn default_max_tab_switches() -> u32 {
    3
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTestsQuery {
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradeEssayPayload {
    pub question_id: i32,
    #[validate(range(min = 0, message = "Points cannot be negative"))]
    pub points: i32,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTestResponse {
    pub deleted: bool,
    pub removed_attempts: u64,
}
