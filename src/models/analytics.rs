use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStat {
    /// Position in the definition's question list, independent of any shuffle.
    pub index: usize,
    pub question_id: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub answered_count: u32,
    pub correct_count: u32,
    /// Percentage; `None` where correctness is not applicable (essays).
    pub correct_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub test_id: Uuid,
    pub total_attempts: u32,
    pub submitted_count: u32,
    pub in_progress_count: u32,
    pub average_score: f64,
    pub highest_score: i32,
    pub lowest_score: i32,
    pub average_time_minutes: f64,
    pub cheating_flag_count: u32,
    pub needs_grading_count: u32,
    pub questions: Vec<QuestionStat>,
}
