use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestKind {
    Test,
    Exam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: Uuid,
    pub class_id: String,
    pub subject: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: TestKind,
    pub duration_minutes: i32,
    pub total_points: i32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub randomize_questions: bool,
    pub allow_copy_paste: bool,
    /// Carried for the client only; nothing verifies it.
    pub require_webcam: bool,
    pub max_tab_switches: u32,
    pub questions: Vec<Question>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TestDefinition {
    /// `None` when the sum does not fit in an `i32`.
    pub fn computed_total_points(&self) -> Option<i32> {
        self.questions
            .iter()
            .try_fold(0i32, |acc, q| acc.checked_add(q.points))
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes as i64)
    }

    pub fn question(&self, question_id: i32) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// What a student sees before starting: no questions, no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    pub id: Uuid,
    pub class_id: String,
    pub subject: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: TestKind,
    pub duration_minutes: i32,
    pub total_points: i32,
    pub total_questions: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub allow_copy_paste: bool,
    pub require_webcam: bool,
    pub max_tab_switches: u32,
}

impl From<&TestDefinition> for TestSummary {
    fn from(t: &TestDefinition) -> Self {
        Self {
            id: t.id,
            class_id: t.class_id.clone(),
            subject: t.subject.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            kind: t.kind,
            duration_minutes: t.duration_minutes,
            total_points: t.total_points,
            total_questions: t.questions.len(),
            window_start: t.window_start,
            window_end: t.window_end,
            allow_copy_paste: t.allow_copy_paste,
            require_webcam: t.require_webcam,
            max_tab_switches: t.max_tab_switches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{MultipleChoiceDetails, QuestionDetails};

    fn definition(points: &[i32]) -> TestDefinition {
        let now = Utc::now();
        TestDefinition {
            id: Uuid::new_v4(),
            class_id: "9C".into(),
            subject: "Math".into(),
            title: "Fractions".into(),
            description: None,
            kind: TestKind::Test,
            duration_minutes: 30,
            total_points: 0,
            window_start: now,
            window_end: now + chrono::Duration::hours(1),
            randomize_questions: false,
            allow_copy_paste: false,
            require_webcam: false,
            max_tab_switches: 3,
            questions: points
                .iter()
                .enumerate()
                .map(|(idx, p)| Question {
                    id: idx as i32 + 1,
                    prompt: format!("q{}", idx + 1),
                    points: *p,
                    details: QuestionDetails::MultipleChoice(MultipleChoiceDetails {
                        options: vec!["a".into(), "b".into()],
                        correct_option_index: 0,
                    }),
                })
                .collect(),
            created_by: "t".into(),
            created_at: now,
        }
    }

    #[test]
    fn total_points_sums_questions() {
        assert_eq!(definition(&[2, 3, 5]).computed_total_points(), Some(10));
    }

    #[test]
    fn total_points_overflow_is_none() {
        assert_eq!(definition(&[i32::MAX, 1]).computed_total_points(), None);
    }
}
