use std::sync::Arc;

use uuid::Uuid;

use crate::database::{AttemptSessionStore, TestDefinitionStore};
use crate::error::{Error, Result};
use crate::models::analytics::{AnalyticsSnapshot, QuestionStat};
use crate::models::question::QuestionType;
use crate::models::test::TestDefinition;
use crate::models::test_attempt::AttemptSession;

#[derive(Clone)]
pub struct AnalyticsService {
    tests: Arc<dyn TestDefinitionStore>,
    attempts: Arc<dyn AttemptSessionStore>,
}

impl AnalyticsService {
    pub fn new(tests: Arc<dyn TestDefinitionStore>, attempts: Arc<dyn AttemptSessionStore>) -> Self {
        Self { tests, attempts }
    }

    pub async fn get_analytics(&self, test_id: Uuid) -> Result<AnalyticsSnapshot> {
        let test = self
            .tests
            .get(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test {} not found", test_id)))?;
        let sessions = self.attempts.list_by_test(test_id).await?;
        Ok(Self::compute(&test, &sessions))
    }

    /// Derives the snapshot from frozen attempts. Zero submissions yield zeroed stats.
    pub fn compute(test: &TestDefinition, sessions: &[AttemptSession]) -> AnalyticsSnapshot {
        let submitted: Vec<&AttemptSession> = sessions.iter().filter(|s| s.is_submitted()).collect();
        let submitted_count = submitted.len() as u32;
        let in_progress_count = sessions.len() as u32 - submitted_count;

        let questions = question_stats(test, &submitted);

        if submitted.is_empty() {
            return AnalyticsSnapshot {
                test_id: test.id,
                total_attempts: sessions.len() as u32,
                submitted_count: 0,
                in_progress_count,
                average_score: 0.0,
                highest_score: 0,
                lowest_score: 0,
                average_time_minutes: 0.0,
                cheating_flag_count: 0,
                needs_grading_count: 0,
                questions,
            };
        }

        let scores: Vec<i32> = submitted.iter().map(|s| s.earned_points.unwrap_or(0)).collect();
        let minutes: Vec<f64> = submitted
            .iter()
            .filter_map(|s| {
                s.submitted_at
                    .map(|at| (at - s.started_at).num_milliseconds() as f64 / 60_000.0)
            })
            .collect();

        AnalyticsSnapshot {
            test_id: test.id,
            total_attempts: sessions.len() as u32,
            submitted_count,
            in_progress_count,
            average_score: scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64,
            highest_score: scores.iter().copied().max().unwrap_or(0),
            lowest_score: scores.iter().copied().min().unwrap_or(0),
            average_time_minutes: if minutes.is_empty() {
                0.0
            } else {
                minutes.iter().sum::<f64>() / minutes.len() as f64
            },
            cheating_flag_count: submitted
                .iter()
                .filter(|s| !s.cheating_flags.is_empty())
                .count() as u32,
            needs_grading_count: submitted.iter().filter(|s| s.needs_manual_grading).count() as u32,
            questions,
        }
    }
}

fn question_stats(test: &TestDefinition, submitted: &[&AttemptSession]) -> Vec<QuestionStat> {
    test.questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let mut answered_count = 0u32;
            let mut correct_count = 0u32;
            for session in submitted {
                let Some(graded) = session
                    .graded_questions
                    .iter()
                    .find(|g| g.question.id == question.id)
                else {
                    continue;
                };
                if graded.student_answer.is_some() {
                    answered_count += 1;
                }
                if graded.is_correct == Some(true) {
                    correct_count += 1;
                }
            }

            let question_type = question.question_type();
            let correct_rate = match question_type {
                QuestionType::Essay => None,
                QuestionType::MultipleChoice if answered_count == 0 => Some(0.0),
                QuestionType::MultipleChoice => {
                    Some(correct_count as f64 / answered_count as f64 * 100.0)
                }
            };

            QuestionStat {
                index,
                question_id: question.id,
                question_type,
                answered_count,
                correct_count,
                correct_rate,
            }
        })
        .collect()
}
