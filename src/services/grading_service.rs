use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::{Question, QuestionDetails};
use crate::models::test_attempt::GradedQuestion;

pub struct GradingService;

impl GradingService {
    /// Scores every question in session order. Essays are left for a grader.
    pub fn grade_submission(
        questions: &[Question],
        answers: &BTreeMap<i32, Answer>,
        now: DateTime<Utc>,
    ) -> Vec<GradedQuestion> {
        questions
            .iter()
            .map(|q| {
                let student_answer = answers.get(&q.id).map(|a| a.value.clone());
                match q.details {
                    QuestionDetails::MultipleChoice(ref mc) => {
                        let is_correct = student_answer
                            .as_ref()
                            .and_then(|v| v.as_choice())
                            .map_or(false, |idx| idx == mc.correct_option_index);
                        GradedQuestion {
                            question: q.clone(),
                            student_answer,
                            is_correct: Some(is_correct),
                            points_earned: if is_correct { q.points } else { 0 },
                            graded_at: Some(now),
                            feedback: None,
                        }
                    }
                    QuestionDetails::Essay(_) => GradedQuestion {
                        question: q.clone(),
                        student_answer,
                        is_correct: None,
                        points_earned: 0,
                        graded_at: None,
                        feedback: None,
                    },
                }
            })
            .collect()
    }

    /// Always a full sum over the graded list.
    pub fn earned_points(graded: &[GradedQuestion]) -> i32 {
        graded
            .iter()
            .fold(0i32, |acc, g| acc.saturating_add(g.points_earned))
    }

    pub fn needs_manual_grading(graded: &[GradedQuestion]) -> bool {
        graded
            .iter()
            .any(|g| g.question.is_essay() && g.graded_at.is_none())
    }

    /// Records a grader's score for one essay. Leaves `graded` untouched on error.
    pub fn apply_essay_grade(
        graded: &mut [GradedQuestion],
        question_id: i32,
        points: i32,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let entry = graded
            .iter_mut()
            .find(|g| g.question.id == question_id)
            .ok_or_else(|| {
                Error::NotFound(format!("question {} is not part of this attempt", question_id))
            })?;

        if !entry.question.is_essay() {
            return Err(Error::Validation(format!(
                "question {} is auto-graded and cannot be scored manually",
                question_id
            )));
        }
        if points < 0 || points > entry.question.points {
            return Err(Error::Validation(format!(
                "points must be between 0 and {} for question {}",
                entry.question.points, question_id
            )));
        }

        entry.points_earned = points;
        entry.feedback = feedback;
        entry.graded_at = Some(now);
        Ok(())
    }
}
