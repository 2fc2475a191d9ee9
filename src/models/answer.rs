use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::{Question, QuestionDetails};

/// A student's response. MCQ answers carry the chosen option index, essays the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(usize),
    Text(String),
}

impl AnswerValue {
    /// Rejects a value whose shape does not match the question it answers.
    pub fn check_against(&self, question: &Question) -> Result<(), String> {
        match (&question.details, self) {
            (QuestionDetails::MultipleChoice(mc), AnswerValue::Choice(idx)) => {
                if *idx < mc.options.len() {
                    Ok(())
                } else {
                    Err(format!(
                        "option {} is out of range for question {} ({} options)",
                        idx,
                        question.id,
                        mc.options.len()
                    ))
                }
            }
            (QuestionDetails::Essay(_), AnswerValue::Text(_)) => Ok(()),
            (QuestionDetails::MultipleChoice(_), AnswerValue::Text(_)) => Err(format!(
                "question {} expects an option index, got text",
                question.id
            )),
            (QuestionDetails::Essay(_), AnswerValue::Choice(_)) => Err(format!(
                "question {} expects free text, got an option index",
                question.id
            )),
        }
    }

    pub fn as_choice(&self) -> Option<usize> {
        match self {
            AnswerValue::Choice(idx) => Some(*idx),
            AnswerValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: i32,
    pub value: AnswerValue,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{EssayDetails, MultipleChoiceDetails};

    fn mcq() -> Question {
        Question {
            id: 1,
            prompt: "?".into(),
            points: 2,
            details: QuestionDetails::MultipleChoice(MultipleChoiceDetails {
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_option_index: 0,
            }),
        }
    }

    #[test]
    fn number_deserializes_as_choice_and_string_as_text() {
        let choice: AnswerValue = serde_json::from_str("2").unwrap();
        let text: AnswerValue = serde_json::from_str("\"because\"").unwrap();
        assert_eq!(choice, AnswerValue::Choice(2));
        assert_eq!(text, AnswerValue::Text("because".into()));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let essay = Question {
            id: 2,
            prompt: "Explain".into(),
            points: 4,
            details: QuestionDetails::Essay(EssayDetails::default()),
        };
        assert!(AnswerValue::Text("x".into()).check_against(&mcq()).is_err());
        assert!(AnswerValue::Choice(0).check_against(&essay).is_err());
        assert!(AnswerValue::Choice(3).check_against(&mcq()).is_err());
        assert!(AnswerValue::Choice(2).check_against(&mcq()).is_ok());
    }
}
