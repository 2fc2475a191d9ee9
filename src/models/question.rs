use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: i32,
    pub prompt: String,
    pub points: i32,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    Essay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionDetails {
    MultipleChoice(MultipleChoiceDetails),
    Essay(EssayDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceDetails {
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EssayDetails {
    pub min_words: Option<u32>,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        match self.details {
            QuestionDetails::MultipleChoice(_) => QuestionType::MultipleChoice,
            QuestionDetails::Essay(_) => QuestionType::Essay,
        }
    }

    pub fn is_essay(&self) -> bool {
        self.question_type() == QuestionType::Essay
    }

    /// Structural checks applied when a definition is authored.
    pub fn check(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err(format!("question {} has an empty prompt", self.id));
        }
        if self.points <= 0 {
            return Err(format!("question {} must be worth more than 0 points", self.id));
        }
        if let QuestionDetails::MultipleChoice(ref mc) = self.details {
            if mc.options.len() < 2 {
                return Err(format!("question {} needs at least two options", self.id));
            }
            if mc.correct_option_index >= mc.options.len() {
                return Err(format!(
                    "question {} has correct_option_index {} outside its {} options",
                    self.id,
                    mc.correct_option_index,
                    mc.options.len()
                ));
            }
        }
        Ok(())
    }
}

/// Question as shown to a student while the attempt is open: no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub points: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_words: Option<u32>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        let (options, min_words) = match q.details {
            QuestionDetails::MultipleChoice(ref mc) => (Some(mc.options.clone()), None),
            QuestionDetails::Essay(ref essay) => (None, essay.min_words),
        };
        Self {
            id: q.id,
            question_type: q.question_type(),
            prompt: q.prompt.clone(),
            points: q.points,
            options,
            min_words,
        }
    }
}
