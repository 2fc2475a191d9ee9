use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::database::{AttemptSessionStore, TestDefinitionStore};
use crate::dto::authoring_dto::{CreateQuestion, CreateTestPayload};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::test::TestDefinition;
use crate::services::scheduler_service::SchedulerRegistry;
use crate::utils::time::Clock;
use crate::utils::validation::validate;

#[derive(Clone)]
pub struct TestService {
    tests: Arc<dyn TestDefinitionStore>,
    attempts: Arc<dyn AttemptSessionStore>,
    schedulers: Arc<SchedulerRegistry>,
    clock: Arc<dyn Clock>,
}

impl TestService {
    pub fn new(
        tests: Arc<dyn TestDefinitionStore>,
        attempts: Arc<dyn AttemptSessionStore>,
        schedulers: Arc<SchedulerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tests,
            attempts,
            schedulers,
            clock,
        }
    }

    pub async fn create_test(
        &self,
        payload: CreateTestPayload,
        created_by: &str,
    ) -> Result<TestDefinition> {
        validate(&payload)?;
        for q in &payload.questions {
            validate(q)?;
        }
        if payload.window_start >= payload.window_end {
            return Err(Error::Validation(
                "window_start must be before window_end".to_string(),
            ));
        }

        let questions = assign_question_ids(&payload.questions);
        for q in &questions {
            q.check().map_err(Error::Validation)?;
        }

        let mut test = TestDefinition {
            id: Uuid::new_v4(),
            class_id: payload.class_id,
            subject: payload.subject,
            title: payload.title,
            description: payload.description,
            kind: payload.kind,
            duration_minutes: payload.duration_minutes,
            total_points: 0,
            window_start: payload.window_start,
            window_end: payload.window_end,
            randomize_questions: payload.randomize_questions,
            allow_copy_paste: payload.allow_copy_paste,
            require_webcam: payload.require_webcam,
            max_tab_switches: payload.max_tab_switches,
            questions,
            created_by: created_by.to_string(),
            created_at: self.clock.now(),
        };
        test.total_points = test
            .computed_total_points()
            .ok_or_else(|| Error::Validation("total points are too large".to_string()))?;

        self.tests.insert(&test).await?;
        info!(
            test_id = %test.id,
            class_id = %test.class_id,
            questions = test.questions.len(),
            total_points = test.total_points,
            "Test created"
        );
        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<TestDefinition> {
        self.tests
            .get(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test {} not found", test_id)))
    }

    /// Most recent first.
    pub async fn list_tests(&self, class_id: Option<&str>) -> Result<Vec<TestDefinition>> {
        self.tests.list(class_id).await
    }

    /// Removes the definition and every attempt on it. Returns the number of attempts removed.
    pub async fn delete_test(&self, test_id: Uuid) -> Result<u64> {
        self.get_test(test_id).await?;

        for session in self.attempts.list_by_test(test_id).await? {
            self.schedulers.teardown(session.id);
        }
        let removed = self.attempts.delete_by_test(test_id).await?;
        // Catches attempts hosted after the first pass.
        for session_id in &removed {
            self.schedulers.teardown(*session_id);
        }
        if !self.tests.delete(test_id).await? {
            return Err(Error::NotFound(format!("test {} not found", test_id)));
        }

        let removed = removed.len() as u64;
        info!(%test_id, removed_attempts = removed, "Test deleted");
        Ok(removed)
    }
}

fn assign_question_ids(questions: &[CreateQuestion]) -> Vec<Question> {
    questions
        .iter()
        .enumerate()
        .map(|(idx, q)| Question {
            id: (idx as i32) + 1,
            prompt: q.prompt.clone(),
            points: q.points,
            details: q.details.clone(),
        })
        .collect()
}
