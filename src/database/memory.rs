//! In-memory stores. The default backend when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{AttemptSessionStore, TestDefinitionStore};
use crate::error::{Error, Result};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptSession, AttemptStatus};

#[derive(Debug, Default)]
pub struct InMemoryTestStore {
    tests: RwLock<HashMap<Uuid, TestDefinition>>,
}

impl InMemoryTestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestDefinitionStore for InMemoryTestStore {
    async fn insert(&self, test: &TestDefinition) -> Result<()> {
        let mut tests = self.tests.write().await;
        if tests.contains_key(&test.id) {
            return Err(Error::Conflict(format!("test {} already exists", test.id)));
        }
        tests.insert(test.id, test.clone());
        Ok(())
    }

    async fn get(&self, test_id: Uuid) -> Result<Option<TestDefinition>> {
        Ok(self.tests.read().await.get(&test_id).cloned())
    }

    async fn list(&self, class_id: Option<&str>) -> Result<Vec<TestDefinition>> {
        let tests = self.tests.read().await;
        let mut rows: Vec<TestDefinition> = tests
            .values()
            .filter(|t| class_id.map_or(true, |c| t.class_id == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete(&self, test_id: Uuid) -> Result<bool> {
        Ok(self.tests.write().await.remove(&test_id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    sessions: RwLock<HashMap<Uuid, AttemptSession>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl AttemptSessionStore for InMemoryAttemptStore {
    async fn insert(&self, session: &AttemptSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let duplicate = sessions
            .values()
            .any(|s| s.test_id == session.test_id && s.student_id == session.student_id);
        if duplicate || sessions.contains_key(&session.id) {
            return Err(Error::Conflict(format!(
                "student {} already has an attempt for test {}",
                session.student_id, session.test_id
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn save(&self, session: &AttemptSession, expected: AttemptStatus) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(slot) if slot.status == expected => {
                *slot = session.clone();
                Ok(())
            }
            Some(slot) => Err(Error::Conflict(format!(
                "attempt {} is {}, expected {}",
                session.id,
                slot.status.as_str(),
                expected.as_str()
            ))),
            None => Err(Error::NotFound(format!("attempt {} not found", session.id))),
        }
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<AttemptSession>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn find_by_test_and_student(
        &self,
        test_id: Uuid,
        student_id: &str,
    ) -> Result<Option<AttemptSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.test_id == test_id && s.student_id == student_id)
            .cloned())
    }

    async fn list_by_test(&self, test_id: Uuid) -> Result<Vec<AttemptSession>> {
        let mut rows: Vec<AttemptSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.test_id == test_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<AttemptSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == AttemptStatus::InProgress && s.deadline < now)
            .cloned()
            .collect())
    }

    async fn delete_by_test(&self, test_id: Uuid) -> Result<Vec<Uuid>> {
        let mut sessions = self.sessions.write().await;
        let mut removed = Vec::new();
        sessions.retain(|id, s| {
            if s.test_id == test_id {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}
