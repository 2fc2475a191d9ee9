//! Storage seams for test definitions and attempt sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptSession, AttemptStatus};

#[async_trait]
pub trait TestDefinitionStore: Send + Sync {
    async fn insert(&self, test: &TestDefinition) -> Result<()>;

    async fn get(&self, test_id: Uuid) -> Result<Option<TestDefinition>>;

    /// Most recently created first.
    async fn list(&self, class_id: Option<&str>) -> Result<Vec<TestDefinition>>;

    /// Returns whether a definition was removed.
    async fn delete(&self, test_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AttemptSessionStore: Send + Sync {
    /// Fails with `Error::Conflict` if the (test, student) pair already has a session.
    async fn insert(&self, session: &AttemptSession) -> Result<()>;

    /// Overwrites the session only while its stored status is still `expected`.
    /// Fails with `Error::Conflict` when another writer moved it on, and with
    /// `Error::NotFound` if it is gone.
    async fn save(&self, session: &AttemptSession, expected: AttemptStatus) -> Result<()>;

    async fn get(&self, session_id: Uuid) -> Result<Option<AttemptSession>>;

    async fn find_by_test_and_student(
        &self,
        test_id: Uuid,
        student_id: &str,
    ) -> Result<Option<AttemptSession>>;

    /// Oldest start first.
    async fn list_by_test(&self, test_id: Uuid) -> Result<Vec<AttemptSession>>;

    /// In-progress sessions whose deadline is before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<AttemptSession>>;

    /// Returns the ids of the sessions removed.
    async fn delete_by_test(&self, test_id: Uuid) -> Result<Vec<Uuid>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn TestDefinitionStore>) {}
    }

    #[test]
    fn attempt_session_store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn AttemptSessionStore>) {}
    }
}
