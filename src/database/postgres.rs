//! Postgres-backed stores. Bodies are kept as JSONB; the columns next to them
//! exist for lookups, ordering and the uniqueness rule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{AttemptSessionStore, TestDefinitionStore};
use crate::error::{Error, Result};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptSession, AttemptStatus};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TestDefinitionStore for PgStore {
    async fn insert(&self, test: &TestDefinition) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO test_definitions (id, class_id, created_at, body) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(test.id)
        .bind(&test.class_id)
        .bind(test.created_at)
        .bind(Json(test))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, test_id: Uuid) -> Result<Option<TestDefinition>> {
        let row = sqlx::query_scalar::<_, Json<TestDefinition>>(
            r#"SELECT body FROM test_definitions WHERE id = $1"#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(t)| t))
    }

    async fn list(&self, class_id: Option<&str>) -> Result<Vec<TestDefinition>> {
        let rows = sqlx::query_scalar::<_, Json<TestDefinition>>(
            r#"
            SELECT body FROM test_definitions
            WHERE ($1::text IS NULL OR class_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(t)| t).collect())
    }

    async fn delete(&self, test_id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM test_definitions WHERE id = $1"#)
            .bind(test_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttemptSessionStore for PgStore {
    async fn insert(&self, session: &AttemptSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempt_sessions (id, test_id, student_id, status, started_at, deadline, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id)
        .bind(session.test_id)
        .bind(&session.student_id)
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.deadline)
        .bind(Json(session))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, session: &AttemptSession, expected: AttemptStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE attempt_sessions
            SET status = $2, body = $3, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(session.id)
        .bind(session.status.as_str())
        .bind(Json(session))
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Tell a vanished row apart from one another process already moved on.
        let current = sqlx::query_scalar::<_, String>(
            r#"SELECT status FROM attempt_sessions WHERE id = $1"#,
        )
        .bind(session.id)
        .fetch_optional(&self.pool)
        .await?;
        match current {
            Some(status) => Err(Error::Conflict(format!(
                "attempt {} is {}, expected {}",
                session.id,
                status,
                expected.as_str()
            ))),
            None => Err(Error::NotFound(format!("attempt {} not found", session.id))),
        }
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<AttemptSession>> {
        let row = sqlx::query_scalar::<_, Json<AttemptSession>>(
            r#"SELECT body FROM attempt_sessions WHERE id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(s)| s))
    }

    async fn find_by_test_and_student(
        &self,
        test_id: Uuid,
        student_id: &str,
    ) -> Result<Option<AttemptSession>> {
        let row = sqlx::query_scalar::<_, Json<AttemptSession>>(
            r#"SELECT body FROM attempt_sessions WHERE test_id = $1 AND student_id = $2"#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(s)| s))
    }

    async fn list_by_test(&self, test_id: Uuid) -> Result<Vec<AttemptSession>> {
        let rows = sqlx::query_scalar::<_, Json<AttemptSession>>(
            r#"SELECT body FROM attempt_sessions WHERE test_id = $1 ORDER BY started_at ASC"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(s)| s).collect())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<AttemptSession>> {
        let rows = sqlx::query_scalar::<_, Json<AttemptSession>>(
            r#"
            SELECT body FROM attempt_sessions
            WHERE status = 'IN_PROGRESS' AND deadline < $1
            ORDER BY deadline ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(s)| s).collect())
    }

    async fn delete_by_test(&self, test_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"DELETE FROM attempt_sessions WHERE test_id = $1 RETURNING id"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
