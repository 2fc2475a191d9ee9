pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::database::{
    AttemptSessionStore, InMemoryAttemptStore, InMemoryTestStore, TestDefinitionStore,
};
use crate::services::{
    analytics_service::AnalyticsService,
    attempt_service::AttemptService,
    scheduler_service::{SchedulerConfig, SchedulerRegistry},
    test_service::TestService,
};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct AppState {
    pub test_service: TestService,
    pub attempt_service: Arc<AttemptService>,
    pub analytics_service: AnalyticsService,
    pub schedulers: Arc<SchedulerRegistry>,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(
        tests: Arc<dyn TestDefinitionStore>,
        attempts: Arc<dyn AttemptSessionStore>,
        clock: Arc<dyn Clock>,
        scheduler_config: SchedulerConfig,
        jwt_secret: impl Into<String>,
    ) -> Self {
        let schedulers = Arc::new(SchedulerRegistry::new());

        let test_service = TestService::new(
            tests.clone(),
            attempts.clone(),
            schedulers.clone(),
            clock.clone(),
        );
        let attempt_service = Arc::new(AttemptService::new(
            tests.clone(),
            attempts.clone(),
            clock,
            schedulers.clone(),
            scheduler_config,
        ));
        let analytics_service = AnalyticsService::new(tests, attempts);

        Self {
            test_service,
            attempt_service,
            analytics_service,
            schedulers,
            jwt_secret: jwt_secret.into(),
        }
    }

    /// State backed by the in-memory stores.
    pub fn in_memory(
        clock: Arc<dyn Clock>,
        scheduler_config: SchedulerConfig,
        jwt_secret: impl Into<String>,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryTestStore::new()),
            Arc::new(InMemoryAttemptStore::new()),
            clock,
            scheduler_config,
            jwt_secret,
        )
    }
}
