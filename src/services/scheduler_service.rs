//! Per-attempt background work: a periodic autosave of buffered drafts and a
//! countdown that forces submission once the deadline passes. Both tasks share
//! one cancellation token, so tearing a session down stops them together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, AnswerValue};
use crate::models::test_attempt::SubmissionResult;
use crate::utils::time::Clock;

/// The two operations the background tasks drive on an attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptDriver: Send + Sync {
    async fn save_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: AnswerValue,
    ) -> Result<Answer>;

    async fn submit(&self, session_id: Uuid, force: bool) -> Result<SubmissionResult>;
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub autosave_interval: Duration,
    pub countdown_tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(30),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

type DraftBuffer = Arc<Mutex<HashMap<i32, Option<AnswerValue>>>>;

/// Background tasks hosting one in-progress attempt.
pub struct AttemptScheduler {
    session_id: Uuid,
    token: CancellationToken,
    drafts: DraftBuffer,
    tracker: TaskTracker,
}

impl AttemptScheduler {
    pub fn spawn(
        driver: Arc<dyn AttemptDriver>,
        clock: Arc<dyn Clock>,
        session_id: Uuid,
        deadline: DateTime<Utc>,
        config: SchedulerConfig,
    ) -> Self {
        let token = CancellationToken::new();
        let drafts: DraftBuffer = Arc::default();
        let tracker = TaskTracker::new();

        tracker.spawn(autosave_loop(
            driver.clone(),
            session_id,
            drafts.clone(),
            config.autosave_interval,
            token.clone(),
        ));
        tracker.spawn(countdown_loop(
            driver,
            clock,
            session_id,
            deadline,
            config.countdown_tick,
            token.clone(),
        ));
        tracker.close();

        debug!(%session_id, %deadline, "Attempt scheduler started");

        Self {
            session_id,
            token,
            drafts,
            tracker,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Latest value wins. `None` marks a cleared field, which is never flushed.
    pub fn buffer_answer(&self, question_id: i32, value: Option<AnswerValue>) {
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(question_id, value);
    }

    pub fn pending_drafts(&self) -> usize {
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|v| v.is_some())
            .count()
    }

    /// Drains the buffer, returning the non-null drafts.
    pub fn take_drafts(&self) -> Vec<(i32, AnswerValue)> {
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .filter_map(|(q, v)| v.map(|v| (q, v)))
            .collect()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once both tasks have exited.
    pub async fn stopped(&self) {
        self.tracker.wait().await;
    }
}

impl Drop for AttemptScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn autosave_loop(
    driver: Arc<dyn AttemptDriver>,
    session_id: Uuid,
    drafts: DraftBuffer,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                flush_drafts(driver.as_ref(), session_id, &drafts).await;
            }
        }
    }

    debug!(%session_id, "Autosave stopped");
}

/// Saves every buffered non-null answer. Entries that fail stay buffered for the next tick.
async fn flush_drafts(driver: &dyn AttemptDriver, session_id: Uuid, drafts: &DraftBuffer) {
    let pending: Vec<(i32, AnswerValue)> = drafts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter_map(|(q, v)| v.clone().map(|v| (*q, v)))
        .collect();

    if pending.is_empty() {
        return;
    }

    let mut saved = 0usize;
    for (question_id, value) in pending {
        match driver.save_answer(session_id, question_id, value.clone()).await {
            Ok(_) => {
                let mut guard = drafts.lock().unwrap_or_else(PoisonError::into_inner);
                // A newer draft may have arrived while saving.
                if guard.get(&question_id) == Some(&Some(value)) {
                    guard.remove(&question_id);
                }
                saved += 1;
            }
            Err(e) => {
                warn!(%session_id, question_id, error = %e, "Autosave failed, retrying next tick");
            }
        }
    }

    debug!(%session_id, saved, "Autosave flushed drafts");
}

async fn countdown_loop(
    driver: Arc<dyn AttemptDriver>,
    clock: Arc<dyn Clock>,
    session_id: Uuid,
    deadline: DateTime<Utc>,
    tick: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if clock.now() < deadline {
                    continue;
                }
                info!(%session_id, "Deadline reached, forcing submission");
                if let Err(e) = driver.submit(session_id, true).await {
                    error!(%session_id, error = %e, "Forced submission failed");
                }
                token.cancel();
                break;
            }
        }
    }

    debug!(%session_id, "Countdown stopped");
}

/// Schedulers for every attempt hosted by this process, keyed by session id.
#[derive(Default)]
pub struct SchedulerRegistry {
    active: Mutex<HashMap<Uuid, AttemptScheduler>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a scheduler unless a live one already exists. Returns true when spawned.
    pub fn ensure<F>(&self, session_id: Uuid, spawn: F) -> bool
    where
        F: FnOnce() -> AttemptScheduler,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = active.get(&session_id) {
            if !existing.is_cancelled() {
                return false;
            }
        }
        active.insert(session_id, spawn());
        true
    }

    /// Returns false when the session is not hosted here.
    pub fn buffer_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: Option<AnswerValue>,
    ) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(&session_id) {
            Some(scheduler) if !scheduler.is_cancelled() => {
                scheduler.buffer_answer(question_id, value);
                true
            }
            _ => false,
        }
    }

    /// Unflushed drafts for the session, if it is hosted here. Empty otherwise.
    pub fn take_drafts(&self, session_id: Uuid) -> Vec<(i32, AnswerValue)> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .map(AttemptScheduler::take_drafts)
            .unwrap_or_default()
    }

    pub fn teardown(&self, session_id: Uuid) -> bool {
        let removed = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
        match removed {
            Some(scheduler) => {
                scheduler.cancel();
                debug!(%session_id, "Attempt scheduler torn down");
                true
            }
            None => false,
        }
    }

    /// Cancels everything. Used on process shutdown.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<AttemptScheduler> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, s)| s)
            .collect();
        for scheduler in &drained {
            scheduler.cancel();
        }
        info!(count = drained.len(), "Attempt schedulers stopped");
        drained.len()
    }

    pub fn is_hosted(&self, session_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .map_or(false, |s| !s.is_cancelled())
    }

    pub fn hosted_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| !s.is_cancelled())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::utils::time::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> SchedulerConfig {
        SchedulerConfig {
            autosave_interval: Duration::from_millis(10),
            countdown_tick: Duration::from_millis(5),
        }
    }

    fn empty_result(attempt_id: Uuid) -> SubmissionResult {
        SubmissionResult {
            attempt_id,
            submitted_at: None,
            earned_points: 0,
            graded_questions: Vec::new(),
            cheating_flags: Vec::new(),
            needs_manual_grading: false,
        }
    }

    async fn wait_stopped(scheduler: &AttemptScheduler) {
        tokio::time::timeout(Duration::from_secs(2), scheduler.stopped())
            .await
            .expect("scheduler tasks did not stop");
    }

    #[tokio::test]
    async fn countdown_forces_submission_exactly_once() {
        let session_id = Uuid::new_v4();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut driver = MockAttemptDriver::new();
        driver
            .expect_submit()
            .withf(|_, force| *force)
            .times(1)
            .returning(move |id, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(empty_result(id))
            });

        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let scheduler = AttemptScheduler::spawn(
            Arc::new(driver),
            clock.clone(),
            session_id,
            start + chrono::Duration::seconds(60),
            fast(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        clock.advance(chrono::Duration::seconds(61));
        wait_stopped(&scheduler).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_cancelled());
    }

    #[tokio::test]
    async fn failed_autosave_is_retried_on_next_tick() {
        let session_id = Uuid::new_v4();
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();

        let mut driver = MockAttemptDriver::new();
        driver
            .expect_save_answer()
            .times(2)
            .returning(move |_, question_id, value| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Internal("store unavailable".into()))
                } else {
                    Ok(Answer {
                        question_id,
                        value,
                        saved_at: Utc::now(),
                    })
                }
            });

        let start = Utc::now();
        let scheduler = AttemptScheduler::spawn(
            Arc::new(driver),
            Arc::new(ManualClock::new(start)),
            session_id,
            start + chrono::Duration::hours(1),
            fast(),
        );
        scheduler.buffer_answer(3, Some(AnswerValue::Choice(1)));
        scheduler.buffer_answer(4, None);

        tokio::time::timeout(Duration::from_secs(2), async {
            while scheduler.pending_drafts() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("draft was never flushed");

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        scheduler.cancel();
        wait_stopped(&scheduler).await;
    }

    #[tokio::test]
    async fn teardown_stops_both_tasks() {
        let session_id = Uuid::new_v4();
        let mut driver = MockAttemptDriver::new();
        driver.expect_submit().times(0);
        driver.expect_save_answer().times(0);
        let driver: Arc<dyn AttemptDriver> = Arc::new(driver);

        let start = Utc::now();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start));
        let registry = SchedulerRegistry::new();

        let spawned = registry.ensure(session_id, || {
            AttemptScheduler::spawn(
                driver.clone(),
                clock.clone(),
                session_id,
                start + chrono::Duration::hours(1),
                fast(),
            )
        });
        assert!(spawned);
        assert!(!registry.ensure(session_id, || unreachable!()));
        assert!(registry.is_hosted(session_id));
        assert_eq!(registry.hosted_count(), 1);

        assert!(registry.buffer_answer(session_id, 1, Some(AnswerValue::Choice(2))));
        assert!(registry.buffer_answer(session_id, 2, None));
        assert_eq!(
            registry.take_drafts(session_id),
            vec![(1, AnswerValue::Choice(2))]
        );
        assert!(registry.take_drafts(session_id).is_empty());
        assert!(registry.take_drafts(Uuid::new_v4()).is_empty());

        assert!(registry.teardown(session_id));
        assert!(!registry.teardown(session_id));
        assert!(!registry.is_hosted(session_id));
        assert!(!registry.buffer_answer(session_id, 1, Some(AnswerValue::Choice(0))));
        assert_eq!(registry.hosted_count(), 0);
    }

    #[tokio::test]
    async fn cancel_stops_tasks_without_driving_the_attempt() {
        let mut driver = MockAttemptDriver::new();
        driver.expect_submit().times(0);
        let start = Utc::now();
        let scheduler = AttemptScheduler::spawn(
            Arc::new(driver),
            Arc::new(ManualClock::new(start)),
            Uuid::new_v4(),
            start + chrono::Duration::hours(1),
            fast(),
        );

        scheduler.cancel();
        wait_stopped(&scheduler).await;
    }
}
