use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{AttemptSessionStore, TestDefinitionStore};
use crate::dto::public_dto::{AttemptView, StatusResponse};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerValue};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{
    AttemptSession, AttemptStatus, IntegrityEventType, SubmissionResult, TelemetryCounts,
};
use crate::services::grading_service::GradingService;
use crate::services::scheduler_service::{
    AttemptDriver, AttemptScheduler, SchedulerConfig, SchedulerRegistry,
};
use crate::services::telemetry_service::TelemetryCollector;
use crate::utils::locks::KeyedLocks;
use crate::utils::time::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Pair(Uuid, String),
    Session(Uuid),
}

/// Owns every attempt while it is open and drives it to SUBMITTED.
///
/// Writes to one session are serialized through a per-session lock, so the
/// countdown, a student click and a grader never interleave on the same record.
pub struct AttemptService {
    tests: Arc<dyn TestDefinitionStore>,
    attempts: Arc<dyn AttemptSessionStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<LockKey>,
    schedulers: Arc<SchedulerRegistry>,
    scheduler_config: SchedulerConfig,
}

impl AttemptService {
    pub fn new(
        tests: Arc<dyn TestDefinitionStore>,
        attempts: Arc<dyn AttemptSessionStore>,
        clock: Arc<dyn Clock>,
        schedulers: Arc<SchedulerRegistry>,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        Self {
            tests,
            attempts,
            clock,
            locks: KeyedLocks::new(),
            schedulers,
            scheduler_config,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn schedulers(&self) -> &Arc<SchedulerRegistry> {
        &self.schedulers
    }

    async fn load_test(&self, test_id: Uuid) -> Result<TestDefinition> {
        self.tests
            .get(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test {} not found", test_id)))
    }

    async fn load(&self, session_id: Uuid) -> Result<AttemptSession> {
        self.attempts
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attempt {} not found", session_id)))
    }

    /// Returns the existing session for the pair unchanged, or opens a new one
    /// when the test window allows it.
    pub async fn start(&self, test_id: Uuid, student_id: &str) -> Result<AttemptSession> {
        if student_id.trim().is_empty() {
            return Err(Error::Validation("student id is required".to_string()));
        }

        let _guard = self
            .locks
            .lock(LockKey::Pair(test_id, student_id.to_string()))
            .await;

        if let Some(existing) = self
            .attempts
            .find_by_test_and_student(test_id, student_id)
            .await?
        {
            debug!(attempt_id = %existing.id, %test_id, student_id, "Resuming attempt");
            return Ok(existing);
        }

        let test = self.load_test(test_id).await?;
        let now = self.clock.now();
        if now < test.window_start {
            return Err(Error::WindowNotOpen {
                opens_at: test.window_start,
            });
        }
        if now > test.window_end {
            return Err(Error::WindowClosed {
                closed_at: test.window_end,
            });
        }

        let mut questions = test.questions.clone();
        if test.randomize_questions {
            questions.shuffle(&mut rand::thread_rng());
        }

        let session = AttemptSession::open(&test, student_id, questions, now);
        match self.attempts.insert(&session).await {
            Ok(()) => {}
            // Another process opened it first; the stored one wins.
            Err(Error::Conflict(_)) => {
                return self
                    .attempts
                    .find_by_test_and_student(test_id, student_id)
                    .await?
                    .ok_or_else(|| {
                        Error::Conflict(format!(
                            "attempt for student {} on test {} is being created",
                            student_id, test_id
                        ))
                    });
            }
            Err(e) => return Err(e),
        }

        info!(
            attempt_id = %session.id,
            %test_id,
            student_id,
            deadline = %session.deadline,
            "Attempt started"
        );
        Ok(session)
    }

    /// Starts the autosave and countdown tasks for an open session. No-op once submitted
    /// or when this process already hosts it.
    pub fn host(self: &Arc<Self>, session: &AttemptSession) -> bool {
        if session.is_submitted() {
            return false;
        }
        let driver: Arc<dyn AttemptDriver> = self.clone();
        self.schedulers.ensure(session.id, || {
            AttemptScheduler::spawn(
                driver,
                self.clock.clone(),
                session.id,
                session.deadline,
                self.scheduler_config,
            )
        })
    }

    pub async fn start_hosted(
        self: &Arc<Self>,
        test_id: Uuid,
        student_id: &str,
    ) -> Result<AttemptSession> {
        let session = self.start(test_id, student_id).await?;
        self.host(&session);
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<AttemptSession> {
        self.load(session_id).await
    }

    /// Loads a session on behalf of a student. Someone else's attempt is Forbidden.
    pub async fn get_owned(&self, session_id: Uuid, student_id: &str) -> Result<AttemptSession> {
        let session = self.load(session_id).await?;
        if session.student_id != student_id {
            return Err(Error::Forbidden(format!(
                "attempt {} belongs to another student",
                session_id
            )));
        }
        Ok(session)
    }

    pub async fn view(&self, session: &AttemptSession) -> Result<AttemptView> {
        let test = self.load_test(session.test_id).await?;
        Ok(AttemptView::new(session, test.max_tab_switches, self.clock.now()))
    }

    pub async fn status(&self, session_id: Uuid) -> Result<StatusResponse> {
        let session = self.load(session_id).await?;
        let test = self.load_test(session.test_id).await?;
        Ok(StatusResponse::new(&session, test.max_tab_switches, self.clock.now()))
    }

    pub async fn save_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: AnswerValue,
    ) -> Result<Answer> {
        let _guard = self.locks.lock(LockKey::Session(session_id)).await;
        let mut session = self.load(session_id).await?;

        if session.is_submitted() {
            return Err(Error::Conflict(format!(
                "attempt {} is already submitted",
                session_id
            )));
        }
        let now = self.clock.now();
        if now > session.deadline {
            return Err(Error::DeadlineExceeded {
                deadline: session.deadline,
            });
        }
        let question = session.question(question_id).ok_or_else(|| {
            Error::NotFound(format!(
                "question {} is not part of attempt {}",
                question_id, session_id
            ))
        })?;
        value.check_against(question).map_err(Error::Validation)?;

        let answer = Answer {
            question_id,
            value,
            saved_at: now,
        };
        session.answers.insert(question_id, answer.clone());
        session.telemetry.last_active_at = now;
        self.attempts
            .save(&session, AttemptStatus::InProgress)
            .await?;

        debug!(%session_id, question_id, "Answer saved");
        Ok(answer)
    }

    /// Queues an answer for the next autosave tick. Hosts the session if needed.
    pub async fn buffer_draft(
        self: &Arc<Self>,
        session_id: Uuid,
        question_id: i32,
        value: Option<AnswerValue>,
    ) -> Result<bool> {
        let session = self.load(session_id).await?;
        if session.is_submitted() {
            return Err(Error::Conflict(format!(
                "attempt {} is already submitted",
                session_id
            )));
        }
        if self.clock.now() > session.deadline {
            return Err(Error::DeadlineExceeded {
                deadline: session.deadline,
            });
        }
        let question = session.question(question_id).ok_or_else(|| {
            Error::NotFound(format!(
                "question {} is not part of attempt {}",
                question_id, session_id
            ))
        })?;
        if let Some(ref v) = value {
            v.check_against(question).map_err(Error::Validation)?;
        }

        self.host(&session);
        Ok(self.schedulers.buffer_answer(session_id, question_id, value))
    }

    /// Counts the event. After submission the frozen counts are returned untouched.
    pub async fn record_integrity_event(
        &self,
        session_id: Uuid,
        event_type: IntegrityEventType,
        details: Option<String>,
    ) -> Result<TelemetryCounts> {
        let _guard = self.locks.lock(LockKey::Session(session_id)).await;
        let mut session = self.load(session_id).await?;
        let test = self.load_test(session.test_id).await?;

        if session.is_submitted() {
            debug!(%session_id, ?event_type, "Ignoring integrity event for submitted attempt");
            return Ok(session.counts(test.max_tab_switches));
        }

        TelemetryCollector::record(&mut session.telemetry, event_type, details, self.clock.now());
        match self
            .attempts
            .save(&session, AttemptStatus::InProgress)
            .await
        {
            Ok(()) => {}
            // Submitted by another process since it was loaded.
            Err(Error::Conflict(_)) => {
                let frozen = self.load(session_id).await?;
                return Ok(frozen.counts(test.max_tab_switches));
            }
            Err(e) => return Err(e),
        }

        let counts = session.counts(test.max_tab_switches);
        if event_type == IntegrityEventType::TabSwitch && counts.tab_switch_warning {
            warn!(
                %session_id,
                student_id = %session.student_id,
                tab_switches = counts.tab_switch_count,
                limit = test.max_tab_switches,
                "Tab switch limit exceeded"
            );
        }
        Ok(counts)
    }

    /// Grades and freezes the attempt. Safe to call any number of times, concurrently;
    /// only the first call grades. `force` is informational and follows the same path.
    ///
    /// Drafts still buffered by this process's autosave are applied before grading.
    /// The hosted scheduler is torn down whatever the outcome.
    pub async fn submit(&self, session_id: Uuid, force: bool) -> Result<SubmissionResult> {
        let result = self.submit_locked(session_id, force).await;
        self.schedulers.teardown(session_id);
        result
    }

    async fn submit_locked(&self, session_id: Uuid, force: bool) -> Result<SubmissionResult> {
        let _guard = self.locks.lock(LockKey::Session(session_id)).await;
        let mut session = self.load(session_id).await?;

        if session.is_submitted() {
            debug!(%session_id, force, "Attempt already submitted");
            return Ok(SubmissionResult::from(&session));
        }

        let test = self.load_test(session.test_id).await?;
        let now = self.clock.now();
        let submitted_at = now.min(session.deadline);

        let drafts = self.schedulers.take_drafts(session_id);
        apply_drafts(&mut session, drafts, submitted_at);

        let graded =
            GradingService::grade_submission(&session.ordered_questions, &session.answers, now);
        let flags = TelemetryCollector::derive_flags(
            &session.telemetry,
            &test,
            session.started_at,
            submitted_at,
        );

        session.earned_points = Some(GradingService::earned_points(&graded));
        session.needs_manual_grading = GradingService::needs_manual_grading(&graded);
        session.graded_questions = graded;
        session.cheating_flags = flags;
        session.submitted_at = Some(submitted_at);
        session.status = AttemptStatus::Submitted;

        match self
            .attempts
            .save(&session, AttemptStatus::InProgress)
            .await
        {
            Ok(()) => {}
            // Another process froze it first; its result stands.
            Err(Error::Conflict(_)) => {
                let frozen = self.load(session_id).await?;
                if frozen.is_submitted() {
                    debug!(%session_id, "Attempt submitted elsewhere");
                    return Ok(SubmissionResult::from(&frozen));
                }
                return Err(Error::Conflict(format!(
                    "attempt {} changed while submitting",
                    session_id
                )));
            }
            Err(e) => return Err(e),
        }

        info!(
            %session_id,
            force,
            earned_points = session.earned_points.unwrap_or(0),
            flags = session.cheating_flags.len(),
            needs_manual_grading = session.needs_manual_grading,
            "Attempt submitted"
        );
        Ok(SubmissionResult::from(&session))
    }

    /// Every attempt for the test, oldest first, with full grading detail.
    pub async fn list_submissions(&self, test_id: Uuid) -> Result<Vec<AttemptSession>> {
        self.load_test(test_id).await?;
        self.attempts.list_by_test(test_id).await
    }

    /// Scores one essay, then recomputes the attempt totals from scratch.
    pub async fn grade_essay(
        &self,
        attempt_id: Uuid,
        question_id: i32,
        points: i32,
        feedback: Option<String>,
    ) -> Result<AttemptSession> {
        let _guard = self.locks.lock(LockKey::Session(attempt_id)).await;
        let mut session = self.load(attempt_id).await?;

        if !session.is_submitted() {
            return Err(Error::Validation(format!(
                "attempt {} has not been submitted yet",
                attempt_id
            )));
        }

        GradingService::apply_essay_grade(
            &mut session.graded_questions,
            question_id,
            points,
            feedback,
            self.clock.now(),
        )?;
        session.earned_points = Some(GradingService::earned_points(&session.graded_questions));
        session.needs_manual_grading =
            GradingService::needs_manual_grading(&session.graded_questions);
        self.attempts
            .save(&session, AttemptStatus::Submitted)
            .await?;

        info!(
            %attempt_id,
            question_id,
            points,
            earned_points = session.earned_points.unwrap_or(0),
            "Essay graded"
        );
        Ok(session)
    }

    /// Submits expired attempts this process is not counting down, e.g. after a restart.
    pub async fn force_submit_expired(&self) -> Result<usize> {
        let expired = self.attempts.list_expired(self.clock.now()).await?;
        let mut submitted = 0;
        for session in expired {
            if self.schedulers.is_hosted(session.id) {
                continue;
            }
            match self.submit(session.id, true).await {
                Ok(_) => submitted += 1,
                Err(e) => {
                    error!(attempt_id = %session.id, error = %e, "Deadline sweep failed to submit")
                }
            }
        }
        if submitted > 0 {
            info!(submitted, "Deadline sweep submitted expired attempts");
        }
        Ok(submitted)
    }
}

/// Folds unflushed drafts into the answers. Drafts that no longer fit their
/// question are dropped.
fn apply_drafts(
    session: &mut AttemptSession,
    drafts: Vec<(i32, AnswerValue)>,
    saved_at: chrono::DateTime<chrono::Utc>,
) {
    for (question_id, value) in drafts {
        let fits = session
            .question(question_id)
            .map(|q| value.check_against(q).is_ok())
            .unwrap_or(false);
        if !fits {
            warn!(session_id = %session.id, question_id, "Dropping draft that does not fit its question");
            continue;
        }
        session.answers.insert(
            question_id,
            Answer {
                question_id,
                value,
                saved_at,
            },
        );
    }
}

#[async_trait]
impl AttemptDriver for AttemptService {
    async fn save_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: AnswerValue,
    ) -> Result<Answer> {
        AttemptService::save_answer(self, session_id, question_id, value).await
    }

    async fn submit(&self, session_id: Uuid, force: bool) -> Result<SubmissionResult> {
        AttemptService::submit(self, session_id, force).await
    }
}
