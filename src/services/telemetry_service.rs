use chrono::{DateTime, Utc};

use crate::models::test::TestDefinition;
use crate::models::test_attempt::{
    CheatingFlag, CheatingFlagType, FlagSeverity, IntegrityEvent, IntegrityEventType, Telemetry,
};

/// Share of the allotted time below which a submission counts as suspiciously fast.
pub const TOO_FAST_RATIO: f64 = 0.3;

pub struct TelemetryCollector;

impl TelemetryCollector {
    /// Appends the event and bumps its counter. Never blocks or fails.
    pub fn record(
        telemetry: &mut Telemetry,
        event_type: IntegrityEventType,
        details: Option<String>,
        now: DateTime<Utc>,
    ) {
        match event_type {
            IntegrityEventType::TabSwitch => telemetry.tab_switch_count += 1,
            IntegrityEventType::CopyAttempt => telemetry.copy_attempt_count += 1,
            IntegrityEventType::PasteAttempt => telemetry.paste_attempt_count += 1,
        }
        telemetry.events.push(IntegrityEvent {
            event_type,
            details,
            timestamp: now,
        });
        telemetry.last_active_at = now;
    }

    /// Advisory flags, computed once when the attempt is submitted.
    pub fn derive_flags(
        telemetry: &Telemetry,
        test: &TestDefinition,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
    ) -> Vec<CheatingFlag> {
        let mut flags = Vec::new();

        if telemetry.tab_switch_count > test.max_tab_switches {
            flags.push(CheatingFlag {
                flag_type: CheatingFlagType::ExcessiveTabSwitches,
                severity: FlagSeverity::High,
                message: format!(
                    "Switched tabs {} times (limit {})",
                    telemetry.tab_switch_count, test.max_tab_switches
                ),
            });
        }

        if telemetry.copy_attempt_count > 0 {
            flags.push(CheatingFlag {
                flag_type: CheatingFlagType::CopyAttempts,
                severity: FlagSeverity::Medium,
                message: format!("{} copy attempt(s) detected", telemetry.copy_attempt_count),
            });
        }

        let elapsed_secs = (submitted_at - started_at).num_milliseconds() as f64 / 1000.0;
        let threshold_secs = TOO_FAST_RATIO * (test.duration_minutes as f64) * 60.0;
        if elapsed_secs < threshold_secs {
            flags.push(CheatingFlag {
                flag_type: CheatingFlagType::TooFast,
                severity: FlagSeverity::Medium,
                message: format!(
                    "Submitted after {:.1} of {} minutes",
                    elapsed_secs / 60.0,
                    test.duration_minutes
                ),
            });
        }

        flags
    }
}
