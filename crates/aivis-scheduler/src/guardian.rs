//! Health guardians — the dead-man's-switch layer.
//!
//! Two independently scheduled watchers, each keyed on a different signal:
//! the execution monitor reads the run log, the prompt-execution guardian
//! reads the raw response log. The run log can show "completed" while zero
//! answers were produced (empty catalog, broken engines), which is exactly
//! the silent-no-op class the second guardian exists to catch.
//!
//! On silence past the rolling window, a guardian force-invokes the daily
//! trigger once and reports what happened. No in-process retry — the next
//! poll cycle is the retry.

use std::sync::Arc;

use aivis_core::error::Result;
use aivis_store::BatchDb;
use serde::Serialize;

use crate::trigger::{DailyTrigger, TriggerSource, DAILY_TRIGGER_FN};

/// Result of one guardian poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianStatus {
    Healthy,
    RecoveryTriggered,
    RecoveryFailed,
}

/// What a guardian observed and did.
#[derive(Debug, Clone, Serialize)]
pub struct GuardianReport {
    pub guardian: &'static str,
    pub status: GuardianStatus,
    pub window_hours: i64,
    pub detail: String,
}

/// Guardian A — watches the scheduler run log for a recent completed
/// daily-batch run.
pub struct ExecutionMonitor {
    db: Arc<BatchDb>,
    trigger: Arc<DailyTrigger>,
    window: chrono::Duration,
}

impl ExecutionMonitor {
    pub fn new(db: Arc<BatchDb>, trigger: Arc<DailyTrigger>, window_hours: i64) -> Self {
        Self {
            db,
            trigger,
            window: chrono::Duration::hours(window_hours),
        }
    }

    /// Poll once: quiet if a completed run exists inside the window,
    /// otherwise force a recovery run.
    pub async fn check(&self) -> Result<GuardianReport> {
        if self
            .db
            .has_completed_run_within(DAILY_TRIGGER_FN, self.window)?
        {
            return Ok(GuardianReport {
                guardian: "execution-monitor",
                status: GuardianStatus::Healthy,
                window_hours: self.window.num_hours(),
                detail: "completed run found within window".into(),
            });
        }

        tracing::warn!(
            "🚨 Execution monitor: no completed run in {}h — forcing daily trigger",
            self.window.num_hours()
        );
        Ok(force_recovery(
            "execution-monitor",
            &self.trigger,
            TriggerSource::MonitorRecovery,
            self.window,
        )
        .await)
    }
}

/// Guardian B — watches the raw response log for any recent answer.
pub struct PromptExecutionGuardian {
    db: Arc<BatchDb>,
    trigger: Arc<DailyTrigger>,
    window: chrono::Duration,
}

impl PromptExecutionGuardian {
    pub fn new(db: Arc<BatchDb>, trigger: Arc<DailyTrigger>, window_hours: i64) -> Self {
        Self {
            db,
            trigger,
            window: chrono::Duration::hours(window_hours),
        }
    }

    /// Poll once: quiet if any response row exists inside the window,
    /// otherwise force a recovery run.
    pub async fn check(&self) -> Result<GuardianReport> {
        if self.db.has_response_within(self.window)? {
            return Ok(GuardianReport {
                guardian: "prompt-execution-guardian",
                status: GuardianStatus::Healthy,
                window_hours: self.window.num_hours(),
                detail: "responses found within window".into(),
            });
        }

        tracing::warn!(
            "🚨 Prompt guardian: no responses in {}h — forcing daily trigger",
            self.window.num_hours()
        );
        Ok(force_recovery(
            "prompt-execution-guardian",
            &self.trigger,
            TriggerSource::GuardianRecovery,
            self.window,
        )
        .await)
    }
}

/// Shared recovery path: one forced trigger invocation, no retry.
async fn force_recovery(
    guardian: &'static str,
    trigger: &DailyTrigger,
    source: TriggerSource,
    window: chrono::Duration,
) -> GuardianReport {
    match trigger.run(true, source).await {
        Ok(outcome) => GuardianReport {
            guardian,
            status: GuardianStatus::RecoveryTriggered,
            window_hours: window.num_hours(),
            detail: outcome.message,
        },
        Err(e) => {
            tracing::error!("❌ {guardian}: forced trigger failed: {e}");
            GuardianReport {
                guardian,
                status: GuardianStatus::RecoveryFailed,
                window_hours: window.num_hours(),
                detail: e.to_string(),
            }
        }
    }
}
