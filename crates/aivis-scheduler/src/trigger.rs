//! Daily trigger — the single entry point that decides whether today's
//! batch runs.
//!
//! Every caller (cron, guardian, operator) funnels through the same
//! claim-then-run protocol. The claim is the atomic conditional update in
//! the store; duplicate and concurrent invocations resolve to no-op
//! successes, never to a second fan-out.

use std::sync::Arc;

use aivis_core::error::Result;
use aivis_store::{BatchDb, RunStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::calendar::BusinessCalendar;
use crate::fanout::FanOutExecutor;

/// Run-log function name for daily batch invocations.
pub const DAILY_TRIGGER_FN: &str = "daily-batch-trigger";

/// Who initiated a trigger invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Cron,
    ManualTrigger,
    GuardianRecovery,
    MonitorRecovery,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Cron => "cron",
            TriggerSource::ManualTrigger => "manual_trigger",
            TriggerSource::GuardianRecovery => "guardian_recovery",
            TriggerSource::MonitorRecovery => "monitor_recovery",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a trigger invocation did.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    /// Whether THIS invocation ran the fan-out.
    pub executed: bool,
    pub message: String,
    pub day_key: String,
    pub total_runs: u32,
    pub organizations_processed: u32,
}

impl TriggerOutcome {
    fn noop(day_key: &str, message: &str) -> Self {
        Self {
            executed: false,
            message: message.to_string(),
            day_key: day_key.to_string(),
            total_runs: 0,
            organizations_processed: 0,
        }
    }
}

/// The daily batch trigger.
pub struct DailyTrigger {
    db: Arc<BatchDb>,
    calendar: BusinessCalendar,
    executor: Arc<FanOutExecutor>,
}

impl DailyTrigger {
    pub fn new(db: Arc<BatchDb>, calendar: BusinessCalendar, executor: Arc<FanOutExecutor>) -> Self {
        Self {
            db,
            calendar,
            executor,
        }
    }

    /// Claim today's day-key and, on winning, run the fan-out.
    ///
    /// `force` skips the already-ran short-circuit (recovery callers use it
    /// when the ordinary run never happened) but still goes through the
    /// atomic claim — two simultaneous forced calls cannot both execute,
    /// and forcing an already-claimed day stays a no-op.
    pub async fn run(&self, force: bool, source: TriggerSource) -> Result<TriggerOutcome> {
        let now = Utc::now();
        let day_key = self.calendar.day_key(now);

        if !force {
            let state = self.db.scheduler_state()?;
            if state.last_daily_run_key.as_deref() == Some(day_key.as_str()) {
                tracing::info!("⏭️ Daily batch already ran for {} — skipping", day_key);
                return Ok(TriggerOutcome::noop(&day_key, "already ran today"));
            }
        }

        // Store errors here fail closed: no claim, no fan-out.
        if !self.db.claim_day(&day_key, now)? {
            tracing::info!(
                "🤝 Claim for {} lost to a concurrent invocation (source={})",
                day_key,
                source
            );
            return Ok(TriggerOutcome::noop(&day_key, "another instance handled today"));
        }

        tracing::info!("🔒 Claimed {} (source={}) — starting fan-out", day_key, source);
        let run_id = self.db.begin_run(DAILY_TRIGGER_FN, source.as_str())?;

        match self.executor.run(&day_key).await {
            Ok(report) => {
                let detail = format!(
                    "{} unit(s) across {} org(s), {} failed",
                    report.total_runs, report.organizations_processed, report.failed_units
                );
                self.db.finish_run(run_id, RunStatus::Completed, Some(&detail))?;
                Ok(TriggerOutcome {
                    executed: true,
                    message: format!("daily batch completed: {detail}"),
                    day_key,
                    total_runs: report.total_runs,
                    organizations_processed: report.organizations_processed,
                })
            }
            Err(e) => {
                // The claim is intentionally NOT reverted: a half-done run
                // still proves the system is alive, and the prompt guardian's
                // response-log signal covers the retry path.
                tracing::error!("❌ Fan-out for {} failed: {e}", day_key);
                if let Err(log_err) =
                    self.db
                        .finish_run(run_id, RunStatus::Failed, Some(&e.to_string()))
                {
                    tracing::warn!("⚠️ Could not finalize failed run entry: {log_err}");
                }
                Err(e)
            }
        }
    }

    /// The calendar this trigger claims against.
    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }
}
