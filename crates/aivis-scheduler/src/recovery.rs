//! Manual recovery — the operator's escape hatch.
//!
//! The daily trigger's claim is by-day and cannot replay a day that was
//! already consumed; this path skips the claim entirely and re-runs the
//! fan-out for every organization, one at a time, each under a fresh
//! correlation id. Failures are collected, never fatal to the loop.

use std::sync::Arc;
use std::time::Duration;

use aivis_core::error::Result;
use aivis_store::{BatchDb, RunStatus};
use chrono::Utc;
use serde::Serialize;

use crate::calendar::BusinessCalendar;
use crate::fanout::FanOutExecutor;

/// Run-log function name for manual recovery invocations.
pub const MANUAL_RECOVERY_FN: &str = "manual-batch-recovery";

/// Per-organization replay outcome.
#[derive(Debug, Clone, Serialize)]
pub struct OrgRecoveryResult {
    pub org_id: String,
    pub org_name: String,
    pub success: bool,
    pub units: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate replay outcome.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub total_organizations: u32,
    pub successful_triggers: u32,
    pub failed_triggers: u32,
    pub results: Vec<OrgRecoveryResult>,
}

/// Operator-invoked full replay, no idempotency check.
pub struct ManualRecovery {
    db: Arc<BatchDb>,
    calendar: BusinessCalendar,
    executor: Arc<FanOutExecutor>,
    /// Pause between organizations so downstream engine APIs aren't hit
    /// with a thundering herd.
    org_delay: Duration,
}

impl ManualRecovery {
    pub fn new(
        db: Arc<BatchDb>,
        calendar: BusinessCalendar,
        executor: Arc<FanOutExecutor>,
        org_delay: Duration,
    ) -> Self {
        Self {
            db,
            calendar,
            executor,
            org_delay,
        }
    }

    /// Replay the fan-out for all active organizations. Always executes.
    pub async fn run(&self) -> Result<RecoveryReport> {
        let orgs = self.db.list_active_organizations()?;
        let day_key = self.calendar.day_key(Utc::now());
        tracing::info!(
            "🛟 Manual recovery started: {} organization(s), day {}",
            orgs.len(),
            day_key
        );
        let run_id = self.db.begin_run(MANUAL_RECOVERY_FN, "manual_trigger")?;

        let mut report = RecoveryReport {
            total_organizations: orgs.len() as u32,
            successful_triggers: 0,
            failed_triggers: 0,
            results: Vec::with_capacity(orgs.len()),
        };

        for (i, org) in orgs.iter().enumerate() {
            if i > 0 && !self.org_delay.is_zero() {
                tokio::time::sleep(self.org_delay).await;
            }
            let correlation_id = uuid::Uuid::new_v4().to_string();
            match self.executor.run_for_org(org, &day_key, &correlation_id).await {
                Ok(result) => {
                    report.successful_triggers += 1;
                    report.results.push(OrgRecoveryResult {
                        org_id: org.id.clone(),
                        org_name: org.name.clone(),
                        success: true,
                        units: result.units,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!("❌ Recovery failed for org '{}': {e}", org.id);
                    report.failed_triggers += 1;
                    report.results.push(OrgRecoveryResult {
                        org_id: org.id.clone(),
                        org_name: org.name.clone(),
                        success: false,
                        units: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let status = if report.failed_triggers == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let detail = format!(
            "{}/{} org(s) replayed",
            report.successful_triggers, report.total_organizations
        );
        if let Err(e) = self.db.finish_run(run_id, status, Some(&detail)) {
            tracing::warn!("⚠️ Could not finalize recovery run entry: {e}");
        }

        tracing::info!("🛟 Manual recovery done: {detail}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aivis_providers::{AnswerEngine, EnginePool};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct OkEngine;

    #[async_trait]
    impl AnswerEngine for OkEngine {
        fn name(&self) -> &str {
            "stub"
        }
        async fn ask(&self, _prompt: &str, _model: &str) -> aivis_core::error::Result<String> {
            Ok("answer".into())
        }
    }

    fn setup(name: &str) -> (Arc<BatchDb>, ManualRecovery) {
        let dir = std::env::temp_dir().join(format!("aivis-recovery-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let db = Arc::new(BatchDb::open(&dir.join("batch.db")).unwrap());
        for o in 0..3 {
            let org = format!("org-{o}");
            db.upsert_organization(&org, &format!("Org {o}"), true).unwrap();
            db.upsert_prompt(&format!("{org}-p"), &org, "best CRM?", true).unwrap();
        }
        db.upsert_engine("stub", "", true).unwrap();

        let engines: Vec<Arc<dyn AnswerEngine>> = vec![Arc::new(OkEngine)];
        let pool = Arc::new(EnginePool::from_engines(engines));
        let executor = Arc::new(FanOutExecutor::new(
            db.clone(),
            pool,
            2,
            Duration::from_secs(5),
        ));
        let calendar = BusinessCalendar::new("America/New_York", 3).unwrap();
        let recovery = ManualRecovery::new(db.clone(), calendar, executor, Duration::ZERO);
        (db, recovery)
    }

    #[tokio::test]
    async fn test_recovery_replays_all_orgs() {
        let (db, recovery) = setup("all-orgs");
        let report = recovery.run().await.unwrap();
        assert_eq!(report.total_organizations, 3);
        assert_eq!(report.successful_triggers, 3);
        assert_eq!(report.failed_triggers, 0);
        assert!(report.results.iter().all(|r| r.success && r.units == 1));

        let runs = db.recent_runs(5).unwrap();
        assert_eq!(runs[0].function_name, MANUAL_RECOVERY_FN);
        assert_eq!(runs[0].status, "completed");
    }

    #[tokio::test]
    async fn test_recovery_ignores_claim_state() {
        let (db, recovery) = setup("ignores-claim");
        // Day already claimed — the daily trigger would refuse to re-run.
        let cal = BusinessCalendar::new("America/New_York", 3).unwrap();
        let day = cal.day_key(Utc::now());
        assert!(db.claim_day(&day, Utc::now()).unwrap());

        let report = recovery.run().await.unwrap();
        assert_eq!(report.successful_triggers, 3);
        assert!(db.response_count_for_day(&day).unwrap() >= 3);
    }

    #[tokio::test]
    async fn test_distinct_correlation_ids_per_org() {
        let (db, recovery) = setup("correlation");
        recovery.run().await.unwrap();

        // Each org's units carry their own correlation id.
        let conn = rusqlite::Connection::open(
            std::env::temp_dir()
                .join("aivis-recovery-test-correlation")
                .join("batch.db"),
        )
        .unwrap();
        let distinct: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT correlation_id) FROM prompt_responses",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(distinct, 3);
        drop(db);
    }
}
