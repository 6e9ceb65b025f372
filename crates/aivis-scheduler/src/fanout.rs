//! Batch fan-out — dispatches one execution unit per (organization ×
//! prompt × engine) and records every outcome in the response log.
//!
//! Best-effort by design: a failing unit is logged and counted, never
//! aborts the batch. Only enumeration failure (cannot list organizations,
//! prompts, or engines) fails a run.

use std::sync::Arc;
use std::time::Duration;

use aivis_core::error::Result;
use aivis_providers::EnginePool;
use aivis_store::{AnswerEngineRow, BatchDb, Organization, Prompt};
use futures::StreamExt;

/// Outcome of one organization's slice of the batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrgRunResult {
    pub org_id: String,
    pub org_name: String,
    pub units: u32,
    pub failed_units: u32,
}

/// Aggregate outcome of a full fan-out.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FanOutReport {
    pub day_key: String,
    pub total_runs: u32,
    pub organizations_processed: u32,
    pub failed_units: u32,
    pub per_org: Vec<OrgRunResult>,
}

/// Executes the daily (org × prompt × engine) cross product.
pub struct FanOutExecutor {
    db: Arc<BatchDb>,
    pool: Arc<EnginePool>,
    /// Max in-flight units; keeps engine rate limits sane.
    concurrency: usize,
    /// Units exceeding this are abandoned and counted as failed.
    unit_timeout: Duration,
}

impl FanOutExecutor {
    pub fn new(
        db: Arc<BatchDb>,
        pool: Arc<EnginePool>,
        concurrency: usize,
        unit_timeout: Duration,
    ) -> Self {
        Self {
            db,
            pool,
            concurrency: concurrency.max(1),
            unit_timeout,
        }
    }

    /// Run the full batch for a claimed day-key.
    pub async fn run(&self, day_key: &str) -> Result<FanOutReport> {
        let orgs = self.db.list_active_organizations()?;
        tracing::info!("🚀 Fan-out for {}: {} organization(s)", day_key, orgs.len());

        let mut report = FanOutReport {
            day_key: day_key.to_string(),
            total_runs: 0,
            organizations_processed: 0,
            failed_units: 0,
            per_org: Vec::with_capacity(orgs.len()),
        };

        for org in &orgs {
            let result = self.run_for_org(org, day_key, day_key).await?;
            report.total_runs += result.units;
            report.failed_units += result.failed_units;
            report.organizations_processed += 1;
            report.per_org.push(result);
        }

        tracing::info!(
            "✅ Fan-out done for {}: {} unit(s), {} failed, {} org(s)",
            day_key,
            report.total_runs,
            report.failed_units,
            report.organizations_processed
        );
        Ok(report)
    }

    /// Run one organization's prompts against every enabled engine.
    /// Used by the daily run and, with a fresh correlation id, by manual
    /// recovery.
    pub async fn run_for_org(
        &self,
        org: &Organization,
        day_key: &str,
        correlation_id: &str,
    ) -> Result<OrgRunResult> {
        let prompts = self.db.active_prompts(&org.id)?;
        let engines = self.db.enabled_engines()?;

        let units: Vec<(Prompt, AnswerEngineRow)> = prompts
            .iter()
            .flat_map(|p| engines.iter().map(move |e| (p.clone(), e.clone())))
            .collect();

        let total = units.len() as u32;
        let outcomes: Vec<bool> = futures::stream::iter(
            units
                .into_iter()
                .map(|(prompt, engine)| self.dispatch_unit(org, prompt, engine, day_key, correlation_id)),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let failed = outcomes.iter().filter(|ok| !**ok).count() as u32;
        if failed > 0 {
            tracing::warn!(
                "⚠️ Org '{}': {}/{} unit(s) failed",
                org.name,
                failed,
                total
            );
        }

        Ok(OrgRunResult {
            org_id: org.id.clone(),
            org_name: org.name.clone(),
            units: total,
            failed_units: failed,
        })
    }

    /// One (org, prompt, engine) unit: ask the engine, record the outcome.
    /// Returns whether the unit succeeded.
    async fn dispatch_unit(
        &self,
        org: &Organization,
        prompt: Prompt,
        engine: AnswerEngineRow,
        day_key: &str,
        correlation_id: &str,
    ) -> bool {
        let outcome = match self.pool.get(&engine.name) {
            Ok(client) => {
                match tokio::time::timeout(self.unit_timeout, client.ask(&prompt.text, &engine.model))
                    .await
                {
                    Ok(Ok(answer)) => Ok(answer),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", self.unit_timeout)),
                }
            }
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(answer) => {
                if let Err(e) = self.db.record_response(
                    &org.id,
                    &prompt.id,
                    &engine.name,
                    day_key,
                    correlation_id,
                    "ok",
                    Some(&answer),
                    None,
                ) {
                    tracing::warn!("⚠️ Failed to record response for '{}': {e}", prompt.id);
                }
                true
            }
            Err(err) => {
                tracing::warn!(
                    "⚠️ Unit failed (org={}, prompt={}, engine={}): {}",
                    org.id,
                    prompt.id,
                    engine.name,
                    err
                );
                if let Err(e) = self.db.record_response(
                    &org.id,
                    &prompt.id,
                    &engine.name,
                    day_key,
                    correlation_id,
                    "error",
                    None,
                    Some(&err),
                ) {
                    tracing::warn!("⚠️ Failed to record failure for '{}': {e}", prompt.id);
                }
                false
            }
        }
    }
}
