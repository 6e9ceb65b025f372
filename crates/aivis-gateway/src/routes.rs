//! API route handlers for the gateway.
//!
//! Request/response schemas are explicit structs validated at the
//! boundary; transient idempotency outcomes (already ran, claim lost)
//! come back as 200 no-ops so cron infrastructure never sees failures
//! for normal short-circuits.

use std::sync::Arc;

use aivis_core::error::AivisError;
use aivis_scheduler::{secret_sync, TriggerSource};
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::server::AppState;

/// Body of a daily-trigger invocation. All fields optional — a plain
/// cron POST with no body is the common case.
#[derive(Debug, Default, Deserialize)]
pub struct DailyTriggerRequest {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub trigger_source: Option<TriggerSource>,
}

#[derive(Debug, Serialize)]
pub struct DailyTriggerResponse {
    pub success: bool,
    pub message: String,
    pub date: String,
    pub total_runs: u32,
    pub organizations_processed: u32,
}

#[derive(Debug, Serialize)]
pub struct RecoveryResponse {
    pub success: bool,
    pub total_organizations: u32,
    pub successful_triggers: u32,
    pub failed_triggers: u32,
    pub results: Vec<aivis_scheduler::OrgRecoveryResult>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub last_daily_run_key: Option<String>,
    pub last_daily_run_at: Option<String>,
    pub status: &'static str,
}

// ── Helpers ─────────────────────────────────────────────────

/// Does the presented X-Cron-Secret match the expected one?
/// Settings store wins over config; no configured secret rejects everyone.
pub(crate) fn cron_secret_matches(
    state: &AppState,
    presented: &str,
) -> aivis_core::error::Result<bool> {
    let expected =
        secret_sync::resolve_cron_secret(&state.db, &state.config.auth.resolve_cron_secret())?;
    Ok(!expected.is_empty() && presented == expected)
}

pub(crate) fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": msg})),
    )
        .into_response()
}

fn bad_request(msg: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": msg})),
    )
        .into_response()
}

/// Map pipeline errors to HTTP. Store and enumeration failures are 5xx;
/// retry is the next cron tick or guardian poll, never this process.
pub(crate) fn error_response(e: AivisError) -> Response {
    let status = match &e {
        AivisError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"success": false, "error": e.to_string()})),
    )
        .into_response()
}

// ── Handlers ────────────────────────────────────────────────

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "aivis-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Daily trigger — cron, guardian, or operator entry point.
/// Forced calls must present the cron secret; the check happens before
/// any scheduler state is read.
pub async fn daily_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: DailyTriggerRequest = if body.is_empty() {
        DailyTriggerRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return bad_request(&format!("invalid trigger body: {e}")),
        }
    };

    if req.force {
        let presented = headers
            .get("X-Cron-Secret")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        match cron_secret_matches(&state, presented) {
            Ok(true) => {}
            Ok(false) => return unauthorized("forced runs require a valid cron secret"),
            Err(e) => return error_response(e),
        }
    }

    let source = req.trigger_source.unwrap_or(TriggerSource::Cron);
    match state.trigger.run(req.force, source).await {
        Ok(outcome) => Json(DailyTriggerResponse {
            success: true,
            message: outcome.message,
            date: outcome.day_key,
            total_runs: outcome.total_runs,
            organizations_processed: outcome.organizations_processed,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Guardian A — execution monitor poll.
pub async fn monitor_check(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.check().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

/// Guardian B — prompt-execution guardian poll.
pub async fn prompt_guardian_check(State(state): State<Arc<AppState>>) -> Response {
    match state.prompt_guardian.check().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

/// Operator-invoked full replay.
pub async fn manual_recover(State(state): State<Arc<AppState>>) -> Response {
    match state.recovery.run().await {
        Ok(report) => Json(RecoveryResponse {
            success: report.failed_triggers == 0,
            total_organizations: report.total_organizations,
            successful_triggers: report.successful_triggers,
            failed_triggers: report.failed_triggers,
            results: report.results,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Read-only scheduler status for the dashboard.
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Response {
    let scheduler_state = match state.db.scheduler_state() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let now = Utc::now();
    let calendar = state.trigger.calendar();
    let today = calendar.day_key(now);
    let status = match &scheduler_state.last_daily_run_key {
        Some(key) if *key == today => "current",
        Some(_) if calendar.is_past_cutoff(now) => "overdue",
        Some(_) => "pending",
        None => "never_ran",
    };

    Json(StatusResponse {
        last_daily_run_key: scheduler_state.last_daily_run_key,
        last_daily_run_at: scheduler_state.last_daily_run_at.map(|t| t.to_rfc3339()),
        status,
    })
    .into_response()
}

/// Copy the configured cron secret into the settings store.
pub async fn sync_secret(State(state): State<Arc<AppState>>) -> Response {
    let secret = state.config.auth.resolve_cron_secret();
    match secret_sync::sync_cron_secret(&state.db, &secret) {
        Ok(outcome) => Json(json!({"success": true, "message": outcome.message})).into_response(),
        Err(e) => error_response(e),
    }
}
