//! HTTP server implementation using Axum.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aivis_core::config::AivisConfig;
use aivis_core::error::Result;
use aivis_providers::EnginePool;
use aivis_scheduler::{
    BusinessCalendar, DailyTrigger, ExecutionMonitor, FanOutExecutor, ManualRecovery,
    PromptExecutionGuardian,
};
use aivis_store::BatchDb;
use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
pub struct AppState {
    pub config: AivisConfig,
    pub db: Arc<BatchDb>,
    /// The daily batch trigger — every scheduled/forced/manual invocation
    /// funnels through it.
    pub trigger: Arc<DailyTrigger>,
    /// Guardian A — run-log signal.
    pub monitor: ExecutionMonitor,
    /// Guardian B — response-log signal.
    pub prompt_guardian: PromptExecutionGuardian,
    /// Operator replay path, no claim check.
    pub recovery: ManualRecovery,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the full pipeline over one database.
    pub fn build(config: AivisConfig, db: Arc<BatchDb>) -> Result<Self> {
        let calendar =
            BusinessCalendar::new(&config.scheduler.timezone, config.scheduler.cutoff_hour)?;

        let engine_names: Vec<String> = db
            .enabled_engines()?
            .into_iter()
            .map(|e| e.name)
            .collect();
        let pool = Arc::new(EnginePool::build(&engine_names, &config.engines));
        if pool.is_empty() {
            tracing::warn!("⚠️ No answer engines enabled — fan-outs will dispatch zero units");
        }

        let executor = Arc::new(FanOutExecutor::new(
            db.clone(),
            pool,
            config.scheduler.batch_concurrency,
            Duration::from_secs(config.scheduler.unit_timeout_secs),
        ));
        let trigger = Arc::new(DailyTrigger::new(
            db.clone(),
            calendar.clone(),
            executor.clone(),
        ));
        let window = config.scheduler.guardian_window_hours;
        let monitor = ExecutionMonitor::new(db.clone(), trigger.clone(), window);
        let prompt_guardian = PromptExecutionGuardian::new(db.clone(), trigger.clone(), window);
        let recovery = ManualRecovery::new(
            db.clone(),
            calendar,
            executor,
            Duration::from_millis(config.scheduler.recovery_org_delay_ms),
        );

        Ok(Self {
            config,
            db,
            trigger,
            monitor,
            prompt_guardian,
            recovery,
            start_time: std::time::Instant::now(),
        })
    }
}

/// Cron-secret middleware — validates X-Cron-Secret before any state is
/// touched. The expected value comes from the settings store (synced),
/// falling back to config before the first sync.
async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let presented = req
        .headers()
        .get("X-Cron-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match super::routes::cron_secret_matches(&state, presented) {
        Ok(true) => next.run(req).await,
        Ok(false) => super::routes::unauthorized("invalid or missing cron secret"),
        Err(e) => super::routes::error_response(e),
    }
}

/// Admin bearer-token middleware for operator endpoints.
async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let expected = state.config.auth.resolve_admin_token();
    let presented = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if expected.is_empty() || presented != expected {
        return super::routes::unauthorized("invalid or missing admin token");
    }
    next.run(req).await
}

/// Build the Axum router with all routes.
pub fn build_router(shared: Arc<AppState>) -> Router {
    // Guardian routes — cron-secret auth, rejected before any state read
    let guarded = Router::new()
        .route("/api/v1/batch/monitor", post(super::routes::monitor_check))
        .route(
            "/api/v1/batch/prompt-guardian",
            post(super::routes::prompt_guardian_check),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_cron_secret,
        ));

    // Operator routes — bearer admin token
    let admin = Router::new()
        .route("/api/v1/batch/recover", post(super::routes::manual_recover))
        .route("/api/v1/batch/sync-secret", post(super::routes::sync_secret))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_admin_token,
        ));

    // Open routes — the daily trigger authenticates forced calls itself;
    // status and health are read-only
    let open = Router::new()
        .route(
            "/api/v1/batch/daily-trigger",
            post(super::routes::daily_trigger),
        )
        .route("/api/v1/batch/status", get(super::routes::scheduler_status))
        .route("/health", get(super::routes::health_check));

    guarded
        .merge(admin)
        .merge(open)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Restrict CORS origins in production via env var
            // Example: AIVIS_CORS_ORIGINS=https://app.aivis.io,https://staging.aivis.io
            if let Ok(origins_str) = std::env::var("AIVIS_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                // Development fallback — allow all origins
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(config: AivisConfig, db_path: &Path) -> Result<()> {
    let db = Arc::new(BatchDb::open(db_path)?);
    let state = Arc::new(AppState::build(config.clone(), db)?);
    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| aivis_core::error::AivisError::Http(format!("Bind {addr} failed: {e}")))?;

    tracing::info!("🌐 Aivis gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| aivis_core::error::AivisError::Http(format!("Server error: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(name: &str) -> (Arc<AppState>, Router) {
        let dir = std::env::temp_dir().join(format!("aivis-gateway-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let db = Arc::new(BatchDb::open(&dir.join("batch.db")).unwrap());

        let mut config = AivisConfig::default();
        config.auth.cron_secret = "topsecret".into();
        config.auth.admin_token = "admintoken".into();
        config.scheduler.recovery_org_delay_ms = 0;

        let state = Arc::new(AppState::build(config, db).unwrap());
        let router = build_router(state.clone());
        (state, router)
    }

    async fn send(router: &Router, req: Request<Body>) -> axum::response::Response {
        router.clone().oneshot(req).await.unwrap()
    }

    fn post(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("POST").uri(uri)
    }

    #[tokio::test]
    async fn test_monitor_rejects_missing_secret() {
        let (_state, router) = test_router("monitor-401");
        let resp = send(&router, post("/api/v1/batch/monitor").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send(
            &router,
            post("/api/v1/batch/monitor")
                .header("X-Cron-Secret", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_monitor_accepts_valid_secret() {
        let (_state, router) = test_router("monitor-200");
        let resp = send(
            &router,
            post("/api/v1/batch/monitor")
                .header("X-Cron-Secret", "topsecret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        // Empty db, no runs: silence → the guardian forces a recovery run.
        assert_eq!(v["status"], "recovery_triggered");
        assert_eq!(v["guardian"], "execution-monitor");
    }

    #[tokio::test]
    async fn test_forced_trigger_requires_secret() {
        let (_state, router) = test_router("forced-401");
        let resp = send(
            &router,
            post("/api/v1/batch/daily-trigger")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"force": true}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unforced_trigger_needs_no_secret() {
        let (state, router) = test_router("unforced-200");
        let resp = send(
            &router,
            post("/api/v1/batch/daily-trigger").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["organizations_processed"], 0); // empty catalog

        // The claim was recorded — a second call short-circuits.
        let state_row = state.db.scheduler_state().unwrap();
        assert!(state_row.last_daily_run_key.is_some());
        let resp = send(
            &router,
            post("/api/v1/batch/daily-trigger").body(Body::empty()).unwrap(),
        )
        .await;
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["message"], "already ran today");
    }

    #[tokio::test]
    async fn test_malformed_trigger_body_is_400() {
        let (_state, router) = test_router("bad-body");
        let resp = send(
            &router,
            post("/api/v1/batch/daily-trigger")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"force": "yes please"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recover_requires_bearer_token() {
        let (_state, router) = test_router("recover-auth");
        let resp = send(&router, post("/api/v1/batch/recover").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send(
            &router,
            post("/api/v1/batch/recover")
                .header("Authorization", "Bearer admintoken")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_shape() {
        let (_state, router) = test_router("status");
        let resp = send(
            &router,
            Request::builder()
                .uri("/api/v1/batch/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["status"], "never_ran");
        assert!(v["last_daily_run_key"].is_null());
    }

    #[tokio::test]
    async fn test_sync_secret_then_rotated_auth() {
        let (state, router) = test_router("sync-secret");
        let resp = send(
            &router,
            post("/api/v1/batch/sync-secret")
                .header("Authorization", "Bearer admintoken")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state.db.get_setting("cron_secret").unwrap().as_deref(),
            Some("topsecret")
        );
    }
}
