//! Batch database — scheduler state, run log, response log, settings.
//!
//! The scheduler-state row is the single mutable shared resource in the
//! pipeline. It is only ever written through the conditional UPDATE in
//! [`BatchDb::claim_day`]; callers must never read the key and write it
//! back in two steps, because concurrent invocations (duplicate cron fire,
//! guardian-forced run, manual trigger) are expected.

use aivis_core::error::{AivisError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Status of a run-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// The scheduler-state singleton.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerState {
    /// Day-key (YYYY-MM-DD, business timezone) of the last claimed run.
    pub last_daily_run_key: Option<String>,
    /// Wall-clock time of the claim.
    pub last_daily_run_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

/// One run-log entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerRun {
    pub id: i64,
    pub function_name: String,
    pub status: String,
    pub trigger_source: String,
    pub detail: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// Batch database — all pipeline persistence behind one SQLite file.
pub struct BatchDb {
    conn: Mutex<Connection>,
}

impl BatchDb {
    /// Open or create the batch database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AivisError::Store(format!("DB open error: {e}")))?;

        // WAL allows concurrent readers/writers across independent handles;
        // busy_timeout covers the short write-lock windows.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| AivisError::Store(format!("DB pragma error: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema migrations and bootstrap the state singleton.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "
            -- Singleton: the day-key claim record
            CREATE TABLE IF NOT EXISTS scheduler_state (
                id TEXT PRIMARY KEY CHECK (id = 'global'),
                last_daily_run_key TEXT,
                last_daily_run_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Append-only pipeline invocation log
            CREATE TABLE IF NOT EXISTS scheduler_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                function_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                trigger_source TEXT NOT NULL,
                detail TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            -- Append-only raw answer log, one row per execution unit
            CREATE TABLE IF NOT EXISTS prompt_responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                org_id TEXT NOT NULL,
                prompt_id TEXT NOT NULL,
                engine TEXT NOT NULL,
                day_key TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                status TEXT NOT NULL,            -- 'ok' | 'error'
                answer TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_created
                ON prompt_responses(created_at);

            -- Catalog consumed read-only by the fan-out
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                text TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_prompts_org ON prompts(org_id);

            CREATE TABLE IF NOT EXISTS answer_engines (
                name TEXT PRIMARY KEY,
                model TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS app_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL DEFAULT '',
                updated_at TEXT DEFAULT (datetime('now'))
            );
        ",
        )
        .map_err(|e| AivisError::Store(format!("Migration error: {e}")))?;

        // Bootstrap the singleton once; later opens are no-ops.
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO scheduler_state (id, last_daily_run_key, last_daily_run_at, created_at, updated_at)
             VALUES ('global', NULL, NULL, ?1, ?1)",
            [&now],
        )
        .map_err(|e| AivisError::Store(format!("State bootstrap error: {e}")))?;

        Ok(())
    }

    pub(crate) fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AivisError::Store(format!("DB lock poisoned: {e}")))
    }

    // ── Scheduler state ─────────────────────────────────────

    /// Read the scheduler-state singleton.
    pub fn scheduler_state(&self) -> Result<SchedulerState> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT last_daily_run_key, last_daily_run_at, created_at, updated_at
             FROM scheduler_state WHERE id = 'global'",
            [],
            |row| {
                let run_at: Option<String> = row.get(1)?;
                Ok(SchedulerState {
                    last_daily_run_key: row.get(0)?,
                    last_daily_run_at: run_at
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|d| d.with_timezone(&Utc)),
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .map_err(|e| AivisError::Store(format!("State read error: {e}")))
    }

    /// Atomically claim a day-key. Returns whether THIS caller won the claim.
    ///
    /// Single conditional UPDATE — the row only changes when the stored key
    /// differs from `day_key`, so N concurrent callers see exactly one
    /// `true`. A store error means "did not claim" to the caller.
    pub fn claim_day(&self, day_key: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock_conn()?;
        let changed = conn
            .execute(
                "UPDATE scheduler_state
                 SET last_daily_run_key = ?1, last_daily_run_at = ?2, updated_at = ?2
                 WHERE id = 'global'
                   AND (last_daily_run_key IS NULL OR last_daily_run_key <> ?1)",
                params![day_key, now.to_rfc3339()],
            )
            .map_err(|e| AivisError::Store(format!("Claim error: {e}")))?;
        Ok(changed == 1)
    }

    // ── Run log ─────────────────────────────────────────────

    /// Append a run-log entry in `running` state. Returns its id.
    pub fn begin_run(&self, function_name: &str, trigger_source: &str) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO scheduler_runs (function_name, status, trigger_source, started_at)
             VALUES (?1, 'running', ?2, ?3)",
            params![function_name, trigger_source, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AivisError::Store(format!("Run insert error: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalize a run-log entry. Entries are never touched again afterwards.
    pub fn finish_run(&self, run_id: i64, status: RunStatus, detail: Option<&str>) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE scheduler_runs SET status = ?1, detail = ?2, completed_at = ?3
             WHERE id = ?4 AND status = 'running'",
            params![status.as_str(), detail, Utc::now().to_rfc3339(), run_id],
        )
        .map_err(|e| AivisError::Store(format!("Run finalize error: {e}")))?;
        Ok(())
    }

    /// Is there a completed run of `function_name` within the window?
    /// Guardian signal A.
    pub fn has_completed_run_within(
        &self,
        function_name: &str,
        window: chrono::Duration,
    ) -> Result<bool> {
        let cutoff = (Utc::now() - window).to_rfc3339();
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM scheduler_runs
                 WHERE function_name = ?1 AND status = 'completed' AND completed_at >= ?2",
                params![function_name, cutoff],
                |row| row.get(0),
            )
            .map_err(|e| AivisError::Store(format!("Run query error: {e}")))?;
        Ok(count > 0)
    }

    /// Most recent run-log entries, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<SchedulerRun>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, function_name, status, trigger_source, detail, started_at, completed_at
                 FROM scheduler_runs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| AivisError::Store(format!("Run query error: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(SchedulerRun {
                    id: row.get(0)?,
                    function_name: row.get(1)?,
                    status: row.get(2)?,
                    trigger_source: row.get(3)?,
                    detail: row.get(4)?,
                    started_at: row.get(5)?,
                    completed_at: row.get(6)?,
                })
            })
            .map_err(|e| AivisError::Store(format!("Run query error: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── Response log ────────────────────────────────────────

    /// Append one execution-unit outcome to the response log.
    pub fn record_response(
        &self,
        org_id: &str,
        prompt_id: &str,
        engine: &str,
        day_key: &str,
        correlation_id: &str,
        status: &str,
        answer: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO prompt_responses
             (org_id, prompt_id, engine, day_key, correlation_id, status, answer, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                org_id,
                prompt_id,
                engine,
                day_key,
                correlation_id,
                status,
                answer,
                error,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AivisError::Store(format!("Response insert error: {e}")))?;
        Ok(())
    }

    /// Is there any response row within the window? Guardian signal B —
    /// catches runs that "completed" without producing a single answer.
    pub fn has_response_within(&self, window: chrono::Duration) -> Result<bool> {
        let cutoff = (Utc::now() - window).to_rfc3339();
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM prompt_responses WHERE created_at >= ?1",
                [cutoff],
                |row| row.get(0),
            )
            .map_err(|e| AivisError::Store(format!("Response query error: {e}")))?;
        Ok(count > 0)
    }

    /// Count response rows for a day-key (test and ops visibility).
    pub fn response_count_for_day(&self, day_key: &str) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM prompt_responses WHERE day_key = ?1",
            [day_key],
            |row| row.get(0),
        )
        .map_err(|e| AivisError::Store(format!("Response query error: {e}")))
    }

    // ── Settings ────────────────────────────────────────────

    /// Read a settings value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        match conn.query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            [key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AivisError::Store(format!("Setting read error: {e}"))),
        }
    }

    /// Upsert a settings value. Idempotent.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AivisError::Store(format!("Setting write error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> (std::path::PathBuf, BatchDb) {
        let dir = std::env::temp_dir().join(format!("aivis-store-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("batch.db");
        let db = BatchDb::open(&path).unwrap();
        (path, db)
    }

    #[test]
    fn test_state_bootstrap() {
        let (_path, db) = temp_db("bootstrap");
        let state = db.scheduler_state().unwrap();
        assert!(state.last_daily_run_key.is_none());
        assert!(state.last_daily_run_at.is_none());
    }

    #[test]
    fn test_claim_twice_same_key() {
        let (_path, db) = temp_db("claim-twice");
        let now = Utc::now();
        assert!(db.claim_day("2025-09-22", now).unwrap());
        assert!(!db.claim_day("2025-09-22", now).unwrap());

        let state = db.scheduler_state().unwrap();
        assert_eq!(state.last_daily_run_key.as_deref(), Some("2025-09-22"));
    }

    #[test]
    fn test_claim_next_day_succeeds() {
        let (_path, db) = temp_db("claim-next");
        assert!(db.claim_day("2025-09-22", Utc::now()).unwrap());
        assert!(db.claim_day("2025-09-23", Utc::now()).unwrap());
        assert!(!db.claim_day("2025-09-23", Utc::now()).unwrap());
    }

    #[test]
    fn test_claim_concurrent_single_winner() {
        // Independent handles on the same file — models concurrently
        // scheduled stateless invocations.
        let (path, _db) = temp_db("claim-concurrent");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = path.clone();
            handles.push(std::thread::spawn(move || {
                let db = BatchDb::open(&p).unwrap();
                db.claim_day("2025-09-22", Utc::now()).unwrap()
            }));
        }
        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_run_log_lifecycle() {
        let (_path, db) = temp_db("run-log");
        let id = db.begin_run("daily-batch-trigger", "cron").unwrap();
        assert!(!db
            .has_completed_run_within("daily-batch-trigger", chrono::Duration::hours(25))
            .unwrap());

        db.finish_run(id, RunStatus::Completed, Some("42 units")).unwrap();
        assert!(db
            .has_completed_run_within("daily-batch-trigger", chrono::Duration::hours(25))
            .unwrap());

        // Finalized entries stay finalized.
        db.finish_run(id, RunStatus::Failed, None).unwrap();
        let runs = db.recent_runs(10).unwrap();
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].detail.as_deref(), Some("42 units"));
    }

    #[test]
    fn test_failed_run_is_not_a_signal() {
        let (_path, db) = temp_db("run-failed");
        let id = db.begin_run("daily-batch-trigger", "cron").unwrap();
        db.finish_run(id, RunStatus::Failed, Some("boom")).unwrap();
        assert!(!db
            .has_completed_run_within("daily-batch-trigger", chrono::Duration::hours(25))
            .unwrap());
    }

    #[test]
    fn test_window_boundary_on_run_log() {
        // Completion 20h ago is inside the 25h window; 26h ago is not.
        let (path, db) = temp_db("run-window");
        let id = db.begin_run("daily-batch-trigger", "cron").unwrap();
        db.finish_run(id, RunStatus::Completed, None).unwrap();

        let backdate = |hours: i64| {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute(
                "UPDATE scheduler_runs SET completed_at = ?1 WHERE id = ?2",
                params![(Utc::now() - chrono::Duration::hours(hours)).to_rfc3339(), id],
            )
            .unwrap();
        };

        backdate(20);
        assert!(db
            .has_completed_run_within("daily-batch-trigger", chrono::Duration::hours(25))
            .unwrap());

        backdate(26);
        assert!(!db
            .has_completed_run_within("daily-batch-trigger", chrono::Duration::hours(25))
            .unwrap());
    }

    #[test]
    fn test_window_boundary_on_response_log() {
        let (path, db) = temp_db("response-window");
        db.record_response("org-1", "p-1", "openai", "2025-09-21", "c", "ok", Some("a"), None)
            .unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE prompt_responses SET created_at = ?1",
            [(Utc::now() - chrono::Duration::hours(26)).to_rfc3339()],
        )
        .unwrap();

        assert!(!db.has_response_within(chrono::Duration::hours(25)).unwrap());
        assert!(db.has_response_within(chrono::Duration::hours(27)).unwrap());
    }

    #[test]
    fn test_response_log() {
        let (_path, db) = temp_db("responses");
        assert!(!db.has_response_within(chrono::Duration::hours(25)).unwrap());

        db.record_response(
            "org-1", "prompt-1", "openai", "2025-09-22", "corr-1", "ok",
            Some("Acme is widely recommended"), None,
        )
        .unwrap();
        db.record_response(
            "org-1", "prompt-2", "openai", "2025-09-22", "corr-1", "error",
            None, Some("timeout"),
        )
        .unwrap();

        assert!(db.has_response_within(chrono::Duration::hours(25)).unwrap());
        assert_eq!(db.response_count_for_day("2025-09-22").unwrap(), 2);
    }

    #[test]
    fn test_settings_upsert_idempotent() {
        let (_path, db) = temp_db("settings");
        assert!(db.get_setting("cron_secret").unwrap().is_none());
        db.put_setting("cron_secret", "s3cret").unwrap();
        db.put_setting("cron_secret", "s3cret").unwrap();
        assert_eq!(db.get_setting("cron_secret").unwrap().as_deref(), Some("s3cret"));
        db.put_setting("cron_secret", "rotated").unwrap();
        assert_eq!(db.get_setting("cron_secret").unwrap().as_deref(), Some("rotated"));
    }
}
