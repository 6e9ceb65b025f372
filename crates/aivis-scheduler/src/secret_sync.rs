//! Cron-secret sync — keeps the secret the scheduling environment sends
//! and the secret the backend validates in agreement.
//!
//! The configured value (env var or config file) is the authoritative
//! copy; this copies it into the settings store the gateway's auth check
//! reads. Idempotent upsert, no state machine.

use aivis_core::error::{AivisError, Result};
use aivis_store::BatchDb;
use serde::Serialize;

/// Settings key the gateway validates guardian/cron calls against.
pub const CRON_SECRET_KEY: &str = "cron_secret";

/// Outcome of one sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub changed: bool,
    pub message: String,
}

/// Copy the configured cron secret into the settings store.
pub fn sync_cron_secret(db: &BatchDb, secret: &str) -> Result<SyncOutcome> {
    if secret.is_empty() {
        return Err(AivisError::Config(
            "No cron secret configured — set AIVIS_CRON_SECRET or [auth].cron_secret".into(),
        ));
    }

    let current = db.get_setting(CRON_SECRET_KEY)?;
    if current.as_deref() == Some(secret) {
        return Ok(SyncOutcome {
            changed: false,
            message: "cron secret already in sync".into(),
        });
    }

    db.put_setting(CRON_SECRET_KEY, secret)?;
    tracing::info!("🔑 Cron secret synced into settings store");
    Ok(SyncOutcome {
        changed: true,
        message: "cron secret updated".into(),
    })
}

/// The secret guardian/cron callers must present. Settings store wins so a
/// synced rotation takes effect without a restart; config is the fallback
/// before the first sync.
pub fn resolve_cron_secret(db: &BatchDb, config_secret: &str) -> Result<String> {
    match db.get_setting(CRON_SECRET_KEY)? {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Ok(config_secret.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> BatchDb {
        let dir = std::env::temp_dir().join(format!("aivis-secret-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        BatchDb::open(&dir.join("batch.db")).unwrap()
    }

    #[test]
    fn test_sync_then_resync_idempotent() {
        let db = temp_db("idempotent");
        let first = sync_cron_secret(&db, "s3cret").unwrap();
        assert!(first.changed);
        let second = sync_cron_secret(&db, "s3cret").unwrap();
        assert!(!second.changed);
        assert_eq!(resolve_cron_secret(&db, "fallback").unwrap(), "s3cret");
    }

    #[test]
    fn test_rotation_updates_store() {
        let db = temp_db("rotation");
        sync_cron_secret(&db, "old").unwrap();
        let out = sync_cron_secret(&db, "new").unwrap();
        assert!(out.changed);
        assert_eq!(resolve_cron_secret(&db, "fallback").unwrap(), "new");
    }

    #[test]
    fn test_empty_secret_rejected() {
        let db = temp_db("empty");
        assert!(sync_cron_secret(&db, "").is_err());
    }

    #[test]
    fn test_resolve_falls_back_to_config() {
        let db = temp_db("fallback");
        assert_eq!(resolve_cron_secret(&db, "from-config").unwrap(), "from-config");
    }
}
