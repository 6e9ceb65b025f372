//! Aivis configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AivisConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
}

impl Default for AivisConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            engines: EnginesConfig::default(),
        }
    }
}

impl AivisConfig {
    /// Load config from the default path (~/.aivis/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AivisError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::AivisError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AivisError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aivis")
            .join("config.toml")
    }

    /// Get the Aivis home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aivis")
    }
}

/// Daily batch scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Business timezone for day-key computation. Fixed per deployment,
    /// never per tenant.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Local hour after which the daily batch is expected to have fired.
    #[serde(default = "default_cutoff_hour")]
    pub cutoff_hour: u32,
    /// Rolling window (hours) the guardians look back for a live signal.
    /// Longer than 24 to absorb clock and DST slack.
    #[serde(default = "default_guardian_window_hours")]
    pub guardian_window_hours: i64,
    /// Max in-flight execution units during fan-out.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Per-unit timeout (seconds) for answer-engine calls.
    #[serde(default = "default_unit_timeout_secs")]
    pub unit_timeout_secs: u64,
    /// Delay between organizations during manual recovery (milliseconds).
    #[serde(default = "default_recovery_org_delay_ms")]
    pub recovery_org_delay_ms: u64,
}

fn default_timezone() -> String {
    "America/New_York".into()
}
fn default_cutoff_hour() -> u32 {
    3
}
fn default_guardian_window_hours() -> i64 {
    25
}
fn default_batch_concurrency() -> usize {
    4
}
fn default_unit_timeout_secs() -> u64 {
    60
}
fn default_recovery_org_delay_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            cutoff_hour: default_cutoff_hour(),
            guardian_window_hours: default_guardian_window_hours(),
            batch_concurrency: default_batch_concurrency(),
            unit_timeout_secs: default_unit_timeout_secs(),
            recovery_org_delay_ms: default_recovery_org_delay_ms(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8642
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Authentication secrets for scheduled and operator calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret presented by cron/guardian callers (X-Cron-Secret).
    #[serde(default)]
    pub cron_secret: String,
    /// Bearer token for operator endpoints (manual recovery, secret sync).
    #[serde(default)]
    pub admin_token: String,
}

impl AuthConfig {
    /// Resolve the cron secret: env var wins over config file.
    pub fn resolve_cron_secret(&self) -> String {
        std::env::var("AIVIS_CRON_SECRET").unwrap_or_else(|_| self.cron_secret.clone())
    }

    /// Resolve the admin token: env var wins over config file.
    pub fn resolve_admin_token(&self) -> String {
        std::env::var("AIVIS_ADMIN_TOKEN").unwrap_or_else(|_| self.admin_token.clone())
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. "~" is not expanded here; the CLI does that.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.aivis/aivis.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Defaults for answer-engine clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Fallback API key when an engine has no env-provided key.
    #[serde(default)]
    pub api_key: String,
    /// Override endpoint, e.g. a proxy in front of all engines.
    #[serde(default)]
    pub endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AivisConfig::default();
        assert_eq!(cfg.scheduler.timezone, "America/New_York");
        assert_eq!(cfg.scheduler.cutoff_hour, 3);
        assert_eq!(cfg.scheduler.guardian_window_hours, 25);
        assert_eq!(cfg.gateway.port, 8642);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [scheduler]
            timezone = "America/New_York"
            batch_concurrency = 8

            [gateway]
            port = 9000
        "#;
        let cfg: AivisConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.scheduler.batch_concurrency, 8);
        assert_eq!(cfg.scheduler.guardian_window_hours, 25); // default fills in
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
    }

    #[test]
    fn test_roundtrip() {
        let cfg = AivisConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: AivisConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.scheduler.unit_timeout_secs, cfg.scheduler.unit_timeout_secs);
    }
}
