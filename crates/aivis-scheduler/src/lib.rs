//! # Aivis Scheduler
//!
//! Daily batch scheduling, idempotency, and multi-tier recovery.
//! Each entry point is a stateless handler; the only synchronization
//! primitive in the whole subsystem is the conditional day-key claim in
//! the store.
//!
//! ## Architecture
//! ```text
//! external cron ──▶ DailyTrigger
//!                     ├── day_key = BusinessCalendar::day_key(now)
//!                     ├── claim_day(day_key)  ◀── the CAS that makes it all idempotent
//!                     └── on win → FanOutExecutor
//!                                    └── per (org × prompt × engine): ask + record
//!
//! hourly cron ──▶ ExecutionMonitor ────┐  (signal: completed run log)
//! hourly cron ──▶ PromptExecutionGuardian ┘  (signal: raw response log)
//!                     └── on 25h silence → DailyTrigger{force} (same CAS)
//!
//! operator ──▶ ManualRecovery — no claim, full per-org replay
//! ```

pub mod calendar;
pub mod fanout;
pub mod guardian;
pub mod recovery;
pub mod secret_sync;
pub mod trigger;

pub use calendar::BusinessCalendar;
pub use fanout::{FanOutExecutor, FanOutReport, OrgRunResult};
pub use guardian::{ExecutionMonitor, GuardianReport, GuardianStatus, PromptExecutionGuardian};
pub use recovery::{ManualRecovery, OrgRecoveryResult, RecoveryReport};
pub use secret_sync::{sync_cron_secret, SyncOutcome, CRON_SECRET_KEY};
pub use trigger::{DailyTrigger, TriggerOutcome, TriggerSource, DAILY_TRIGGER_FN};
