//! # Aivis Store
//!
//! SQLite persistence for the daily batch pipeline. One database file holds:
//! - the scheduler-state singleton row (the claim that makes the whole
//!   system idempotent — see [`BatchDb::claim_day`])
//! - the append-only run log (guardian signal A)
//! - the append-only response log (guardian signal B)
//! - the catalog of organizations, prompts, and answer engines the
//!   fan-out enumerates
//! - key-value settings (cron secret sync target)
//!
//! All coordination between concurrent invocations happens through the
//! conditional UPDATE in `claim_day`; nothing here relies on in-process
//! shared state surviving between calls.

pub mod catalog;
pub mod db;

pub use catalog::{AnswerEngineRow, Organization, Prompt};
pub use db::{BatchDb, RunStatus, SchedulerRun, SchedulerState};
