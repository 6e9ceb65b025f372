//! Catalog — organizations, their tracked prompts, and the answer engines
//! the fan-out queries. Read as a snapshot at fan-out start; concurrent
//! edits mid-run are acceptable staleness.

use aivis_core::error::{AivisError, Result};
use rusqlite::params;

use crate::db::BatchDb;

/// An organization tracking its brand visibility.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// A prompt an organization tracks ("best CRM for startups?").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Prompt {
    pub id: String,
    pub org_id: String,
    pub text: String,
    pub active: bool,
}

/// An enabled answer engine (system-wide, not per org).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnswerEngineRow {
    pub name: String,
    pub model: String,
    pub enabled: bool,
}

impl BatchDb {
    /// All active organizations. Enumeration failure here aborts a run.
    pub fn list_active_organizations(&self) -> Result<Vec<Organization>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, active FROM organizations WHERE active = 1 ORDER BY id")
            .map_err(|e| AivisError::Store(format!("Org query error: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Organization {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get::<_, i64>(2)? != 0,
                })
            })
            .map_err(|e| AivisError::Store(format!("Org query error: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AivisError::Store(format!("Org row error: {e}")))
    }

    /// Active prompts for one organization.
    pub fn active_prompts(&self, org_id: &str) -> Result<Vec<Prompt>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT id, org_id, text, active FROM prompts WHERE org_id = ?1 AND active = 1 ORDER BY id")
            .map_err(|e| AivisError::Store(format!("Prompt query error: {e}")))?;
        let rows = stmt
            .query_map([org_id], |row| {
                Ok(Prompt {
                    id: row.get(0)?,
                    org_id: row.get(1)?,
                    text: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                })
            })
            .map_err(|e| AivisError::Store(format!("Prompt query error: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AivisError::Store(format!("Prompt row error: {e}")))
    }

    /// Enabled answer engines, system-wide.
    pub fn enabled_engines(&self) -> Result<Vec<AnswerEngineRow>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT name, model, enabled FROM answer_engines WHERE enabled = 1 ORDER BY name")
            .map_err(|e| AivisError::Store(format!("Engine query error: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AnswerEngineRow {
                    name: row.get(0)?,
                    model: row.get(1)?,
                    enabled: row.get::<_, i64>(2)? != 0,
                })
            })
            .map_err(|e| AivisError::Store(format!("Engine query error: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AivisError::Store(format!("Engine row error: {e}")))
    }

    /// Create or update an organization.
    pub fn upsert_organization(&self, id: &str, name: &str, active: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO organizations (id, name, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, active = excluded.active",
            params![id, name, active as i64],
        )
        .map_err(|e| AivisError::Store(format!("Org write error: {e}")))?;
        Ok(())
    }

    /// Create or update a prompt.
    pub fn upsert_prompt(&self, id: &str, org_id: &str, text: &str, active: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO prompts (id, org_id, text, active) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET org_id = excluded.org_id, text = excluded.text, active = excluded.active",
            params![id, org_id, text, active as i64],
        )
        .map_err(|e| AivisError::Store(format!("Prompt write error: {e}")))?;
        Ok(())
    }

    /// Create or update an answer engine.
    pub fn upsert_engine(&self, name: &str, model: &str, enabled: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO answer_engines (name, model, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET model = excluded.model, enabled = excluded.enabled",
            params![name, model, enabled as i64],
        )
        .map_err(|e| AivisError::Store(format!("Engine write error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> BatchDb {
        let dir = std::env::temp_dir().join(format!("aivis-catalog-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        BatchDb::open(&dir.join("batch.db")).unwrap()
    }

    #[test]
    fn test_active_filtering() {
        let db = temp_db("active");
        db.upsert_organization("org-1", "Acme", true).unwrap();
        db.upsert_organization("org-2", "Paused Inc", false).unwrap();
        db.upsert_prompt("p-1", "org-1", "best CRM for startups?", true).unwrap();
        db.upsert_prompt("p-2", "org-1", "retired prompt", false).unwrap();
        db.upsert_engine("openai", "gpt-4o-mini", true).unwrap();
        db.upsert_engine("perplexity", "sonar", false).unwrap();

        let orgs = db.list_active_organizations().unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].id, "org-1");

        let prompts = db.active_prompts("org-1").unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].id, "p-1");

        let engines = db.enabled_engines().unwrap();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].name, "openai");
    }

    #[test]
    fn test_upsert_overwrites() {
        let db = temp_db("upsert");
        db.upsert_engine("openai", "gpt-4o-mini", true).unwrap();
        db.upsert_engine("openai", "gpt-4.1", true).unwrap();
        let engines = db.enabled_engines().unwrap();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].model, "gpt-4.1");
    }
}
