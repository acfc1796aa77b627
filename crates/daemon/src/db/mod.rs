use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use engine::composition::RenderState;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

/// One submitted render task, kept past session resets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionRecord {
    pub task_id: String,
    pub session_id: Uuid,
    pub run_id: Uuid,
    pub status: RenderState,
    pub progress: f32,
    pub current_step: Option<String>,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompositionRecord {
    pub fn new(task_id: impl Into<String>, session_id: Uuid, run_id: Uuid) -> Self {
        let now = Utc::now();
        CompositionRecord {
            task_id: task_id.into(),
            session_id,
            run_id,
            status: RenderState::Queued,
            progress: 0.0,
            current_step: None,
            result_urls: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let invalid = |idx: usize| {
            rusqlite::Error::InvalidColumnType(idx, "TEXT".to_string(), rusqlite::types::Type::Text)
        };
        let session_id: String = row.get(1)?;
        let run_id: String = row.get(2)?;
        let status: String = row.get(3)?;
        let result_urls_json: String = row.get(6)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(CompositionRecord {
            task_id: row.get(0)?,
            session_id: Uuid::parse_str(&session_id).map_err(|_| invalid(1))?,
            run_id: Uuid::parse_str(&run_id).map_err(|_| invalid(2))?,
            status: serde_json::from_str(&status).map_err(|_| invalid(3))?,
            progress: row.get::<_, f64>(4)? as f32,
            current_step: row.get(5)?,
            result_urls: serde_json::from_str(&result_urls_json).map_err(|_| invalid(6))?,
            error: row.get(7)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|_| invalid(8))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|_| invalid(9))?
                .with_timezone(&Utc),
        })
    }
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS compositions (
                task_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                current_step TEXT,
                result_urls_json TEXT NOT NULL DEFAULT '[]',
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_compositions_session ON compositions(session_id)",
            [],
        )?;
        Ok(())
    }

    /// Insert a record or update the mutable columns of an existing one.
    pub fn upsert_composition(&self, record: &CompositionRecord) -> Result<()> {
        let status = serde_json::to_string(&record.status)?;
        let result_urls = serde_json::to_string(&record.result_urls)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO compositions
                (task_id, session_id, run_id, status, progress, current_step, result_urls_json, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(task_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                current_step = excluded.current_step,
                result_urls_json = excluded.result_urls_json,
                error = excluded.error,
                updated_at = excluded.updated_at",
            params![
                record.task_id,
                record.session_id.to_string(),
                record.run_id.to_string(),
                status,
                record.progress as f64,
                record.current_step,
                result_urls,
                record.error,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn mark_composition_failed(&self, task_id: &str, error: &str) -> Result<()> {
        let status = serde_json::to_string(&RenderState::Failed)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE compositions SET status = ?1, error = ?2, updated_at = ?3 WHERE task_id = ?4",
            params![status, error, Utc::now().to_rfc3339(), task_id],
        )?;
        Ok(())
    }

    pub fn get_composition(&self, task_id: &str) -> Result<Option<CompositionRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT task_id, session_id, run_id, status, progress, current_step, result_urls_json, error, created_at, updated_at
                 FROM compositions WHERE task_id = ?1",
                params![task_id],
                CompositionRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_compositions_for_session(&self, session_id: Uuid) -> Result<Vec<CompositionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, session_id, run_id, status, progress, current_step, result_urls_json, error, created_at, updated_at
             FROM compositions WHERE session_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], CompositionRecord::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_update_keeps_created_at() {
        let db = Database::open_in_memory().unwrap();
        let session = Uuid::new_v4();
        let mut record = CompositionRecord::new("task-9", session, Uuid::new_v4());
        db.upsert_composition(&record).unwrap();

        record.status = RenderState::Completed;
        record.progress = 100.0;
        record.result_urls = vec!["https://cdn.test/final.mp4".into()];
        record.updated_at = Utc::now();
        db.upsert_composition(&record).unwrap();

        let stored = db.get_composition("task-9").unwrap().unwrap();
        assert_eq!(stored.status, RenderState::Completed);
        assert_eq!(stored.result_urls, vec!["https://cdn.test/final.mp4"]);
        assert_eq!(stored.created_at.timestamp(), record.created_at.timestamp());
        assert_eq!(db.list_compositions_for_session(session).unwrap().len(), 1);
    }

    #[test]
    fn failure_is_recorded() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_composition(&CompositionRecord::new("task-1", Uuid::new_v4(), Uuid::new_v4()))
            .unwrap();
        db.mark_composition_failed("task-1", "encoder crashed").unwrap();

        let stored = db.get_composition("task-1").unwrap().unwrap();
        assert_eq!(stored.status, RenderState::Failed);
        assert_eq!(stored.error.as_deref(), Some("encoder crashed"));
        assert!(db.get_composition("missing").unwrap().is_none());
    }

    #[test]
    fn database_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prep.db");
        Database::new(&path).unwrap();
        assert!(path.exists());
    }
}
