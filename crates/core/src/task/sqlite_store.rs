//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{check_update, LogEntry, Stage, TaskError, TaskRecord, TaskStatus, TaskStore};

const COLUMNS: &str = "id, entity_id, stage, provider_id, task_id, status, video_url, thumbnail_url, local_ref, error, created_at, updated_at, logs, poller_session, resumed_at";

fn db_err(e: rusqlite::Error) -> TaskError {
    TaskError::Database(e.to_string())
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS task_records (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                status TEXT NOT NULL,
                video_url TEXT,
                thumbnail_url TEXT,
                local_ref TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                logs TEXT NOT NULL DEFAULT '[]',
                poller_session TEXT,
                resumed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_task_records_entity ON task_records(entity_id, stage);
            CREATE INDEX IF NOT EXISTS idx_task_records_status ON task_records(status);
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
        let stage: String = row.get(2)?;
        let status: String = row.get(5)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;
        let logs_json: String = row.get(12)?;
        let resumed_at: Option<String> = row.get(14)?;

        let id: String = row.get(0)?;

        let logs: Vec<LogEntry> = match serde_json::from_str(&logs_json) {
            Ok(logs) => logs,
            Err(e) => {
                warn!(record_id = %id, error = %e, "Discarding unreadable task logs");
                Vec::new()
            }
        };

        Ok(TaskRecord {
            id,
            entity_id: row.get(1)?,
            // Unknown text only comes from a foreign writer
            stage: Stage::parse(&stage).unwrap_or(Stage::Base),
            provider_id: row.get(3)?,
            task_id: row.get(4)?,
            status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
            video_url: row.get(6)?,
            thumbnail_url: row.get(7)?,
            local_ref: row.get(8)?,
            error: row.get(9)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            logs,
            poller_session: row.get(13)?,
            resumed_at: resumed_at.as_deref().map(parse_timestamp),
        })
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, Self::row_to_record)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn query_one(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<TaskRecord>, TaskError> {
        conn.query_row(sql, params, Self::row_to_record)
            .optional()
            .map_err(db_err)
    }
}

impl TaskStore for SqliteTaskStore {
    fn load_latest(
        &self,
        entity_id: &str,
        stage: Option<Stage>,
    ) -> Result<Option<TaskRecord>, TaskError> {
        let conn = self.lock()?;
        match stage {
            Some(stage) => Self::query_one(
                &conn,
                &format!(
                    "SELECT {} FROM task_records WHERE entity_id = ? AND stage = ? ORDER BY rowid DESC LIMIT 1",
                    COLUMNS
                ),
                params![entity_id, stage.as_str()],
            ),
            None => Self::query_one(
                &conn,
                &format!(
                    "SELECT {} FROM task_records WHERE entity_id = ? ORDER BY rowid DESC LIMIT 1",
                    COLUMNS
                ),
                params![entity_id],
            ),
        }
    }

    fn load_in_progress(&self, entity_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!(
                "SELECT {} FROM task_records WHERE entity_id = ? AND status = 'in_progress' ORDER BY rowid DESC LIMIT 1",
                COLUMNS
            ),
            params![entity_id],
        )
    }

    fn save(&self, record: &TaskRecord) -> Result<(), TaskError> {
        let logs_json =
            serde_json::to_string(&record.logs).map_err(|e| TaskError::Database(e.to_string()))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let existing = Self::query_one(
            &tx,
            &format!("SELECT {} FROM task_records WHERE id = ?", COLUMNS),
            params![record.id],
        )?;
        if let Some(current) = &existing {
            check_update(current, record)?;
        }

        if record.status == TaskStatus::InProgress {
            let other: Option<String> = tx
                .query_row(
                    "SELECT id FROM task_records WHERE entity_id = ? AND status = 'in_progress' AND id != ? LIMIT 1",
                    params![record.entity_id, record.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if let Some(other) = other {
                return Err(TaskError::InvalidState {
                    record_id: record.id.clone(),
                    current_state: format!("entity {} already has {} in progress", record.entity_id, other),
                    operation: "save".to_string(),
                });
            }
        }

        tx.execute(
            &format!(
                "INSERT INTO task_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    video_url = excluded.video_url,
                    thumbnail_url = excluded.thumbnail_url,
                    local_ref = excluded.local_ref,
                    error = excluded.error,
                    updated_at = excluded.updated_at,
                    logs = excluded.logs,
                    poller_session = excluded.poller_session,
                    resumed_at = excluded.resumed_at",
                COLUMNS
            ),
            params![
                record.id,
                record.entity_id,
                record.stage.as_str(),
                record.provider_id,
                record.task_id,
                record.status.as_str(),
                record.video_url,
                record.thumbnail_url,
                record.local_ref,
                record.error,
                timestamp(&record.created_at),
                timestamp(&record.updated_at),
                logs_json,
                record.poller_session,
                record.resumed_at.as_ref().map(timestamp),
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn get(&self, id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!("SELECT {} FROM task_records WHERE id = ?", COLUMNS),
            params![id],
        )
    }

    fn list_for_entity(&self, entity_id: &str) -> Result<Vec<TaskRecord>, TaskError> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "SELECT {} FROM task_records WHERE entity_id = ? ORDER BY rowid DESC",
                COLUMNS
            ),
            params![entity_id],
        )
    }

    fn list_in_progress(&self) -> Result<Vec<TaskRecord>, TaskError> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "SELECT {} FROM task_records WHERE status = 'in_progress' ORDER BY rowid ASC",
                COLUMNS
            ),
            params![],
        )
    }
}
