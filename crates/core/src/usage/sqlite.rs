use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{UsageError, UsageEvent, UsageFilter, UsageRecord, UsageStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS usage_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        task_id TEXT,
        entity_id TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_usage_events_timestamp ON usage_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_usage_events_task_id ON usage_events(task_id);
    CREATE INDEX IF NOT EXISTS idx_usage_events_entity_id ON usage_events(entity_id);
    CREATE INDEX IF NOT EXISTS idx_usage_events_event_type ON usage_events(event_type);
"#;

fn db_err(e: rusqlite::Error) -> UsageError {
    UsageError::Database(e.to_string())
}

/// SQLite-backed usage store
pub struct SqliteUsageStore {
    conn: Mutex<Connection>,
}

impl SqliteUsageStore {
    pub fn new(path: &Path) -> Result<Self, UsageError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, UsageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, UsageError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, UsageError> {
        self.conn
            .lock()
            .map_err(|_| UsageError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &UsageFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref task_id) = filter.task_id {
            conditions.push("task_id = ?");
            params.push(Box::new(task_id.clone()));
        }

        if let Some(ref entity_id) = filter.entity_id {
            conditions.push("entity_id = ?");
            params.push(Box::new(entity_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl UsageStore for SqliteUsageStore {
    fn insert(&self, record: &UsageRecord) -> Result<i64, UsageError> {
        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| UsageError::Serialization(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO usage_events (timestamp, event_type, task_id, entity_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.task_id,
                record.entity_id,
                data_json,
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, UsageError> {
        let (where_clause, mut params) = Self::build_where_clause(filter);
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT id, timestamp, event_type, task_id, entity_id, data FROM usage_events {} ORDER BY id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, task_id, entity_id, data_json) = row.map_err(db_err)?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| UsageError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let data: UsageEvent = serde_json::from_str(&data_json)
                .map_err(|e| UsageError::Serialization(e.to_string()))?;

            records.push(UsageRecord {
                id,
                timestamp,
                event_type,
                task_id,
                entity_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &UsageFilter) -> Result<i64, UsageError> {
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM usage_events {}", where_clause);

        let conn = self.lock()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Stage;

    fn record(event: UsageEvent) -> UsageRecord {
        UsageRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            task_id: event.task_id().map(String::from),
            entity_id: event.entity_id().map(String::from),
            data: event,
        }
    }

    fn submitted(entity: &str, task: &str) -> UsageEvent {
        UsageEvent::TaskSubmitted {
            record_id: format!("rec-{}", task),
            entity_id: entity.to_string(),
            stage: Stage::Base,
            provider_id: "sora".to_string(),
            task_id: task.to_string(),
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteUsageStore::in_memory().unwrap();
        let id = store.insert(&record(submitted("char-1", "t1"))).unwrap();
        assert!(id > 0);

        let records = store.query(&UsageFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "task_submitted");
        assert_eq!(records[0].task_id.as_deref(), Some("t1"));
        assert_eq!(records[0].data, submitted("char-1", "t1"));
    }

    #[test]
    fn test_filters_and_count() {
        let store = SqliteUsageStore::in_memory().unwrap();
        store.insert(&record(submitted("char-1", "t1"))).unwrap();
        store.insert(&record(submitted("char-2", "t2"))).unwrap();
        store
            .insert(&record(UsageEvent::ServiceStopped {
                reason: "shutdown".to_string(),
            }))
            .unwrap();

        assert_eq!(store.count(&UsageFilter::new()).unwrap(), 3);
        assert_eq!(
            store
                .count(&UsageFilter::new().with_entity_id("char-2"))
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .query(&UsageFilter::new().with_event_type("task_submitted"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .query(&UsageFilter::new().with_task_id("t1"))
                .unwrap()[0]
                .entity_id
                .as_deref(),
            Some("char-1")
        );
    }

    #[test]
    fn test_query_newest_first_with_pagination() {
        let store = SqliteUsageStore::in_memory().unwrap();
        for i in 0..5 {
            store
                .insert(&record(submitted("char-1", &format!("t{}", i))))
                .unwrap();
        }

        let page = store
            .query(&UsageFilter::new().with_limit(2).with_offset(1))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].task_id.as_deref(), Some("t3"));
        assert_eq!(page[1].task_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.db");
        {
            let store = SqliteUsageStore::new(&path).unwrap();
            store.insert(&record(submitted("char-1", "t1"))).unwrap();
        }
        let store = SqliteUsageStore::new(&path).unwrap();
        assert_eq!(store.count(&UsageFilter::new()).unwrap(), 1);
    }
}
