//! Memo of local files already uploaded to a provider.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadRecordError {
    #[error("Database error: {0}")]
    Database(String),
}

fn db_err(e: rusqlite::Error) -> UploadRecordError {
    UploadRecordError::Database(e.to_string())
}

/// A local file and where a provider hosts its copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Hex SHA-256 of the file contents.
    pub content_hash: String,
    pub provider_id: String,
    pub local_path: String,
    pub remote_url: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage for upload records, unique on (content hash, provider).
pub trait UploadRecordStore: Send + Sync {
    fn get(&self, content_hash: &str, provider_id: &str)
        -> Result<Option<UploadRecord>, UploadRecordError>;

    /// Insert or replace.
    fn save(&self, record: &UploadRecord) -> Result<(), UploadRecordError>;

    /// Returns whether a record was removed.
    fn delete(&self, content_hash: &str, provider_id: &str) -> Result<bool, UploadRecordError>;
}

/// Hex SHA-256 and byte length of a file.
pub async fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let bytes = tokio::fs::read(path).await?;
    let digest = Sha256::digest(&bytes);
    let hex = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok((hex, bytes.len() as u64))
}

pub struct SqliteUploadRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteUploadRecordStore {
    pub fn new(path: &Path) -> Result<Self, UploadRecordError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, UploadRecordError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, UploadRecordError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS upload_records (
                content_hash TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                local_path TEXT NOT NULL,
                remote_url TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                mime_type TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (content_hash, provider_id)
            );
            "#,
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, UploadRecordError> {
        self.conn
            .lock()
            .map_err(|_| UploadRecordError::Database("connection lock poisoned".to_string()))
    }
}

impl UploadRecordStore for SqliteUploadRecordStore {
    fn get(
        &self,
        content_hash: &str,
        provider_id: &str,
    ) -> Result<Option<UploadRecord>, UploadRecordError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT content_hash, provider_id, local_path, remote_url, size_bytes, mime_type, created_at
             FROM upload_records WHERE content_hash = ? AND provider_id = ?",
            params![content_hash, provider_id],
            |row| {
                let created_at: String = row.get(6)?;
                Ok(UploadRecord {
                    content_hash: row.get(0)?,
                    provider_id: row.get(1)?,
                    local_path: row.get(2)?,
                    remote_url: row.get(3)?,
                    size_bytes: row.get::<_, i64>(4)? as u64,
                    mime_type: row.get(5)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn save(&self, record: &UploadRecord) -> Result<(), UploadRecordError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO upload_records (content_hash, provider_id, local_path, remote_url, size_bytes, mime_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.content_hash,
                record.provider_id,
                record.local_path,
                record.remote_url,
                record.size_bytes as i64,
                record.mime_type,
                record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, content_hash: &str, provider_id: &str) -> Result<bool, UploadRecordError> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM upload_records WHERE content_hash = ? AND provider_id = ?",
                params![content_hash, provider_id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}
