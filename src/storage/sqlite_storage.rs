use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::error_handling::types::StorageError;
use crate::storage::schema::{self, bind_record, Dialect, RecordRow, SummaryRow};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    count, AggregateStats, Backend, HealthReport, PageRequest, RecordPage, SessionRecord,
    SessionSummaryPage, StoredRecord,
};

fn placeholder(n: usize) -> String {
    format!("?{}", n)
}

const SQLITE: Dialect = Dialect {
    id_column: "id INTEGER PRIMARY KEY AUTOINCREMENT",
    float_type: "REAL",
    placeholder,
    bytewise: "",
};

/// File-backed SQLite implementation of `Storage`.
///
/// Used when no PostgreSQL connection string is configured, when SQLite is forced, or as the
/// fallback when PostgreSQL is unreachable at startup.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Opens (creating if missing) the database file and ensures the schema exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create database dir {}: {}", parent.display(), e);
                StorageError::ConnectionFailed(e.to_string())
            })?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| {
                error!("Failed to open SQLite database {}: {}", path.display(), e);
                StorageError::ConnectionFailed(e.to_string())
            })?;

        let storage = Self { pool, path };
        storage.ensure_schema().await?;
        info!("SQLite storage initialized at {}", storage.path.display());
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in [schema::create_table(&SQLITE), schema::create_session_index()] {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::ConnectionFailed(format!("schema setup: {}", e)))?;
        }
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<u64, StorageError> {
        let n: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::read)?;
        Ok(count(n))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn insert_batch(&self, records: &[SessionRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let sql = schema::insert_statement(&SQLITE);
        let created_at = schema::created_at_now();

        let mut tx = self.pool.begin().await.map_err(StorageError::write)?;
        for (index, record) in records.iter().enumerate() {
            bind_record!(sqlx::query(&sql), record, created_at.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Insert of record {} failed, rolling back batch: {}", index, e);
                    StorageError::WriteFailed {
                        index: Some(index),
                        reason: e.to_string(),
                    }
                })?;
        }
        tx.commit().await.map_err(StorageError::write)?;

        debug!("Committed {} records to SQLite", records.len());
        Ok(records.len())
    }

    async fn query_page(&self, page: PageRequest) -> Result<RecordPage, StorageError> {
        let total = self.count(schema::COUNT_RECORDS).await?;
        let rows: Vec<RecordRow> = sqlx::query_as(&schema::select_page(&SQLITE))
            .bind(page.sql_limit())
            .bind(page.sql_offset())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::read)?;
        Ok(RecordPage {
            records: rows.into_iter().map(RecordRow::into_stored).collect(),
            total,
        })
    }

    async fn query_by_id(&self, session_id: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&schema::select_by_session(&SQLITE))
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::read)?;
        Ok(rows.into_iter().map(RecordRow::into_stored).collect())
    }

    async fn aggregate_stats(&self) -> Result<AggregateStats, StorageError> {
        let total_records = self.count(schema::COUNT_RECORDS).await?;
        let unique_sessions = self.count(schema::COUNT_SESSIONS).await?;

        let (earliest_timestamp, latest_timestamp): (Option<String>, Option<String>) =
            sqlx::query_as(&schema::timestamp_bounds(&SQLITE))
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::read)?;

        let cutoff = schema::format_created_at(Utc::now() - chrono::Duration::hours(24));
        let recent: i64 = sqlx::query_scalar(&schema::count_created_since(&SQLITE))
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::read)?;

        let emotions: Vec<(String, i64)> = sqlx::query_as(schema::EMOTION_COUNTS)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::read)?;
        let emotion_counts: BTreeMap<String, u64> = emotions
            .into_iter()
            .map(|(emotion, n)| (emotion, count(n)))
            .collect();

        Ok(AggregateStats {
            total_records,
            unique_sessions,
            emotion_counts,
            earliest_timestamp,
            latest_timestamp,
            recent_records_24h: count(recent),
        })
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(schema::DELETE_ALL)
            .execute(&self.pool)
            .await
            .map_err(StorageError::write)?;
        info!("Cleared {} records from SQLite", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn session_summaries(
        &self,
        page: PageRequest,
    ) -> Result<SessionSummaryPage, StorageError> {
        let total = self.count(schema::COUNT_SESSIONS).await?;
        let rows: Vec<SummaryRow> = sqlx::query_as(&schema::select_session_summaries(&SQLITE))
            .bind(page.sql_limit())
            .bind(page.sql_offset())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::read)?;
        Ok(SessionSummaryPage {
            items: rows.into_iter().map(SummaryRow::into_summary).collect(),
            total,
        })
    }

    async fn health(&self) -> Result<HealthReport, StorageError> {
        sqlx::query(schema::PING)
            .execute(&self.pool)
            .await
            .map_err(StorageError::read)?;
        Ok(HealthReport {
            backend: Backend::Sqlite,
            total_records: self.count(schema::COUNT_RECORDS).await?,
            total_sessions: self.count(schema::COUNT_SESSIONS).await?,
        })
    }
}
