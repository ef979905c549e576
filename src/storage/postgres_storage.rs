use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::error_handling::types::StorageError;
use crate::storage::schema::{self, bind_record, Dialect, RecordRow, SummaryRow};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    count, AggregateStats, Backend, HealthReport, PageRequest, RecordPage, SessionRecord,
    SessionSummaryPage, StoredRecord,
};

fn placeholder(n: usize) -> String {
    format!("${}", n)
}

const POSTGRES: Dialect = Dialect {
    id_column: "id BIGSERIAL PRIMARY KEY",
    float_type: "DOUBLE PRECISION",
    placeholder,
    bytewise: r#" COLLATE "C""#,
};

/// PostgreSQL implementation of `Storage`.
pub struct PostgresStorage {
    pool: Pool<Postgres>,
}

impl PostgresStorage {
    /// How long to wait for the first connection before giving up.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connects to the server, verifies the connection and ensures the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::CONNECT_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        sqlx::query(schema::PING)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let storage = Self { pool };
        storage.ensure_schema().await?;
        info!("PostgreSQL storage initialized");
        Ok(storage)
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in [schema::create_table(&POSTGRES), schema::create_session_index()] {
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
impl Storage for PostgresStorage {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn insert_batch(&self, records: &[SessionRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let sql = schema::insert_statement(&POSTGRES);
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

        debug!("Committed {} records to PostgreSQL", records.len());
        Ok(records.len())
    }

    async fn query_page(&self, page: PageRequest) -> Result<RecordPage, StorageError> {
        let total = self.count(schema::COUNT_RECORDS).await?;
        let rows: Vec<RecordRow> = sqlx::query_as(&schema::select_page(&POSTGRES))
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
        let rows: Vec<RecordRow> = sqlx::query_as(&schema::select_by_session(&POSTGRES))
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
            sqlx::query_as(&schema::timestamp_bounds(&POSTGRES))
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::read)?;

        let cutoff = schema::format_created_at(Utc::now() - chrono::Duration::hours(24));
        let recent: i64 = sqlx::query_scalar(&schema::count_created_since(&POSTGRES))
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
        info!("Cleared {} records from PostgreSQL", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn session_summaries(
        &self,
        page: PageRequest,
    ) -> Result<SessionSummaryPage, StorageError> {
        let total = self.count(schema::COUNT_SESSIONS).await?;
        let rows: Vec<SummaryRow> =
            sqlx::query_as(&schema::select_session_summaries(&POSTGRES))
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
            backend: Backend::Postgres,
            total_records: self.count(schema::COUNT_RECORDS).await?,
            total_sessions: self.count(schema::COUNT_SESSIONS).await?,
        })
    }
}

// These tests need a disposable database: they clear `session_records`.
// Set TEST_POSTGRES_URL to run them, otherwise they return early.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::normalize;
    use serde_json::json;
    use serial_test::serial;

    async fn test_db() -> Option<PostgresStorage> {
        let _ = env_logger::builder().is_test(true).try_init();
        let url = std::env::var("TEST_POSTGRES_URL").ok()?;
        let storage = PostgresStorage::connect(&url).await.unwrap();
        storage.clear_all().await.unwrap();
        Some(storage)
    }

    #[test]
    fn test_text_ordering_is_bytewise() {
        assert!(schema::timestamp_bounds(&POSTGRES).contains(r#"MIN("timestamp" COLLATE "C")"#));
        assert!(schema::select_session_summaries(&POSTGRES)
            .contains(r#"session_id COLLATE "C" ASC"#));
    }

    #[tokio::test]
    async fn test_connect_unreachable_fails() {
        let result = PostgresStorage::connect("postgres://nobody@127.0.0.1:1/none").await;
        assert!(matches!(result, Err(StorageError::ConnectionFailed(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_roundtrip_and_stats() {
        let Some(storage) = test_db().await else {
            return;
        };
        let input = json!({
            "session_id": "a",
            "timestamp": "2025-01-01T00:00:00",
            "hmd_data": {"position": {"x": 1.5, "y": 2, "z": 0.5}, "gaze_actor": "door"},
            "user_emotion": "happy",
            "emotion_window_flag": false
        });
        let first = normalize(&input).unwrap();
        let second = normalize(&json!({"session_id": "a", "user_emotion": "sad"})).unwrap();
        assert_eq!(storage.insert_batch(&[first.clone(), second]).await.unwrap(), 2);

        let rows = storage.query_by_id("a").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record, first);
        assert!(rows[0].id < rows[1].id);

        let stats = storage.aggregate_stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.unique_sessions, 1);
        assert_eq!(stats.emotion_counts["happy"], 1);
        assert_eq!(stats.emotion_counts["sad"], 1);
        assert_eq!(stats.earliest_timestamp.as_deref(), Some("2025-01-01T00:00:00"));
        assert_eq!(stats.recent_records_24h, 2);

        assert_eq!(storage.clear_all().await.unwrap(), 2);
        let cleared = storage.aggregate_stats().await.unwrap();
        assert_eq!(cleared.total_records, 0);
        assert!(cleared.emotion_counts.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_pages_and_summaries() {
        let Some(storage) = test_db().await else {
            return;
        };
        let batch: Vec<SessionRecord> = (0..5)
            .map(|i| SessionRecord {
                session_id: Some(format!("s{}", i % 2)),
                ..Default::default()
            })
            .collect();
        storage.insert_batch(&batch).await.unwrap();

        let page = storage.query_page(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.records.len(), 2);
        assert!(page.records[0].id < page.records[1].id);
        assert!(storage
            .query_page(PageRequest::new(50, 2))
            .await
            .unwrap()
            .records
            .is_empty());

        let summaries = storage
            .session_summaries(PageRequest::default())
            .await
            .unwrap();
        assert_eq!(summaries.total, 2);
        // same batch, same created_at: ties are broken by session id
        assert_eq!(summaries.items[0].session_id, "s0");
        assert_eq!(summaries.items[0].records, 3);

        let report = storage.health().await.unwrap();
        assert_eq!(report.backend, Backend::Postgres);
        assert_eq!(report.total_records, 5);
        storage.clear_all().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_text_order_matches_sqlite() {
        let Some(storage) = test_db().await else {
            return;
        };
        let batch: Vec<SessionRecord> = [("a", "a-2025"), ("B", "B-2025")]
            .iter()
            .map(|(id, ts)| SessionRecord {
                session_id: Some(id.to_string()),
                timestamp: Some(ts.to_string()),
                ..Default::default()
            })
            .collect();
        storage.insert_batch(&batch).await.unwrap();

        let stats = storage.aggregate_stats().await.unwrap();
        assert_eq!(stats.earliest_timestamp.as_deref(), Some("B-2025"));
        assert_eq!(stats.latest_timestamp.as_deref(), Some("a-2025"));

        let summaries = storage
            .session_summaries(PageRequest::default())
            .await
            .unwrap();
        assert_eq!(summaries.items[0].session_id, "B");
        storage.clear_all().await.unwrap();
    }
}
