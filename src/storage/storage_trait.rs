//! Storage Trait
//!
//! This module defines the `Storage` trait, the interface implemented by the PostgreSQL and
//! SQLite backends.
//!
//! Implementors of this trait are responsible for:
//! - Inserting normalized record batches atomically
//! - Paginated, per-session and summary reads
//! - Aggregate statistics over the whole table
//! - Clearing the table
//!
//! Both implementations must return identical data for identical inputs. All methods return a
//! `Result` to handle potential storage errors.

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::storage::types::{
    AggregateStats, Backend, HealthReport, PageRequest, RecordPage, SessionRecord,
    SessionSummaryPage, StoredRecord,
};

/// The `Storage` trait defines the interface for session record storage backends.
///
/// A backend is selected once at startup and shared behind an `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Which backend variant this is.
    fn backend(&self) -> Backend;

    /// Inserts every record in one transaction and returns the number inserted.
    ///
    /// On any row failure nothing is committed and `StorageError::WriteFailed` carries the
    /// index of the first failing record.
    async fn insert_batch(&self, records: &[SessionRecord]) -> Result<usize, StorageError>;

    /// Returns one page of records ordered by ascending `id`, plus the total row count.
    ///
    /// An offset past the end yields an empty page.
    async fn query_page(&self, page: PageRequest) -> Result<RecordPage, StorageError>;

    /// Returns every record of a session ordered by ascending `id`, empty if unknown.
    async fn query_by_id(&self, session_id: &str) -> Result<Vec<StoredRecord>, StorageError>;

    /// Computes counts, emotion distribution and timestamp bounds over the whole table.
    async fn aggregate_stats(&self) -> Result<AggregateStats, StorageError>;

    /// Deletes every record and returns how many were removed.
    async fn clear_all(&self) -> Result<u64, StorageError>;

    /// Lists distinct sessions with their record counts, most recently started first.
    async fn session_summaries(&self, page: PageRequest)
        -> Result<SessionSummaryPage, StorageError>;

    /// Round-trips to the database and reports table counts.
    async fn health(&self) -> Result<HealthReport, StorageError>;
}
