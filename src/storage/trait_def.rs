use crate::models::{NewVisit, RefererCount, Tracker, TrackerSummary, VisitRow};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("tracker id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage gateway over a pooled relational store.
///
/// Every operation borrows its own connection from the pool and hands it back
/// when the operation returns, whatever the outcome.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Round-trip a trivial query to prove the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Insert a new tracker row
    async fn create_tracker(&self, id: &str) -> StorageResult<Tracker>;

    /// Delete a tracker by id, returns false when no row matched
    async fn delete_tracker(&self, id: &str) -> StorageResult<bool>;

    /// List all trackers with their visit totals, newest first
    async fn list_trackers(&self) -> StorageResult<Vec<TrackerSummary>>;

    /// Append one visit event inside a transaction.
    /// On insert failure the transaction is rolled back and the error returned.
    async fn record_visit(&self, visit: &NewVisit) -> StorageResult<()>;

    /// List stored visits, optionally restricted to one tracker
    async fn list_visits(&self, tracker_id: Option<&str>) -> StorageResult<Vec<VisitRow>>;

    /// Visit counts grouped by (tracker, referer)
    async fn referer_counts(&self) -> StorageResult<Vec<RefererCount>>;

    /// Close the pool. Calling this more than once is harmless.
    async fn close(&self);
}
