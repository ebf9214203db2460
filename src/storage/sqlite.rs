use crate::models::{NewVisit, RefererCount, Tracker, TrackerSummary, VisitRow};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid SQLite URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trackers (
                id TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tracker_id TEXT NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                referer TEXT,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_tracker_id ON requests(tracker_id)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn create_tracker(&self, id: &str) -> StorageResult<Tracker> {
        let created_at = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO trackers (id, created_at)
            VALUES (?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        tx.commit().await?;

        Ok(Tracker {
            id: id.to_string(),
            created_at,
        })
    }

    async fn delete_tracker(&self, id: &str) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM trackers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_trackers(&self) -> StorageResult<Vec<TrackerSummary>> {
        let trackers = sqlx::query_as::<_, TrackerSummary>(
            r#"
            SELECT t.id, t.created_at, COUNT(r.id) AS visits
            FROM trackers t
            LEFT JOIN requests r ON r.tracker_id = t.id
            GROUP BY t.id, t.created_at
            ORDER BY t.created_at DESC, t.id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(trackers)
    }

    async fn record_visit(&self, visit: &NewVisit) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp_millis();

        // Clamped to the latest stored timestamp so later rows never sort earlier
        let inserted = sqlx::query(
            r#"
            INSERT INTO requests (tracker_id, ip_address, user_agent, referer, timestamp)
            VALUES (?, ?, ?, ?, MAX(?, COALESCE((SELECT MAX(timestamp) FROM requests), 0)))
            "#,
        )
        .bind(visit.tracker_id.as_str())
        .bind(visit.ip_address.as_deref())
        .bind(visit.user_agent.as_deref())
        .bind(visit.referer.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(tracker_id = %visit.tracker_id, error = %rollback_err, "rollback failed");
            }
            return Err(err.into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_visits(&self, tracker_id: Option<&str>) -> StorageResult<Vec<VisitRow>> {
        let rows = match tracker_id {
            Some(tracker_id) => {
                sqlx::query_as::<_, VisitRow>(
                    r#"
                    SELECT id, tracker_id, ip_address, user_agent, referer
                    FROM requests
                    WHERE tracker_id = ?
                    ORDER BY id
                    "#,
                )
                .bind(tracker_id)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, VisitRow>(
                    r#"
                    SELECT id, tracker_id, ip_address, user_agent, referer
                    FROM requests
                    ORDER BY id
                    "#,
                )
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };

        Ok(rows)
    }

    async fn referer_counts(&self) -> StorageResult<Vec<RefererCount>> {
        let counts = sqlx::query_as::<_, RefererCount>(
            r#"
            SELECT tracker_id, referer, COUNT(*) AS count
            FROM requests
            GROUP BY tracker_id, referer
            ORDER BY tracker_id, referer
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(counts)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_sqlite() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    fn visit(tracker_id: &str, referer: Option<&str>) -> NewVisit {
        NewVisit {
            tracker_id: tracker_id.to_string(),
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("test-agent".to_string()),
            referer: referer.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_failed_insert_is_rolled_back() {
        let storage = setup_sqlite().await;

        // Abort any insert for the poisoned tracker after the row has been written
        sqlx::query(
            r#"
            CREATE TRIGGER reject_poison AFTER INSERT ON requests
            WHEN NEW.tracker_id = 'poison'
            BEGIN
                SELECT RAISE(ABORT, 'rejected');
            END
            "#,
        )
        .execute(storage.pool.as_ref())
        .await
        .unwrap();

        let result = storage.record_visit(&visit("poison", None)).await;
        assert!(result.is_err(), "insert should fail");
        assert!(storage.list_visits(None).await.unwrap().is_empty());

        // The single pooled connection must be usable again after the rollback
        storage.record_visit(&visit("healthy", None)).await.unwrap();
        let rows = storage.list_visits(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tracker_id, "healthy");
    }

    #[tokio::test]
    async fn test_duplicate_tracker_is_conflict() {
        let storage = setup_sqlite().await;

        storage.create_tracker("dup").await.unwrap();
        let err = storage.create_tracker("dup").await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // Connection released after the early return
        assert_eq!(storage.list_trackers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_keeps_recorded_visits() {
        let storage = setup_sqlite().await;

        storage.create_tracker("t1").await.unwrap();
        storage.record_visit(&visit("t1", None)).await.unwrap();

        assert!(storage.delete_tracker("t1").await.unwrap());
        assert!(!storage.delete_tracker("t1").await.unwrap());
        assert_eq!(storage.list_visits(Some("t1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_referer_counts_group_null_referers() {
        let storage = setup_sqlite().await;

        storage.record_visit(&visit("a", Some("http://x.com"))).await.unwrap();
        storage.record_visit(&visit("a", Some("http://x.com"))).await.unwrap();
        storage.record_visit(&visit("a", None)).await.unwrap();
        storage.record_visit(&visit("a", None)).await.unwrap();
        storage.record_visit(&visit("b", Some("http://y.com"))).await.unwrap();

        let counts = storage.referer_counts().await.unwrap();
        assert_eq!(counts.len(), 3);

        let null_group = counts
            .iter()
            .find(|c| c.tracker_id == "a" && c.referer.is_none())
            .unwrap();
        assert_eq!(null_group.count, 2);

        let x_group = counts
            .iter()
            .find(|c| c.referer.as_deref() == Some("http://x.com"))
            .unwrap();
        assert_eq!(x_group.count, 2);
    }

    #[tokio::test]
    async fn test_list_trackers_counts_visits() {
        let storage = setup_sqlite().await;

        storage.create_tracker("busy").await.unwrap();
        storage.create_tracker("idle").await.unwrap();
        storage.record_visit(&visit("busy", None)).await.unwrap();
        storage.record_visit(&visit("busy", None)).await.unwrap();

        let trackers = storage.list_trackers().await.unwrap();
        let busy = trackers.iter().find(|t| t.id == "busy").unwrap();
        let idle = trackers.iter().find(|t| t.id == "idle").unwrap();
        assert_eq!(busy.visits, 2);
        assert_eq!(idle.visits, 0);
    }

    #[tokio::test]
    async fn test_visit_timestamps_never_decrease() {
        let storage = setup_sqlite().await;

        // A row stamped an hour ahead, as left behind by a clock step back
        let ahead = chrono::Utc::now().timestamp_millis() + 3_600_000;
        sqlx::query("INSERT INTO requests (tracker_id, timestamp) VALUES ('a', ?)")
            .bind(ahead)
            .execute(storage.pool.as_ref())
            .await
            .unwrap();

        let before = chrono::Utc::now().timestamp_millis();
        storage.record_visit(&visit("a", None)).await.unwrap();
        storage.record_visit(&visit("b", None)).await.unwrap();

        let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, timestamp FROM requests ORDER BY id")
            .fetch_all(storage.pool.as_ref())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].1 <= w[1].1), "{rows:?}");
        assert_eq!(rows[1].1, ahead);

        // Without a later row the insert takes the current time
        let fresh = setup_sqlite().await;
        fresh.record_visit(&visit("c", None)).await.unwrap();
        let (stamp,): (i64,) = sqlx::query_as("SELECT timestamp FROM requests")
            .fetch_one(fresh.pool.as_ref())
            .await
            .unwrap();
        assert!(stamp >= before);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let storage = setup_sqlite().await;
        storage.close().await;
        storage.close().await;
        assert!(storage.ping().await.is_err());
    }
}
