use crate::config::PostgresCredentials;
use crate::models::{NewVisit, RefererCount, Tracker, TrackerSummary, VisitRow};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

/// Advisory lock key held for the duration of a visit insert
const VISIT_INSERT_LOCK: i64 = 0x7069_7865_6c;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Connect using discrete credentials instead of a URL
    pub async fn with_credentials(
        credentials: &PostgresCredentials,
        max_connections: u32,
    ) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&credentials.host)
            .username(&credentials.user)
            .database(&credentials.database);
        if let Some(port) = credentials.port {
            options = options.port(port);
        }
        if let Some(ref password) = credentials.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trackers (
                id TEXT PRIMARY KEY,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id BIGSERIAL PRIMARY KEY,
                tracker_id TEXT NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                referer TEXT,
                timestamp BIGINT NOT NULL
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
        let row = sqlx::query_as::<_, Tracker>(
            r#"
            INSERT INTO trackers (id, created_at)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, created_at
            "#,
        )
        .bind(id)
        .bind(created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(tracker) = row else {
            return Err(StorageError::Conflict);
        };
        tx.commit().await?;

        Ok(tracker)
    }

    async fn delete_tracker(&self, id: &str) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM trackers WHERE id = $1")
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

        // Serializes visit inserts so the clamp below sees every committed row
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(VISIT_INSERT_LOCK)
            .execute(&mut *tx)
            .await?;
        let now = chrono::Utc::now().timestamp_millis();

        let inserted = sqlx::query(
            r#"
            INSERT INTO requests (tracker_id, ip_address, user_agent, referer, timestamp)
            VALUES ($1, $2, $3, $4, GREATEST($5, COALESCE((SELECT MAX(timestamp) FROM requests), 0)))
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
                    WHERE tracker_id = $1
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
