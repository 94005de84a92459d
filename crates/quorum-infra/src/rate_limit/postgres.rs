//! PostgreSQL counting store - one shared row per token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, DbConn, DbErr, EntityTrait, QueryFilter, Statement,
};

use quorum_core::domain::window_end;
use quorum_core::ports::{Clock, RateLimitStore, StoreError, SystemClock};

use crate::database::entity::rate_limit;
use crate::database::{DatabaseConfig, connect};

/// Reset-or-increment in a single statement.
///
/// `$1` token, `$2` now, `$3` expiry for a freshly opened window. The CASE
/// expressions read the pre-update row under the row lock taken by the
/// conflict, so concurrent instances never both see the same stale count.
pub(crate) const UPSERT_SQL: &str = r#"INSERT INTO rate_limits (token, count, expires_at)
VALUES ($1, 1, $3)
ON CONFLICT (token) DO UPDATE SET
    count = CASE WHEN rate_limits.expires_at <= $2 THEN 1 ELSE rate_limits.count + 1 END,
    expires_at = CASE WHEN rate_limits.expires_at <= $2 THEN EXCLUDED.expires_at ELSE rate_limits.expires_at END
RETURNING count"#;

/// Counting store backed by the shared `rate_limits` table.
///
/// All application instances pointing at the same database enforce one
/// combined count per token.
///
/// Window expiry is decided with this instance's clock, not the database's.
/// Instances are expected to run NTP-synchronized clocks; a skewed instance
/// can reset a window early (or late) by the amount of its skew.
pub struct PostgresRateStore {
    db: DbConn,
    clock: Arc<dyn Clock>,
}

impl PostgresRateStore {
    pub fn new(db: DbConn) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: DbConn, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Connect using the given database configuration.
    pub async fn connect(config: &DatabaseConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let db = connect(config).await.map_err(map_db_err)?;
        Ok(Self::with_clock(db, clock))
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateStore {
    async fn increment(&self, token: &str, interval: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let expires_at = window_end(now, interval);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            UPSERT_SQL,
            [token.into(), now.into(), expires_at.into()],
        );

        let row = self
            .db
            .query_one(stmt)
            .await
            .map_err(|e| {
                tracing::warn!(token = %token, error = %e, "Rate limit upsert failed");
                map_db_err(e)
            })?
            .ok_or_else(|| StoreError::Corrupt("upsert returned no row".to_string()))?;

        let count: i64 = row
            .try_get("", "count")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {}", count)))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();

        let result = rate_limit::Entity::delete_many()
            .filter(rate_limit::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected > 0 {
            tracing::debug!(purged = result.rows_affected, "Purged expired rate limit rows");
        }
        Ok(result.rows_affected)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn map_db_err(err: DbErr) -> StoreError {
    match err {
        DbErr::Conn(e) => StoreError::Connection(e.to_string()),
        DbErr::ConnectionAcquire(e) => StoreError::Connection(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}
