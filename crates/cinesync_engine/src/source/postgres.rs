//! PostgreSQL source.

use super::query;
use super::SourceReader;
use crate::error::{SyncError, SyncResult};
use crate::row::RawRow;
use crate::stream::{EntityStream, Relation};
use crate::window::SyncWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinesync_state::SyncCursor;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

/// Reads stream pages from PostgreSQL through a connection pool.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    /// Connects a pool to `database_url`.
    ///
    /// The pool is lazy: the first query opens the first connection, so an
    /// unreachable database surfaces as a retryable read error.
    pub fn connect(database_url: &str, acquire_timeout: Duration) -> SyncResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)
            .map_err(|e| SyncError::Config(format!("invalid database url: {}", e)))?;
        Ok(Self { pool })
    }

    /// Connects a lazy pool with explicit connection options.
    pub fn connect_with(options: PgConnectOptions, acquire_timeout: Duration) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);
        Self { pool }
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode(row: &PgRow) -> SyncResult<RawRow> {
        let id: Uuid = row.try_get("id").map_err(classify)?;
        let timestamp: DateTime<Utc> = row.try_get("ts").map_err(classify)?;
        let data: Value = row.try_get("data").map_err(classify)?;
        let root_ids: Vec<Uuid> = row.try_get("root_ids").map_err(classify)?;

        let fields = match data {
            Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        Ok(RawRow {
            id,
            timestamp,
            fields,
            root_ids,
        })
    }
}

#[async_trait]
impl SourceReader for PostgresSource {
    async fn read(
        &self,
        stream: &EntityStream,
        cursor: Option<&SyncCursor>,
        window: &SyncWindow,
        limit: u32,
    ) -> SyncResult<Vec<RawRow>> {
        let sql = query::read_query(stream, cursor.is_some());
        let mut statement = sqlx::query(&sql);
        if let Some(cursor) = cursor {
            statement = statement
                .bind(cursor.last_seen_timestamp)
                .bind(cursor.last_seen_id);
        }
        let rows = statement
            .bind(window.end)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(stream = %stream.name, rows = rows.len(), "read page");
        rows.iter().map(Self::decode).collect()
    }

    async fn read_relations(
        &self,
        root: &EntityStream,
        relation: Relation,
        root_ids: &[Uuid],
    ) -> SyncResult<Vec<RawRow>> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }
        let join = root.join_for(relation).ok_or_else(|| {
            SyncError::Config(format!(
                "root stream {} does not declare relation {}",
                root.name, relation
            ))
        })?;

        let sql = query::relation_query(root, join);
        let rows = sqlx::query(&sql)
            .bind(root_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(stream = %root.name, %relation, rows = rows.len(), "read relations");
        rows.iter().map(Self::decode).collect()
    }
    async fn count_unstamped(&self, stream: &EntityStream) -> SyncResult<u64> {
        let count: i64 = sqlx::query_scalar(&query::unstamped_query(stream))
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Splits sqlx errors into transient (connection, pool, serialization
/// conflicts, shutdown) and permanent ones (bad SQL, schema mismatch).
fn classify(error: sqlx::Error) -> SyncError {
    let retryable = match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    };
    let message = error.to_string();
    if retryable {
        SyncError::source_retryable(message)
    } else {
        SyncError::source_fatal(message)
    }
}

/// Connection exceptions (08), operator intervention (57) and
/// serialization failures (40001, 40P01).
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("57") || code == "40001" || code == "40P01"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classification() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(is_transient_sqlstate("40001"));
        assert!(!is_transient_sqlstate("42P01"));
        assert!(!is_transient_sqlstate("22P02"));
    }

    #[test]
    fn connection_errors_are_retryable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify(io).is_retryable());
        assert!(classify(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!classify(sqlx::Error::RowNotFound).is_retryable());
        assert!(!classify(sqlx::Error::ColumnNotFound("ts".into())).is_retryable());
    }

    #[tokio::test]
    async fn invalid_url_is_a_config_error() {
        let err = PostgresSource::connect("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
