use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CacheStore, CacheStoreError},
    domain::cache::{CacheEntry, EntryStatus},
};

use super::PostgresRepositories;

#[derive(sqlx::FromRow)]
struct CacheRow {
    key: String,
    status: String,
    value: Option<String>,
    written_at: Option<OffsetDateTime>,
    pending_since: Option<OffsetDateTime>,
}

impl TryFrom<CacheRow> for CacheEntry {
    type Error = CacheStoreError;

    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        let status = EntryStatus::try_from(row.status.as_str()).map_err(|_| {
            CacheStoreError::unavailable(format!(
                "unknown cache status `{}` for key `{}`",
                row.status, row.key
            ))
        })?;

        Ok(Self {
            key: row.key,
            status,
            value: row.value,
            written_at: row.written_at,
            pending_since: row.pending_since,
        })
    }
}

fn storage_error(err: sqlx::Error) -> CacheStoreError {
    CacheStoreError::unavailable(err)
}

#[async_trait]
impl CacheStore for PostgresRepositories {
    async fn get(&self, key: &str) -> Result<CacheEntry, CacheStoreError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT key, status, value, written_at, pending_since
              FROM cache_entries
             WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(storage_error)?;

        match row {
            Some(row) => CacheEntry::try_from(row),
            None => Ok(CacheEntry::absent(key)),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<CacheEntry, CacheStoreError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            INSERT INTO cache_entries (key, status, value, written_at, pending_since)
            VALUES ($1, 'ready', $2, $3, NULL)
            ON CONFLICT (key) DO UPDATE
               SET status = 'ready',
                   value = EXCLUDED.value,
                   written_at = EXCLUDED.written_at,
                   pending_since = NULL
            RETURNING key, status, value, written_at, pending_since
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(storage_error)?;

        CacheEntry::try_from(row)
    }

    async fn mark_pending(&self, key: &str) -> Result<CacheEntry, CacheStoreError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            INSERT INTO cache_entries (key, status, value, written_at, pending_since)
            VALUES ($1, 'pending', NULL, NULL, $2)
            ON CONFLICT (key) DO UPDATE
               SET status = 'pending',
                   value = NULL,
                   pending_since = EXCLUDED.pending_since
            RETURNING key, status, value, written_at, pending_since
            "#,
        )
        .bind(key)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(storage_error)?;

        CacheEntry::try_from(row)
    }

    async fn purge_stale_pending(&self, cutoff: OffsetDateTime) -> Result<u64, CacheStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_entries
             WHERE status = 'pending'
               AND pending_since <= $1
            "#,
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), CacheStoreError> {
        PostgresRepositories::health_check(self)
            .await
            .map_err(storage_error)
    }
}
