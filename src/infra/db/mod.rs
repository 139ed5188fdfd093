//! Postgres-backed repository implementations.

mod cache;
mod items;
mod jobs;
mod util;

pub use jobs::PostgresDispatcher;
pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Apply the embedded schema migrations and the apalis job tables.
    ///
    /// Both migrators record into `_sqlx_migrations`, so each ignores the
    /// versions applied by the other.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut schema = sqlx::migrate!("./migrations");
        schema.set_ignore_missing(true);
        schema.run(pool).await?;

        let mut jobs = PostgresStorage::migrations();
        jobs.set_ignore_missing(true);
        jobs.run(pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
