//! Database handle for the gateway.

use std::path::Path;

use sqlx::{Pool, Sqlite};
use termgate_core::db::{self, DatabaseError};
use tracing::info;

/// Handle over the gateway's SQLite pool. Cheap to clone; every query
/// lives in the `queries*` modules as an `impl` block on this type.
#[derive(Clone)]
pub struct GatewayDatabase {
    pool: Pool<Sqlite>,
}

impl GatewayDatabase {
    /// Open or create the database at the given path and bring the
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = Self {
            pool: db::connect_file(path).await?,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Self {
            pool: db::connect_memory().await?,
        };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Gateway database schema is up to date");
        Ok(())
    }

    /// Reference to the connection pool.
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
