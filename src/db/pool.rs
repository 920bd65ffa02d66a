//! Connection pooling and the storage error type shared by every query.

use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use std::time::Duration;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("a plant named {0:?} already exists")]
    DuplicateName(String),
}

/// Build a pool and open its first connections, failing fast on a bad URL.
pub fn connect(database_url: &str, max_size: u32) -> Result<PgPool, String> {
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(ConnectionManager::<PgConnection>::new(database_url))
        .map_err(|e| format!("DB connection failed: {}", e))
}

/// Build a pool without connecting. Connections are opened on first use.
pub fn connect_lazy(database_url: &str, max_size: u32) -> PgPool {
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build_unchecked(ConnectionManager::<PgConnection>::new(database_url))
}

pub fn apply_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}
