use std::ops::{Deref, DerefMut};
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use futures::future::BoxFuture;
use sqlx::{
    migrate::{MigrateError, Migrator},
    pool::PoolConnection,
    postgres::PgPoolOptions,
    Connection, PgConnection, PgPool, Postgres,
};
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;
use crate::error::ApiError;

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Errors from pool setup and connection acquisition
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(#[from] url::ParseError),

    #[error("Could not acquire a connection: {0}")]
    Unavailable(sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Build the bounded pool. Connections are opened lazily so the server can
/// start (and report degraded health) while the database is still coming up.
pub fn create_pool(config: &AppConfig) -> Result<PgPool, DatabaseError> {
    let url = config.database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect_lazy(&url)?;

    info!(
        "Created database pool for {}:{} (max {} connections)",
        config.database.host, config.database.port, config.database.max_connections
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    MIGRATOR.run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// Pings the pool to ensure connectivity
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// One pooled connection bound to one request.
///
/// Extracting `DbConn` acquires; dropping it (on every exit path of the
/// handler, including early `?` returns and panics) hands the connection back
/// to the pool. A failed acquisition yields no connection and nothing to
/// release.
pub struct DbConn(PoolConnection<Postgres>);

impl DbConn {
    pub async fn acquire(pool: &PgPool) -> Result<Self, DatabaseError> {
        pool.acquire().await.map(DbConn).map_err(DatabaseError::Unavailable)
    }
}

impl Deref for DbConn {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.0
    }
}

impl DerefMut for DbConn {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DbConn
where
    PgPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pool = PgPool::from_ref(state);
        Ok(DbConn::acquire(&pool).await?)
    }
}

/// Run `f` as one atomic unit on `conn`: commit when it returns `Ok`, roll
/// back and return the closure's error otherwise.
///
/// ```ignore
/// transaction(&mut conn, move |tx| Box::pin(async move {
///     sqlx::query("UPDATE covers SET is_main = FALSE WHERE is_main").execute(&mut *tx).await?;
///     sqlx::query("UPDATE covers SET is_main = TRUE WHERE idx = $1").bind(idx).execute(&mut *tx).await?;
///     Ok(())
/// })).await?;
/// ```
pub async fn transaction<T, F>(conn: &mut PgConnection, f: F) -> Result<T, ApiError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, ApiError>>,
{
    let mut tx = conn.begin().await?;
    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazy_pool_does_not_touch_the_network() {
        let config = AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://nobody@127.0.0.1:1/none".to_string()),
            _ => None,
        });
        let pool = create_pool(&config).unwrap();
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn acquire_failures_are_generic_infrastructure_errors() {
        let err: ApiError = DatabaseError::Unavailable(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err, ApiError::internal("database unavailable"));
    }
}
