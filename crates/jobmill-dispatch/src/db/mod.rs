//! Postgres connection pool, migrations, and store error type

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// SQLSTATE classes and codes worth retrying
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57P01", // admin_shutdown
    "57P03", // cannot_connect_now
];

/// Job store errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Applying migrations failed
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// A job unit could not be serialized for storage
    #[error("Failed to encode job payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// A stored row could not be turned back into a job record
    #[error("Corrupt job record {id}: {reason}")]
    Decode { id: i64, reason: String },

    /// The store is temporarily unreachable
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

impl DbError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a decode error for a stored row
    pub fn decode(id: i64, reason: impl Into<String>) -> Self {
        Self::Decode {
            id,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same page or batch may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Unavailable(_) => true,
            DbError::Sqlx(err) => is_transient_sqlx(err),
            DbError::Migrate(_)
            | DbError::Config(_)
            | DbError::Encode(_)
            | DbError::Decode { .. } => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            // Class 08: connection exceptions
            code.starts_with("08") || TRANSIENT_SQLSTATES.iter().any(|known| code == *known)
        }),
        _ => false,
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Create the connection pool the Postgres job store acquires from
pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    if config.url.is_empty() {
        return Err(DbError::config("DATABASE_URL is empty"));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the embedded migrations
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Unavailable("timeout".into()).is_transient());
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        )))
        .is_transient());

        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_transient());
        assert!(!DbError::config("bad url").is_transient());
        assert!(!DbError::decode(7, "not json").is_transient());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = DbError::decode(42, "missing job_hash");
        assert_eq!(err.to_string(), "Corrupt job record 42: missing job_hash");
    }
}
