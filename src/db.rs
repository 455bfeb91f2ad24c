use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
    /// SQLite only: wait for a held write lock this long before failing with BUSY
    pub busy_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            busy_timeout: Duration::from_millis(cfg.db_busy_timeout_ms),
        }
    }
}

/// Establishes a connection pool with default tuning
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let busy_timeout = config.busy_timeout;
    opt.map_sqlx_sqlite_opts(move |sqlite| sqlite.busy_timeout(busy_timeout));

    info!(
        max_connections = config.max_connections,
        "Connecting to database"
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection establishment failed");
        ServiceError::DatabaseError(e)
    })?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(?elapsed, "Database migrations completed"),
        Err(e) => error!(?elapsed, error = %e, "Database migrations failed"),
    }

    result
}

/// Takes the SQLite write lock with the first statement of a transaction so competing
/// writers wait on the busy timeout. A deferred transaction that writes after reading
/// gets BUSY without waiting. No-op on other backends.
pub async fn claim_write_lock<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
    if conn.get_database_backend() == DbBackend::Sqlite {
        conn.execute_unprepared("UPDATE products SET id = id WHERE 0")
            .await?;
    }
    Ok(())
}

/// Runs one attempt of a write unit, running it again while it loses to a concurrent
/// writer (unique-index collision or serialization failure).
///
/// After `max_attempts` contended attempts the caller gets
/// `ServiceError::ConcurrencyConflict(conflict_message)`. Any other error is returned as is.
pub async fn retry_on_contention<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    conflict_message: &str,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut current = 1;
    loop {
        match attempt(current).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_contention() && current < max_attempts => {
                warn!(operation, attempt = current, error = %err, "write contention, retrying");
                current += 1;
            }
            Err(err) if err.is_contention() => {
                warn!(operation, attempt = current, error = %err, "write contention persisted, giving up");
                return Err(ServiceError::ConcurrencyConflict(conflict_message.to_string()));
            }
            Err(err) => return Err(err),
        }
    }
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    match &result {
        Ok(_) => debug!(elapsed = ?start.elapsed(), "Database ping succeeded"),
        Err(e) => error!(elapsed = ?start.elapsed(), error = %e, "Database ping failed"),
    }

    result
}

/// Closes the database connection pool
pub async fn close_pool(pool: DbPool) -> Result<(), ServiceError> {
    info!("Closing database connection pool");
    pool.close().await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::TransactionTrait;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn scratch_pool(dir: &tempfile::TempDir) -> DbPool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("scratch.db").display());
        let pool = establish_connection(&url).await.unwrap();
        pool.execute_unprepared("CREATE TABLE IF NOT EXISTS tags (name TEXT NOT NULL UNIQUE)")
            .await
            .unwrap();
        pool.execute_unprepared("INSERT INTO tags (name) VALUES ('kasir')")
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn repeated_collision_is_retried_once_then_reported_as_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let pool = scratch_pool(&dir).await;
        let calls = AtomicU32::new(0);
        let (pool, calls) = (&pool, &calls);

        let result: Result<(), ServiceError> =
            retry_on_contention("insert tag", 2, "tag taken, please retry", |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                pool.execute_unprepared("INSERT INTO tags (name) VALUES ('kasir')")
                    .await?;
                Ok(())
            })
            .await;

        assert_matches!(
            result,
            Err(ServiceError::ConcurrencyConflict(msg)) if msg == "tag taken, please retry"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_attempt_can_succeed_after_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let pool = scratch_pool(&dir).await;
        let pool = &pool;

        let winner = retry_on_contention("insert tag", 2, "tag taken", |attempt| async move {
            let name = if attempt == 1 { "kasir" } else { "admin" };
            pool.execute_unprepared(&format!("INSERT INTO tags (name) VALUES ('{name}')"))
                .await?;
            Ok(attempt)
        })
        .await
        .unwrap();

        assert_eq!(winner, 2);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), ServiceError> =
            retry_on_contention("lookup", 2, "unused", |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::NotFound("Product with ID 9 not found".into()))
            })
            .await;

        assert_matches!(result, Err(ServiceError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn held_write_lock_is_a_serialization_failure_for_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pos.db").display());
        let holder = establish_connection(&url).await.unwrap();
        run_migrations(&holder).await.unwrap();
        let impatient = establish_connection_with_config(&DbConfig {
            url: url.clone(),
            max_connections: 1,
            min_connections: 1,
            busy_timeout: Duration::ZERO,
            ..Default::default()
        })
        .await
        .unwrap();

        let txn = holder.begin().await.unwrap();
        claim_write_lock(&txn).await.unwrap();

        let err = ServiceError::from(claim_write_lock(&impatient).await.unwrap_err());
        assert!(err.is_serialization_failure(), "unexpected error: {err}");
        assert!(err.is_contention());

        txn.rollback().await.unwrap();
        claim_write_lock(&impatient).await.unwrap();
    }

    #[tokio::test]
    async fn migrations_apply_to_fresh_sqlite_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pos.db").display());
        let pool = establish_connection(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
        // Second run is a no-op
        run_migrations(&pool).await.unwrap();
        close_pool(pool).await.unwrap();
    }

    #[test]
    fn db_config_follows_app_config_tuning() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "a_reasonably_long_and_varied_secret_for_pos_tests_42".into(),
            3600,
            "127.0.0.1".into(),
            3000,
            "test".into(),
        );
        cfg.db_max_connections = 3;
        cfg.db_acquire_timeout_secs = 2;
        cfg.db_busy_timeout_ms = 250;

        let db_cfg = DbConfig::from(&cfg);
        assert_eq!(db_cfg.max_connections, 3);
        assert_eq!(db_cfg.acquire_timeout, Duration::from_secs(2));
        assert_eq!(db_cfg.busy_timeout, Duration::from_millis(250));
        assert_eq!(db_cfg.url, "sqlite::memory:");
    }
}
