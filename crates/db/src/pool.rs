use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;

use kodit_utils::KoditError;

/// Open (creating if absent) a SQLite database at `database_url` and run
/// migrations. `database_url` is an `sqlite://path` URI or `:memory:`.
pub async fn connect(database_url: &str) -> Result<SqlitePool, KoditError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| KoditError::invalid_argument(format!("invalid database url: {e}")))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(KoditError::from)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| KoditError::Transient(format!("run migrations: {e}")))?;
    Ok(pool)
}

/// Convenience constructor for tests: an in-memory database with migrations
/// applied.
pub async fn connect_in_memory() -> Result<SqlitePool, KoditError> {
    connect("sqlite::memory:").await
}
