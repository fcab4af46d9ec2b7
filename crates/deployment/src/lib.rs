use kodit_executors::HandlerRegistry;
use kodit_utils::WorkerConfig;
use sqlx::SqlitePool;

/// What a concrete deployment must provide to run kodit: a database pool and
/// a fully-populated handler registry to drive the worker runtime. Splitting
/// this out of `kodit-local-deployment` leaves room for a non-local
/// deployment (e.g. a shared Postgres-backed queue) to implement the same
/// seam without pulling in `git2`/the filesystem-bound cloner.
pub trait Deployment: Send + Sync {
    fn pool(&self) -> &SqlitePool;
    fn handlers(&self) -> &HandlerRegistry;
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
    }
}
