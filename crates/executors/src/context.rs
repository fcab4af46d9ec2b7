use kodit_db::Task;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

/// Everything a `Handler` needs to execute one task: the pool for any
/// store access, the task itself for logging/payload access, and a
/// cancellation token the worker signals on shutdown. Handlers that loop
/// over several items (files, snippets, enrichment calls) should check
/// `is_cancelled()` between iterations and bail with `KoditError::Cancelled`
/// rather than running to completion after shutdown was requested.
pub struct ExecutionContext<'a> {
    pub pool: &'a SqlitePool,
    pub task: &'a Task,
    pub cancellation: CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    /// Fresh, never-cancelled context. Used directly by tests that don't
    /// exercise cancellation.
    pub fn new(pool: &'a SqlitePool, task: &'a Task) -> Self {
        Self::with_cancellation(pool, task, CancellationToken::new())
    }

    pub fn with_cancellation(pool: &'a SqlitePool, task: &'a Task, cancellation: CancellationToken) -> Self {
        Self { pool, task, cancellation }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
