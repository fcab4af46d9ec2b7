use kodit_db::{NewTask, Operation, PendingOptions, Task, TaskStore};
use kodit_utils::{PriorityBand, Result};
use sqlx::SqlitePool;

/// Thin facade over `TaskStore` that expresses enqueue priority in terms of
/// the spec's named bands (spec §4.1) instead of raw integers.
pub struct TaskQueue<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskQueue<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    fn store(&self) -> TaskStore<'a> {
        TaskStore::new(self.pool)
    }

    pub async fn enqueue(&self, operation: Operation, band: PriorityBand, payload: serde_json::Value) -> Result<Task> {
        self.store()
            .enqueue(NewTask::new(operation, band.value(), payload))
            .await
    }

    pub async fn enqueue_operations(
        &self,
        ops: &[Operation],
        band: PriorityBand,
        payload: serde_json::Value,
    ) -> Result<Vec<Task>> {
        self.store().enqueue_operations(ops, band.value(), payload).await
    }

    pub async fn dequeue(&self) -> Result<Option<Task>> {
        self.store().dequeue().await
    }

    pub async fn dequeue_by_operation(&self, operation: Operation) -> Result<Option<Task>> {
        self.store().dequeue_by_operation(operation).await
    }

    pub async fn count_pending(&self, options: PendingOptions) -> Result<i64> {
        self.store().count_pending(options).await
    }
}
