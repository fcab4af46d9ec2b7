use std::sync::Arc;
use std::time::Duration;

use kodit_db::Operation;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::ExecutionContext;
use crate::registry::{HandlerRegistry, unknown_operation_error};

/// Polls the task queue on a fixed interval and dispatches dequeued tasks to
/// the registered `Handler` (spec §4.2 "Worker Runtime"). A task is deleted
/// from the queue on dequeue regardless of the handler's outcome: success,
/// failure, and unknown-operation all result in the task not being retried
/// automatically. Failures are logged and (when the task carries a
/// `trackable_type`/`trackable_id`) surfaced through the Status Tracker by
/// the handler itself.
pub struct WorkerRuntime {
    pool: SqlitePool,
    registry: Arc<HandlerRegistry>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
    cancellation: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerRuntime {
    pub fn new(pool: SqlitePool, registry: Arc<HandlerRegistry>, poll_interval: Duration) -> Self {
        Self {
            pool,
            registry,
            poll_interval,
            shutdown: Arc::new(Notify::new()),
            cancellation: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the poll loop. A second call is a no-op until `stop` has run.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return;
        }
        let worker = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            worker.run().await;
        }));
    }

    async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("worker runtime shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.process_one().await {
                        error!(error = %e, "worker poll iteration failed");
                    }
                }
            }
        }
    }

    /// Dequeue and execute a single task, if one is pending. Exposed
    /// directly so tests can drive the loop deterministically instead of
    /// racing the poll interval.
    pub async fn process_one(&self) -> kodit_utils::Result<bool> {
        let queue = crate::queue::TaskQueue::new(&self.pool);
        let Some(task) = queue.dequeue().await? else {
            return Ok(false);
        };

        let operation = task.operation;
        let Some(handler) = self.registry.get(operation).await else {
            warn!(%operation, task_id = task.id, "dropping task with no registered handler");
            return Err(unknown_operation_error(operation));
        };

        let ctx = ExecutionContext::with_cancellation(&self.pool, &task, self.cancellation.child_token());
        match handler.execute(&ctx, task.payload.clone()).await {
            Ok(()) => {
                info!(%operation, task_id = task.id, "task completed");
            }
            Err(e) => {
                error!(%operation, task_id = task.id, error = %e, "task failed");
            }
        }
        Ok(true)
    }

    pub async fn dequeue_and_run(&self, operation: Operation) -> kodit_utils::Result<bool> {
        let queue = crate::queue::TaskQueue::new(&self.pool);
        let Some(task) = queue.dequeue_by_operation(operation).await? else {
            return Ok(false);
        };
        let Some(handler) = self.registry.get(operation).await else {
            return Err(unknown_operation_error(operation));
        };
        let ctx = ExecutionContext::with_cancellation(&self.pool, &task, self.cancellation.child_token());
        handler.execute(&ctx, task.payload.clone()).await?;
        Ok(true)
    }

    /// Signal the loop to stop and wait for it to drain its current
    /// iteration before returning. Cancels the token handed to any
    /// in-flight handler so a multi-step handler can observe it between
    /// steps and return `KoditError::Cancelled` instead of running to
    /// completion.
    pub async fn stop(&self) {
        self.shutdown.notify_one();
        self.cancellation.cancel();
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kodit_db::connect_in_memory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::registry::Handler for CountingHandler {
        async fn execute(&self, _ctx: &ExecutionContext<'_>, _payload: serde_json::Value) -> kodit_utils::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CancellationCheckingHandler;

    #[async_trait]
    impl crate::registry::Handler for CancellationCheckingHandler {
        async fn execute(&self, ctx: &ExecutionContext<'_>, _payload: serde_json::Value) -> kodit_utils::Result<()> {
            if ctx.is_cancelled() {
                return Err(kodit_utils::KoditError::Cancelled);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn process_one_dispatches_to_registered_handler() {
        let pool = connect_in_memory().await.expect("connect");
        let queue = crate::queue::TaskQueue::new(&pool);
        queue
            .enqueue(
                Operation::CloneRepository,
                kodit_utils::PriorityBand::UserInitiated,
                serde_json::json!({"repository_id": 1}),
            )
            .await
            .expect("enqueue");

        let count = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register(Operation::CloneRepository, Arc::new(CountingHandler { count: count.clone() }))
            .await;

        let worker = WorkerRuntime::new(pool, registry, Duration::from_secs(1));
        let ran = worker.process_one().await.expect("process");
        assert!(ran);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let ran_again = worker.process_one().await.expect("process empty");
        assert!(!ran_again);
    }

    #[tokio::test]
    async fn unknown_operation_is_fatal_to_task_not_worker() {
        let pool = connect_in_memory().await.expect("connect");
        let queue = crate::queue::TaskQueue::new(&pool);
        queue
            .enqueue(
                Operation::DeleteRepository,
                kodit_utils::PriorityBand::Background,
                serde_json::json!({"repository_id": 1}),
            )
            .await
            .expect("enqueue");

        let registry = Arc::new(HandlerRegistry::new());
        let worker = WorkerRuntime::new(pool, registry, Duration::from_secs(1));
        let result = worker.process_one().await;
        assert!(result.is_err());

        // The task was removed from the queue even though no handler ran.
        let ran_again = worker.process_one().await.expect("process empty");
        assert!(!ran_again);
    }

    #[tokio::test]
    async fn stop_cancels_the_token_handed_to_the_next_task() {
        let pool = connect_in_memory().await.expect("connect");
        let queue = crate::queue::TaskQueue::new(&pool);
        queue
            .enqueue(
                Operation::CloneRepository,
                kodit_utils::PriorityBand::UserInitiated,
                serde_json::json!({"repository_id": 1}),
            )
            .await
            .expect("enqueue");

        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register(Operation::CloneRepository, Arc::new(CancellationCheckingHandler))
            .await;

        let worker = WorkerRuntime::new(pool, registry, Duration::from_secs(1));
        worker.stop().await;

        // `dequeue_and_run` propagates the handler's own error, unlike
        // `process_one` which only logs it, so it's the path that surfaces
        // what the handler observed.
        let result = worker.dequeue_and_run(Operation::CloneRepository).await;
        assert!(matches!(result, Err(kodit_utils::KoditError::Cancelled)));
    }
}
