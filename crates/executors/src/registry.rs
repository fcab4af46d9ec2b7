use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kodit_db::Operation;
use kodit_utils::{KoditError, Result};
use tokio::sync::RwLock;

use crate::context::ExecutionContext;

/// Executes the work for one `Operation`. Implementations live in
/// `kodit-services` and are wired into a `HandlerRegistry` at startup.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: serde_json::Value) -> Result<()>;
}

/// Instance-scoped map from `Operation` to its `Handler`. Written once at
/// startup; read on every dequeue, so reads never contend with each other.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<Operation, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, operation: Operation, handler: Arc<dyn Handler>) {
        self.handlers.write().await.insert(operation, handler);
    }

    pub async fn get(&self, operation: Operation) -> Option<Arc<dyn Handler>> {
        self.handlers.read().await.get(&operation).cloned()
    }
}

/// Unknown operations observed on the queue are fatal to that task: there
/// is no handler to retry into, so the task is dropped and logged rather
/// than looped on forever (spec §4.2).
pub fn unknown_operation_error(operation: Operation) -> KoditError {
    KoditError::InvalidArgument(format!("no handler registered for operation {operation}"))
}
