use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, SqlitePool, Transaction, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

/// Task kinds recognized by the registry and by `EnqueueOperations` (spec
/// §6.1). Unknown operations observed in the queue are fatal-to-the-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CloneRepository,
    FetchRepository,
    ScanBranchesTagsCommits,
    IndexCommit,
    ExtractSnippetsForCommit,
    CreateCodeEmbeddingsForCommit,
    CreateSummaryEnrichmentForCommit,
    CreateSummaryEmbeddingsForCommit,
    CreateArchitectureEnrichmentForCommit,
    CreateCommitDescriptionForCommit,
    CreateDatabaseSchemaForCommit,
    CreateCookbookForCommit,
    CreateApiDocsForCommit,
    DeleteRepository,
    RescanCommit,
}

/// A pending work unit (spec §3 "Task"). Existence implies not-yet-executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub dedup_key: String,
    pub operation: Operation,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task awaiting assignment of an id (not yet persisted).
#[derive(Debug, Clone)]
pub struct NewTask {
    pub dedup_key: String,
    pub operation: Operation,
    pub payload: serde_json::Value,
    pub priority: i64,
}

impl NewTask {
    pub fn new(
        operation: Operation,
        priority: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            dedup_key: dedup_key(operation, &payload),
            operation,
            payload,
            priority,
        }
    }
}

/// Derive a stable dedup key from an operation and its payload: repo-scoped
/// operations key on `repository_id`, commit-scoped ones additionally key on
/// `commit_sha`. This is what makes re-enqueuing the same logical work item
/// an upsert rather than a duplicate.
pub fn dedup_key(operation: Operation, payload: &serde_json::Value) -> String {
    let repo = payload.get("repository_id").and_then(|v| v.as_i64());
    let sha = payload.get("commit_sha").and_then(|v| v.as_str());
    match (repo, sha) {
        (Some(r), Some(s)) => format!("{operation}:{r}:{s}"),
        (Some(r), None) => format!("{operation}:{r}"),
        _ => format!("{operation}:{payload}"),
    }
}

/// Read-only listing filters for `FindPending`/`CountPending`.
#[derive(Debug, Clone, Default)]
pub struct PendingOptions {
    pub operation: Option<Operation>,
}

fn from_row(row: &SqliteRow) -> Result<Task, sqlx::Error> {
    let operation_str: String = row.try_get("operation")?;
    let operation: Operation = operation_str.parse().map_err(|_| sqlx::Error::Decode(
        format!("unknown operation: {operation_str}").into(),
    ))?;
    let payload_text: String = row.try_get("payload")?;
    let payload = serde_json::from_str(&payload_text)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Task {
        id: row.try_get("id")?,
        dedup_key: row.try_get("dedup_key")?,
        operation,
        payload,
        priority: row.try_get("priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct TaskStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert by `dedup_key`. On conflict, overwrite `priority` and
    /// `updated_at` only — `created_at` is preserved so age-based tie-break
    /// in `Dequeue` stays correct.
    pub async fn enqueue(&self, task: NewTask) -> Result<Task, KoditError> {
        let now = Utc::now();
        let payload_text = serde_json::to_string(&task.payload)?;
        sqlx::query(
            r#"INSERT INTO tasks (dedup_key, operation, payload, priority, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(dedup_key) DO UPDATE SET
                   priority = excluded.priority,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&task.dedup_key)
        .bind(task.operation.to_string())
        .bind(&payload_text)
        .bind(task.priority)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("enqueue task", e))?;

        self.get_by_dedup_key(&task.dedup_key)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("task {}", task.dedup_key)))
    }

    /// Atomically enqueue `ops` with strictly decreasing priorities
    /// `basePriority + 10*(len(ops)-i-1)` so the first operation given is
    /// dequeued first, sharing `payload` (spec §4.1).
    pub async fn enqueue_operations(
        &self,
        ops: &[Operation],
        base_priority: i64,
        payload: serde_json::Value,
    ) -> Result<Vec<Task>, KoditError> {
        let mut tx = self.pool.begin().await.map_err(KoditError::from)?;
        let now = Utc::now();
        let payload_text = serde_json::to_string(&payload)?;
        let n = ops.len();
        let mut dedup_keys = Vec::with_capacity(n);
        for (i, op) in ops.iter().enumerate() {
            let priority = base_priority + 10 * (n - i - 1) as i64;
            let key = dedup_key(*op, &payload);
            sqlx::query(
                r#"INSERT INTO tasks (dedup_key, operation, payload, priority, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?)
                   ON CONFLICT(dedup_key) DO UPDATE SET
                       priority = excluded.priority,
                       updated_at = excluded.updated_at"#,
            )
            .bind(&key)
            .bind(op.to_string())
            .bind(&payload_text)
            .bind(priority)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("enqueue operations", e))?;
            dedup_keys.push(key);
        }
        tx.commit().await.map_err(KoditError::from)?;

        let mut tasks = Vec::with_capacity(n);
        for key in dedup_keys {
            if let Some(task) = self.get_by_dedup_key(&key).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Transactionally select the single pending task ordered by
    /// `(priority DESC, created_at ASC)`, delete it, and return it. If the
    /// delete fails the transaction aborts and the task remains pending.
    pub async fn dequeue(&self) -> Result<Option<Task>, KoditError> {
        self.dequeue_filtered(None).await
    }

    pub async fn dequeue_by_operation(&self, operation: Operation) -> Result<Option<Task>, KoditError> {
        self.dequeue_filtered(Some(operation)).await
    }

    async fn dequeue_filtered(&self, operation: Option<Operation>) -> Result<Option<Task>, KoditError> {
        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await.map_err(KoditError::from)?;

        let row = match operation {
            Some(op) => {
                sqlx::query(
                    r#"SELECT * FROM tasks WHERE operation = ?
                       ORDER BY priority DESC, created_at ASC LIMIT 1"#,
                )
                .bind(op.to_string())
                .fetch_optional(&mut *tx)
                .await
            }
            None => {
                sqlx::query(
                    r#"SELECT * FROM tasks ORDER BY priority DESC, created_at ASC LIMIT 1"#,
                )
                .fetch_optional(&mut *tx)
                .await
            }
        }
        .map_err(|e| KoditError::wrap("dequeue task", e))?;

        let Some(row) = row else {
            tx.commit().await.map_err(KoditError::from)?;
            return Ok(None);
        };
        let task = from_row(&row).map_err(|e| KoditError::wrap("decode dequeued task", e))?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete dequeued task", e))?;

        tx.commit().await.map_err(KoditError::from)?;
        Ok(Some(task))
    }

    pub async fn find_pending(&self, options: PendingOptions) -> Result<Vec<Task>, KoditError> {
        let rows = match options.operation {
            Some(op) => {
                sqlx::query("SELECT * FROM tasks WHERE operation = ? ORDER BY priority DESC, created_at ASC")
                    .bind(op.to_string())
                    .fetch_all(self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM tasks ORDER BY priority DESC, created_at ASC")
                    .fetch_all(self.pool)
                    .await
            }
        }
        .map_err(|e| KoditError::wrap("find pending tasks", e))?;

        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode pending tasks", e))
    }

    pub async fn count_pending(&self, options: PendingOptions) -> Result<i64, KoditError> {
        let count: i64 = match options.operation {
            Some(op) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE operation = ?")
                    .bind(op.to_string())
                    .fetch_one(self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
                    .fetch_one(self.pool)
                    .await
            }
        }
        .map_err(|e| KoditError::wrap("count pending tasks", e))?;
        Ok(count)
    }

    pub async fn delete(&self, id: i64) -> Result<(), KoditError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("delete task", e))?;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), KoditError> {
        sqlx::query("DELETE FROM tasks")
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("delete all tasks", e))?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>, KoditError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get task", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode task", e))
    }

    pub async fn get_by_dedup_key(&self, dedup_key: &str) -> Result<Option<Task>, KoditError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE dedup_key = ?")
            .bind(dedup_key)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get task by dedup key", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode task", e))
    }

    pub async fn exists(&self, dedup_key: &str) -> Result<bool, KoditError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE dedup_key = ?")
            .bind(dedup_key)
            .fetch_one(self.pool)
            .await
            .map_err(|e| KoditError::wrap("check task existence", e))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_in_memory;

    async fn setup() -> SqlitePool {
        connect_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn enqueue_dequeue_round_trip() {
        let pool = setup().await;
        let store = TaskStore::new(&pool);
        let payload = serde_json::json!({"repository_id": 1});
        store
            .enqueue(NewTask::new(Operation::CloneRepository, 300, payload))
            .await
            .unwrap();

        let (task, ok) = match store.dequeue().await.unwrap() {
            Some(t) => (Some(t), true),
            None => (None, false),
        };
        assert!(ok);
        let task = task.unwrap();
        assert_eq!(task.operation, Operation::CloneRepository);
        assert_eq!(store.dequeue().await.unwrap().is_none(), true);
    }

    #[tokio::test]
    async fn dedup_upsert_preserves_single_pending_row() {
        let pool = setup().await;
        let store = TaskStore::new(&pool);
        let payload = serde_json::json!({"repository_id": 42});

        store
            .enqueue(NewTask::new(Operation::FetchRepository, 200, payload.clone()))
            .await
            .unwrap();
        store
            .enqueue(NewTask::new(Operation::FetchRepository, 300, payload))
            .await
            .unwrap();

        let count = store.count_pending(PendingOptions::default()).await.unwrap();
        assert_eq!(count, 1);

        let task = store.dequeue().await.unwrap().unwrap();
        assert_eq!(task.priority, 300);
    }

    #[tokio::test]
    async fn priority_then_age_ordering() {
        let pool = setup().await;
        let store = TaskStore::new(&pool);

        store
            .enqueue(NewTask::new(
                Operation::CreateApiDocsForCommit,
                200,
                serde_json::json!({"repository_id": 1, "commit_sha": "a"}),
            ))
            .await
            .unwrap();
        store
            .enqueue(NewTask::new(
                Operation::CreateApiDocsForCommit,
                300,
                serde_json::json!({"repository_id": 1, "commit_sha": "b"}),
            ))
            .await
            .unwrap();

        let first = store.dequeue().await.unwrap().unwrap();
        assert_eq!(first.priority, 300);
        let second = store.dequeue().await.unwrap().unwrap();
        assert_eq!(second.priority, 200);
    }

    #[tokio::test]
    async fn enqueue_operations_assigns_strictly_decreasing_priorities() {
        let pool = setup().await;
        let store = TaskStore::new(&pool);

        let ops = [
            Operation::CloneRepository,
            Operation::ScanBranchesTagsCommits,
        ];
        let tasks = store
            .enqueue_operations(&ops, 200, serde_json::json!({"repository_id": 7}))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);

        let first = store.dequeue().await.unwrap().unwrap();
        assert_eq!(first.operation, Operation::CloneRepository);
        assert_eq!(first.priority, 210);
        let second = store.dequeue().await.unwrap().unwrap();
        assert_eq!(second.operation, Operation::ScanBranchesTagsCommits);
        assert_eq!(second.priority, 200);
    }
}
