use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Reporting record for a running/completed operation (spec §3 "Status").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub operation: String,
    pub state: StatusState,
    pub total: Option<i64>,
    pub current: Option<i64>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub parent: Option<String>,
    pub trackable_type: Option<String>,
    pub trackable_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Status {
    /// Own (not parent-aggregated) completion percent: `current/total` for a
    /// child-less node. Aggregation over children is the tracker's job.
    pub fn own_completion_percent(&self) -> f64 {
        match (self.current, self.total) {
            (Some(c), Some(t)) if t > 0 => (c as f64 / t as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

fn from_row(row: &SqliteRow) -> Result<Status, sqlx::Error> {
    let state_str: String = row.try_get("state")?;
    let state: StatusState = state_str
        .parse()
        .map_err(|_| sqlx::Error::Decode(format!("unknown status state: {state_str}").into()))?;
    Ok(Status {
        id: row.try_get("id")?,
        operation: row.try_get("operation")?,
        state,
        total: row.try_get("total")?,
        current: row.try_get("current")?,
        message: row.try_get("message")?,
        error: row.try_get("error")?,
        parent: row.try_get("parent")?,
        trackable_type: row.try_get("trackable_type")?,
        trackable_id: row.try_get("trackable_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct StatusStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StatusStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, status: &Status) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO task_status
                 (id, operation, state, total, current, message, error, parent,
                  trackable_type, trackable_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 state = excluded.state,
                 total = excluded.total,
                 current = excluded.current,
                 message = excluded.message,
                 error = excluded.error,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&status.id)
        .bind(&status.operation)
        .bind(status.state.to_string())
        .bind(status.total)
        .bind(status.current)
        .bind(&status.message)
        .bind(&status.error)
        .bind(&status.parent)
        .bind(&status.trackable_type)
        .bind(&status.trackable_id)
        .bind(status.created_at)
        .bind(status.updated_at)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("upsert status", e))?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Status>, KoditError> {
        let row = sqlx::query("SELECT * FROM task_status WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get status", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode status", e))
    }

    /// All statuses for a given trackable entity (e.g. a repository),
    /// unordered; hierarchy reconstruction happens in the service layer.
    pub async fn find_by_trackable(
        &self,
        trackable_type: &str,
        trackable_id: &str,
    ) -> Result<Vec<Status>, KoditError> {
        let rows = sqlx::query("SELECT * FROM task_status WHERE trackable_type = ? AND trackable_id = ?")
            .bind(trackable_type)
            .bind(trackable_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("find statuses by trackable", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode statuses", e))
    }

    pub async fn find_children(&self, parent_id: &str) -> Result<Vec<Status>, KoditError> {
        let rows = sqlx::query("SELECT * FROM task_status WHERE parent = ?")
            .bind(parent_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("find child statuses", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode statuses", e))
    }
}
