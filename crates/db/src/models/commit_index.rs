use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

/// Idempotency witness for the indexing pipeline: a commit that already has
/// a `Completed` CommitIndex row is skipped on re-scan (spec §4.5/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommitIndexStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitIndex {
    pub commit_sha: String,
    pub status: CommitIndexStatus,
    pub indexed_at: Option<DateTime<Utc>>,
    pub files_processed: i64,
    pub processing_time_seconds: f64,
    pub error_message: Option<String>,
}

fn from_row(row: &SqliteRow) -> Result<CommitIndex, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    Ok(CommitIndex {
        commit_sha: row.try_get("commit_sha")?,
        status: status_str
            .parse()
            .map_err(|_| sqlx::Error::Decode(format!("unknown commit index status: {status_str}").into()))?,
        indexed_at: row.try_get("indexed_at")?,
        files_processed: row.try_get("files_processed")?,
        processing_time_seconds: row.try_get("processing_time_seconds")?,
        error_message: row.try_get("error_message")?,
    })
}

pub struct CommitIndexStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommitIndexStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn mark_pending(&self, commit_sha: &str) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO commit_indexes (commit_sha, status, files_processed)
               VALUES (?, 'pending', 0)
               ON CONFLICT(commit_sha) DO NOTHING"#,
        )
        .bind(commit_sha)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("mark commit index pending", e))?;
        Ok(())
    }

    pub async fn mark_processing(&self, commit_sha: &str) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO commit_indexes (commit_sha, status, files_processed)
               VALUES (?, 'processing', 0)
               ON CONFLICT(commit_sha) DO UPDATE SET status = 'processing', error_message = NULL"#,
        )
        .bind(commit_sha)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("mark commit index processing", e))?;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        commit_sha: &str,
        files_processed: i64,
        processing_time_seconds: f64,
    ) -> Result<(), KoditError> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO commit_indexes (commit_sha, status, indexed_at, files_processed, processing_time_seconds, error_message)
               VALUES (?, 'completed', ?, ?, ?, NULL)
               ON CONFLICT(commit_sha) DO UPDATE SET
                 status = 'completed',
                 indexed_at = excluded.indexed_at,
                 files_processed = excluded.files_processed,
                 processing_time_seconds = excluded.processing_time_seconds,
                 error_message = NULL"#,
        )
        .bind(commit_sha)
        .bind(now)
        .bind(files_processed)
        .bind(processing_time_seconds)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("mark commit index completed", e))?;
        Ok(())
    }

    pub async fn mark_failed(&self, commit_sha: &str, error_message: &str) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO commit_indexes (commit_sha, status, files_processed, error_message)
               VALUES (?, 'failed', 0, ?)
               ON CONFLICT(commit_sha) DO UPDATE SET status = 'failed', error_message = excluded.error_message"#,
        )
        .bind(commit_sha)
        .bind(error_message)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("mark commit index failed", e))?;
        Ok(())
    }

    pub async fn get(&self, commit_sha: &str) -> Result<Option<CommitIndex>, KoditError> {
        let row = sqlx::query("SELECT * FROM commit_indexes WHERE commit_sha = ?")
            .bind(commit_sha)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get commit index", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode commit index", e))
    }

    pub async fn is_completed(&self, commit_sha: &str) -> Result<bool, KoditError> {
        Ok(matches!(
            self.get(commit_sha).await?,
            Some(CommitIndex {
                status: CommitIndexStatus::Completed,
                ..
            })
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_in_memory;

    #[tokio::test]
    async fn completed_skips_on_rescan() {
        let pool = connect_in_memory().await.expect("connect");
        let repos = crate::models::repository::RepositoryStore::new(&pool);
        let repo = repos
            .create("https://example.com/a.git", "example.com_a.git")
            .await
            .expect("create repo");
        let commits = crate::models::commit::CommitStore::new(&pool);
        let sig = crate::models::commit::Signature {
            name: "a".into(),
            email: "a@example.com".into(),
        };
        commits
            .save(&crate::models::commit::Commit {
                sha: "deadbeef".into(),
                repo_id: repo.id,
                parent_sha: None,
                author: sig.clone(),
                committer: sig,
                authored_at: Utc::now(),
                committed_at: Utc::now(),
                message: "init".into(),
                created_at: Utc::now(),
            })
            .await
            .expect("save commit");

        let store = CommitIndexStore::new(&pool);
        assert!(!store.is_completed("deadbeef").await.expect("check"));
        store.mark_completed("deadbeef", 3, 1.2).await.expect("complete");
        assert!(store.is_completed("deadbeef").await.expect("check"));
    }
}
