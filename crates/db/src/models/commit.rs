use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use kodit_utils::KoditError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// Identified by (repoID, SHA) with SHA globally unique; immutable once
/// saved (spec §3 "Commit").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub repo_id: i64,
    pub parent_sha: Option<String>,
    pub author: Signature,
    pub committer: Signature,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

fn from_row(row: &SqliteRow) -> Result<Commit, sqlx::Error> {
    Ok(Commit {
        sha: row.try_get("commit_sha")?,
        repo_id: row.try_get("repo_id")?,
        parent_sha: row.try_get("parent_commit_sha")?,
        author: Signature {
            name: row.try_get("author_name")?,
            email: row.try_get("author_email")?,
        },
        committer: Signature {
            name: row.try_get("committer_name")?,
            email: row.try_get("committer_email")?,
        },
        authored_at: row.try_get("authored_at")?,
        committed_at: row.try_get("committed_at")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct CommitStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommitStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the commit if absent; a no-op if it is already saved (commits
    /// are immutable once saved, per spec §3).
    pub async fn save(&self, commit: &Commit) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO commits
                 (commit_sha, repo_id, parent_commit_sha, author_name, author_email,
                  committer_name, committer_email, authored_at, committed_at, message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(commit_sha) DO NOTHING"#,
        )
        .bind(&commit.sha)
        .bind(commit.repo_id)
        .bind(&commit.parent_sha)
        .bind(&commit.author.name)
        .bind(&commit.author.email)
        .bind(&commit.committer.name)
        .bind(&commit.committer.email)
        .bind(commit.authored_at)
        .bind(commit.committed_at)
        .bind(&commit.message)
        .bind(commit.created_at)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("save commit", e))?;
        Ok(())
    }

    pub async fn get(&self, sha: &str) -> Result<Option<Commit>, KoditError> {
        let row = sqlx::query("SELECT * FROM commits WHERE commit_sha = ?")
            .bind(sha)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get commit", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode commit", e))
    }

    pub async fn list_for_repo(&self, repo_id: i64) -> Result<Vec<Commit>, KoditError> {
        let rows = sqlx::query("SELECT * FROM commits WHERE repo_id = ? ORDER BY committed_at ASC")
            .bind(repo_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("list commits for repo", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode commits", e))
    }

    pub async fn belongs_to_repo(&self, sha: &str, repo_id: i64) -> Result<bool, KoditError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE commit_sha = ? AND repo_id = ?")
            .bind(sha)
            .bind(repo_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| KoditError::wrap("check commit repo membership", e))?;
        Ok(count > 0)
    }
}
