use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use kodit_utils::KoditError;

/// (repoID, name) primary key (spec §3 "Branch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub repo_id: i64,
    pub name: String,
    pub head_commit_sha: String,
    pub is_default: bool,
}

fn from_row(row: &SqliteRow) -> Result<Branch, sqlx::Error> {
    let is_default: i64 = row.try_get("is_default")?;
    Ok(Branch {
        repo_id: row.try_get("repo_id")?,
        name: row.try_get("name")?,
        head_commit_sha: row.try_get("head_commit_sha")?,
        is_default: is_default != 0,
    })
}

pub struct BranchStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BranchStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Updated whenever scan observes a new head (spec §3 "Branch").
    pub async fn upsert(&self, branch: &Branch) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO branches (repo_id, name, head_commit_sha, is_default)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(repo_id, name) DO UPDATE SET
                 head_commit_sha = excluded.head_commit_sha,
                 is_default = excluded.is_default"#,
        )
        .bind(branch.repo_id)
        .bind(&branch.name)
        .bind(&branch.head_commit_sha)
        .bind(branch.is_default)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("upsert branch", e))?;
        Ok(())
    }

    pub async fn list_for_repo(&self, repo_id: i64) -> Result<Vec<Branch>, KoditError> {
        let rows = sqlx::query("SELECT * FROM branches WHERE repo_id = ? ORDER BY name ASC")
            .bind(repo_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("list branches", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode branches", e))
    }

    pub async fn default_branch(&self, repo_id: i64) -> Result<Option<Branch>, KoditError> {
        let row = sqlx::query("SELECT * FROM branches WHERE repo_id = ? AND is_default = 1")
            .bind(repo_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("find default branch", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode branch", e))
    }
}
