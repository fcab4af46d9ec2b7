use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use kodit_utils::KoditError;

/// (commitSHA, path) primary key; scoped to a single commit (spec §3
/// "File").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub commit_sha: String,
    pub path: String,
    pub blob_sha: String,
    pub mime_type: String,
    pub extension: String,
    pub language: String,
    pub size: i64,
}

fn from_row(row: &SqliteRow) -> Result<File, sqlx::Error> {
    Ok(File {
        commit_sha: row.try_get("commit_sha")?,
        path: row.try_get("path")?,
        blob_sha: row.try_get("blob_sha")?,
        mime_type: row.try_get("mime_type")?,
        extension: row.try_get("extension")?,
        language: row.try_get("language")?,
        size: row.try_get("size")?,
    })
}

pub struct FileStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Re-scanning a commit replaces its file set entirely (spec §3
    /// "File").
    pub async fn replace_for_commit(&self, commit_sha: &str, files: &[File]) -> Result<(), KoditError> {
        let mut tx = self.pool.begin().await.map_err(KoditError::from)?;
        sqlx::query("DELETE FROM files WHERE commit_sha = ?")
            .bind(commit_sha)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("clear files for commit", e))?;
        for file in files {
            sqlx::query(
                r#"INSERT INTO files (commit_sha, path, blob_sha, mime_type, extension, language, size)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&file.commit_sha)
            .bind(&file.path)
            .bind(&file.blob_sha)
            .bind(&file.mime_type)
            .bind(&file.extension)
            .bind(&file.language)
            .bind(file.size)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("insert file", e))?;
        }
        tx.commit().await.map_err(KoditError::from)?;
        Ok(())
    }

    pub async fn list_for_commit(&self, commit_sha: &str) -> Result<Vec<File>, KoditError> {
        let rows = sqlx::query("SELECT * FROM files WHERE commit_sha = ? ORDER BY path ASC")
            .bind(commit_sha)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("list files for commit", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode files", e))
    }

    /// One query per SHA in `shas`, matching the adapter's own per-SHA call
    /// contract (spec §4.4 "FilesForCommitsBatch").
    pub async fn list_for_commits_batch(&self, shas: &[String]) -> Result<Vec<File>, KoditError> {
        let mut all = Vec::new();
        for sha in shas {
            all.extend(self.list_for_commit(sha).await?);
        }
        Ok(all)
    }
}
