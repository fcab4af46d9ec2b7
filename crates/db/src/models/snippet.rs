use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use kodit_utils::KoditError;

/// Content-addressed by SHA of its normalized content (spec §3 "Snippet").
/// Identical text across commits resolves to the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub sha: String,
    pub content: String,
    pub extension: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SHA-256 of the snippet's normalized content, hex-encoded. "Normalized"
/// here means trailing-whitespace-trimmed lines joined with `\n`, so
/// cosmetic reformatting that doesn't change tokens still reuses the row.
pub fn content_sha(content: &str) -> String {
    let normalized: String = content
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn from_row(row: &SqliteRow) -> Result<Snippet, sqlx::Error> {
    Ok(Snippet {
        sha: row.try_get("sha")?,
        content: row.try_get("content")?,
        extension: row.try_get("extension")?,
        language: row.try_get("language")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct SnippetStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SnippetStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by content SHA: concurrent inserts of the
    /// same content resolve to the existing row (spec §5).
    pub async fn upsert(&self, content: &str, extension: &str, language: &str) -> Result<Snippet, KoditError> {
        let sha = content_sha(content);
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO snippets (sha, content, extension, language, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(sha) DO UPDATE SET updated_at = excluded.updated_at"#,
        )
        .bind(&sha)
        .bind(content)
        .bind(extension)
        .bind(language)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("upsert snippet", e))?;

        self.get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("snippet {sha}")))
    }

    pub async fn get(&self, sha: &str) -> Result<Option<Snippet>, KoditError> {
        let row = sqlx::query("SELECT * FROM snippets WHERE sha = ?")
            .bind(sha)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get snippet", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode snippet", e))
    }

    pub async fn by_ids(&self, shas: &[String]) -> Result<Vec<Snippet>, KoditError> {
        if shas.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = shas.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM snippets WHERE sha IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for sha in shas {
            query = query.bind(sha);
        }
        let rows = query
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("fetch snippets by ids", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode snippets", e))
    }

    pub async fn associate_with_commit(&self, snippet_sha: &str, commit_sha: &str) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO snippet_commit_associations (snippet_sha, commit_sha)
               VALUES (?, ?)
               ON CONFLICT(snippet_sha, commit_sha) DO NOTHING"#,
        )
        .bind(snippet_sha)
        .bind(commit_sha)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("associate snippet with commit", e))?;
        Ok(())
    }

    pub async fn record_derivation(&self, snippet_sha: &str, commit_sha: &str, file_path: &str) -> Result<(), KoditError> {
        sqlx::query(
            "INSERT INTO snippet_file_derivations (snippet_sha, commit_sha, file_path) VALUES (?, ?, ?)",
        )
        .bind(snippet_sha)
        .bind(commit_sha)
        .bind(file_path)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("record snippet derivation", e))?;
        Ok(())
    }

    pub async fn list_for_commit(&self, commit_sha: &str) -> Result<Vec<Snippet>, KoditError> {
        let rows = sqlx::query(
            r#"SELECT s.* FROM snippets s
               JOIN snippet_commit_associations a ON a.snippet_sha = s.sha
               WHERE a.commit_sha = ?
               ORDER BY s.sha ASC"#,
        )
        .bind(commit_sha)
        .fetch_all(self.pool)
        .await
        .map_err(|e| KoditError::wrap("list snippets for commit", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode snippets", e))
    }

    /// Drop a commit's snippet associations without touching the shared
    /// snippet rows themselves (spec §3 invariant: deleting a commit never
    /// deletes shared snippets).
    pub async fn clear_commit_associations(&self, commit_sha: &str) -> Result<(), KoditError> {
        sqlx::query("DELETE FROM snippet_commit_associations WHERE commit_sha = ?")
            .bind(commit_sha)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("clear snippet associations", e))?;
        sqlx::query("DELETE FROM snippet_file_derivations WHERE commit_sha = ?")
            .bind(commit_sha)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("clear snippet derivations", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_sha_ignores_trailing_whitespace() {
        let a = content_sha("fn main() {}   \n");
        let b = content_sha("fn main() {}\n");
        assert_eq!(a, b);
    }

    #[test]
    fn content_sha_distinguishes_different_content() {
        assert_ne!(content_sha("a"), content_sha("b"));
    }
}
