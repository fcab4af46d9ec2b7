use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

/// Exactly one of branch | tag | commit, or empty (spec §3 "Repository").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingConfig {
    Branch(String),
    Tag(String),
    Commit(String),
    None,
}

impl TrackingConfig {
    fn kind(&self) -> Option<&'static str> {
        match self {
            TrackingConfig::Branch(_) => Some("branch"),
            TrackingConfig::Tag(_) => Some("tag"),
            TrackingConfig::Commit(_) => Some("commit"),
            TrackingConfig::None => Option::None,
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            TrackingConfig::Branch(n) | TrackingConfig::Tag(n) | TrackingConfig::Commit(n) => Some(n),
            TrackingConfig::None => Option::None,
        }
    }

    fn from_columns(kind: Option<String>, name: Option<String>) -> Self {
        match (kind.as_deref(), name) {
            (Some("branch"), Some(n)) => TrackingConfig::Branch(n),
            (Some("tag"), Some(n)) => TrackingConfig::Tag(n),
            (Some("commit"), Some(n)) => TrackingConfig::Commit(n),
            _ => TrackingConfig::None,
        }
    }
}

/// Service-layer state machine surfaced by the Lifecycle (spec §4.9):
/// `pending -> cloning -> cloned -> syncing -> cloned -> deleting`, with
/// `failed` as a terminal error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Pending,
    Cloning,
    Cloned,
    Syncing,
    Deleting,
    Failed,
}

impl RepositoryStatus {
    pub fn can_sync(self) -> bool {
        matches!(self, RepositoryStatus::Cloned)
    }

    pub fn can_delete(self) -> bool {
        !matches!(self, RepositoryStatus::Deleting)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub remote_uri: String,
    pub sanitized_remote_uri: String,
    pub cloned_path: Option<String>,
    pub tracking_config: TrackingConfig,
    pub status: RepositoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn from_row(row: &SqliteRow) -> Result<Repository, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse()
        .map_err(|_| sqlx::Error::Decode(format!("unknown repository status: {status_str}").into()))?;
    Ok(Repository {
        id: row.try_get("id")?,
        remote_uri: row.try_get("remote_uri")?,
        sanitized_remote_uri: row.try_get("sanitized_remote_uri")?,
        cloned_path: row.try_get("cloned_path")?,
        tracking_config: TrackingConfig::from_columns(
            row.try_get("tracking_type")?,
            row.try_get("tracking_name")?,
        ),
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct RepositoryStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RepositoryStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        remote_uri: &str,
        sanitized_remote_uri: &str,
    ) -> Result<Repository, KoditError> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO repositories
                 (sanitized_remote_uri, remote_uri, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(sanitized_remote_uri)
        .bind(remote_uri)
        .bind(RepositoryStatus::Pending.to_string())
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| KoditError::wrap("create repository", e))?;

        self.get(id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {id}")))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Repository>, KoditError> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get repository", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode repository", e))
    }

    pub async fn find_by_remote_uri(&self, sanitized_remote_uri: &str) -> Result<Option<Repository>, KoditError> {
        let row = sqlx::query("SELECT * FROM repositories WHERE sanitized_remote_uri = ?")
            .bind(sanitized_remote_uri)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("find repository by remote uri", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode repository", e))
    }

    pub async fn list(&self) -> Result<Vec<Repository>, KoditError> {
        let rows = sqlx::query("SELECT * FROM repositories ORDER BY created_at ASC")
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("list repositories", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode repositories", e))
    }

    pub async fn set_status(&self, id: i64, status: RepositoryStatus) -> Result<(), KoditError> {
        sqlx::query("UPDATE repositories SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("set repository status", e))?;
        Ok(())
    }

    pub async fn set_cloned_path(&self, id: i64, cloned_path: &str) -> Result<(), KoditError> {
        sqlx::query("UPDATE repositories SET cloned_path = ?, updated_at = ? WHERE id = ?")
            .bind(cloned_path)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("set repository cloned path", e))?;
        Ok(())
    }

    pub async fn set_tracking_config(&self, id: i64, tc: &TrackingConfig) -> Result<(), KoditError> {
        sqlx::query("UPDATE repositories SET tracking_type = ?, tracking_name = ?, updated_at = ? WHERE id = ?")
            .bind(tc.kind())
            .bind(tc.name())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("set repository tracking config", e))?;
        Ok(())
    }

    /// Cascades to branches, tags, commits, and (transitively, via
    /// `CommitStore::delete`) files/snippet-associations/enrichment-
    /// associations/commit-indexes, per spec §3 invariants.
    pub async fn delete(&self, id: i64) -> Result<(), KoditError> {
        let mut tx = self.pool.begin().await.map_err(KoditError::from)?;
        sqlx::query("DELETE FROM branches WHERE repo_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete branches", e))?;
        sqlx::query("DELETE FROM tags WHERE repo_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete tags", e))?;

        let commit_shas: Vec<String> = sqlx::query_scalar("SELECT commit_sha FROM commits WHERE repo_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("list commits for delete", e))?;
        for sha in &commit_shas {
            sqlx::query("DELETE FROM files WHERE commit_sha = ?")
                .bind(sha)
                .execute(&mut *tx)
                .await
                .map_err(|e| KoditError::wrap("delete files", e))?;
            sqlx::query("DELETE FROM snippet_commit_associations WHERE commit_sha = ?")
                .bind(sha)
                .execute(&mut *tx)
                .await
                .map_err(|e| KoditError::wrap("delete snippet associations", e))?;
            sqlx::query(
                "DELETE FROM enrichment_associations WHERE entity_type IN ('git_commit','git_file') AND entity_id = ?",
            )
            .bind(sha)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete enrichment associations", e))?;
            sqlx::query("DELETE FROM commit_indexes WHERE commit_sha = ?")
                .bind(sha)
                .execute(&mut *tx)
                .await
                .map_err(|e| KoditError::wrap("delete commit index", e))?;
        }
        sqlx::query("DELETE FROM commits WHERE repo_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete commits", e))?;
        sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete repository", e))?;

        tx.commit().await.map_err(KoditError::from)?;
        Ok(())
    }
}

/// Derive a safe local directory name from a remote URL by replacing
/// `/ \ : * ? " < > | @` with `_` and stripping common scheme prefixes
/// (spec §4.4 "Cloner").
pub fn sanitize_remote_uri(remote_uri: &str) -> String {
    let without_scheme = remote_uri
        .strip_prefix("https://")
        .or_else(|| remote_uri.strip_prefix("http://"))
        .or_else(|| remote_uri.strip_prefix("git://"))
        .or_else(|| remote_uri.strip_prefix("ssh://"))
        .unwrap_or(remote_uri);

    without_scheme
        .chars()
        .map(|c| {
            if "/\\:*?\"<>|@".contains(c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_scheme_and_replaces_unsafe_chars() {
        assert_eq!(
            sanitize_remote_uri("https://github.com/foo/bar.git"),
            "github.com_foo_bar.git"
        );
        assert_eq!(
            sanitize_remote_uri("git@github.com:foo/bar.git"),
            "git_github.com_foo_bar.git"
        );
    }

    #[test]
    fn status_guards_match_spec() {
        assert!(RepositoryStatus::Cloned.can_sync());
        assert!(!RepositoryStatus::Syncing.can_sync());
        assert!(!RepositoryStatus::Deleting.can_delete());
        assert!(RepositoryStatus::Failed.can_delete());
    }
}
