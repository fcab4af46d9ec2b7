use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use kodit_utils::KoditError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub message: String,
    pub tagger: String,
    pub tagged_at: DateTime<Utc>,
}

/// (repoID, name) primary key (spec §3 "Tag").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub repo_id: i64,
    pub name: String,
    pub target_commit_sha: String,
    pub annotation: Option<Annotation>,
}

fn from_row(row: &SqliteRow) -> Result<Tag, sqlx::Error> {
    let message: Option<String> = row.try_get("annotation_message")?;
    let tagger: Option<String> = row.try_get("annotation_tagger")?;
    let tagged_at: Option<DateTime<Utc>> = row.try_get("annotation_tagged_at")?;
    let annotation = match (message, tagger, tagged_at) {
        (Some(message), Some(tagger), Some(tagged_at)) => Some(Annotation {
            message,
            tagger,
            tagged_at,
        }),
        _ => None,
    };
    Ok(Tag {
        repo_id: row.try_get("repo_id")?,
        name: row.try_get("name")?,
        target_commit_sha: row.try_get("target_commit_sha")?,
        annotation,
    })
}

pub struct TagStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TagStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, tag: &Tag) -> Result<(), KoditError> {
        sqlx::query(
            r#"INSERT INTO tags
                 (repo_id, name, target_commit_sha, annotation_message, annotation_tagger, annotation_tagged_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(repo_id, name) DO UPDATE SET
                 target_commit_sha = excluded.target_commit_sha,
                 annotation_message = excluded.annotation_message,
                 annotation_tagger = excluded.annotation_tagger,
                 annotation_tagged_at = excluded.annotation_tagged_at"#,
        )
        .bind(tag.repo_id)
        .bind(&tag.name)
        .bind(&tag.target_commit_sha)
        .bind(tag.annotation.as_ref().map(|a| &a.message))
        .bind(tag.annotation.as_ref().map(|a| &a.tagger))
        .bind(tag.annotation.as_ref().map(|a| a.tagged_at))
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("upsert tag", e))?;
        Ok(())
    }

    pub async fn list_for_repo(&self, repo_id: i64) -> Result<Vec<Tag>, KoditError> {
        let rows = sqlx::query("SELECT * FROM tags WHERE repo_id = ? ORDER BY name ASC")
            .bind(repo_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("list tags", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode tags", e))
    }
}
