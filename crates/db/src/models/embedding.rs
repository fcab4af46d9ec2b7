use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

/// Which index an embedding belongs to (spec §4.7 "Index Builders").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Code,
    Text,
}

/// Keyed by (snippet_sha, modality); a snippet has at most one embedding
/// per modality (spec §3 "Embedding").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub snippet_sha: String,
    pub modality: Modality,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn from_row(row: &SqliteRow) -> Result<Embedding, sqlx::Error> {
    let modality_str: String = row.try_get("modality")?;
    let vector_bytes: Vec<u8> = row.try_get("vector")?;
    Ok(Embedding {
        snippet_sha: row.try_get("snippet_sha")?,
        modality: modality_str
            .parse()
            .map_err(|_| sqlx::Error::Decode(format!("unknown modality: {modality_str}").into()))?,
        vector: decode_vector(&vector_bytes),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct EmbeddingStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EmbeddingStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Recomputing a snippet's embedding replaces the prior vector for that
    /// modality (spec §4.7 write-through cache).
    pub async fn upsert(&self, snippet_sha: &str, modality: Modality, vector: &[f32]) -> Result<Embedding, KoditError> {
        let now = Utc::now();
        let bytes = encode_vector(vector);
        sqlx::query(
            r#"INSERT INTO embeddings (snippet_sha, modality, vector, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(snippet_sha, modality) DO UPDATE SET
                 vector = excluded.vector,
                 updated_at = excluded.updated_at"#,
        )
        .bind(snippet_sha)
        .bind(modality.to_string())
        .bind(&bytes)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| KoditError::wrap("upsert embedding", e))?;

        Ok(Embedding {
            snippet_sha: snippet_sha.to_string(),
            modality,
            vector: vector.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, snippet_sha: &str, modality: Modality) -> Result<Option<Embedding>, KoditError> {
        let row = sqlx::query("SELECT * FROM embeddings WHERE snippet_sha = ? AND modality = ?")
            .bind(snippet_sha)
            .bind(modality.to_string())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get embedding", e))?;
        row.as_ref()
            .map(from_row)
            .transpose()
            .map_err(|e| KoditError::wrap("decode embedding", e))
    }

    /// Introspection query backing `EmbeddingsForSnippets` (spec §4.7): which
    /// of the given snippets already have an embedding for `modality`.
    pub async fn embeddings_for_snippets(
        &self,
        snippet_shas: &[String],
        modality: Modality,
    ) -> Result<Vec<Embedding>, KoditError> {
        if snippet_shas.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = snippet_shas.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM embeddings WHERE modality = ? AND snippet_sha IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(modality.to_string());
        for sha in snippet_shas {
            query = query.bind(sha);
        }
        let rows = query
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("fetch embeddings for snippets", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode embeddings", e))
    }

    /// Full scan of one modality's embeddings, backing the brute-force
    /// vector search a single-host SQLite deployment falls back to.
    pub async fn all_for_modality(&self, modality: Modality) -> Result<Vec<Embedding>, KoditError> {
        let rows = sqlx::query("SELECT * FROM embeddings WHERE modality = ?")
            .bind(modality.to_string())
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("scan embeddings for modality", e))?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode embeddings", e))
    }

    pub async fn delete_by_snippet(&self, snippet_sha: &str) -> Result<(), KoditError> {
        sqlx::query("DELETE FROM embeddings WHERE snippet_sha = ?")
            .bind(snippet_sha)
            .execute(self.pool)
            .await
            .map_err(|e| KoditError::wrap("delete embeddings for snippet", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_round_trips_through_bytes() {
        let original = vec![0.5_f32, -1.25, 3.0];
        let bytes = encode_vector(&original);
        assert_eq!(decode_vector(&bytes), original);
    }
}
