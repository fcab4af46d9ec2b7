use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use strum_macros::{Display, EnumString};

use kodit_utils::KoditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentType {
    Development,
    Architecture,
    Usage,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSubtype {
    SnippetSummary,
    ApiDocs,
    Physical,
    DatabaseSchema,
    CommitDescription,
    Cookbook,
    Example,
    ExampleSummary,
    Snippet,
}

/// Entity kind an Association binds to (spec §3 "Enrichment").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackableEntity {
    GitCommit,
    GitFile,
    Snippets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub id: i64,
    pub r#type: EnrichmentType,
    pub subtype: EnrichmentSubtype,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode(row: &SqliteRow) -> Result<Enrichment, sqlx::Error> {
    let type_str: String = row.try_get("type")?;
    let subtype_str: String = row.try_get("subtype")?;
    Ok(Enrichment {
        id: row.try_get("id")?,
        r#type: type_str
            .parse()
            .map_err(|_| sqlx::Error::Decode(format!("unknown enrichment type: {type_str}").into()))?,
        subtype: subtype_str
            .parse()
            .map_err(|_| sqlx::Error::Decode(format!("unknown enrichment subtype: {subtype_str}").into()))?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct EnrichmentStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EnrichmentStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an enrichment and attach it to `(entity_type, entity_id)` in
    /// one transaction, so it is always reachable via at least one
    /// Association (spec §3 invariant).
    pub async fn create_with_association(
        &self,
        r#type: EnrichmentType,
        subtype: EnrichmentSubtype,
        content: &str,
        entity_type: TrackableEntity,
        entity_id: &str,
    ) -> Result<Enrichment, KoditError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(KoditError::from)?;
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO enrichments (type, subtype, content, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(r#type.to_string())
        .bind(subtype.to_string())
        .bind(content)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| KoditError::wrap("insert enrichment", e))?;

        sqlx::query(
            "INSERT INTO enrichment_associations (enrichment_id, entity_type, entity_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entity_type.to_string())
        .bind(entity_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| KoditError::wrap("associate enrichment", e))?;

        tx.commit().await.map_err(KoditError::from)?;

        Ok(Enrichment {
            id,
            r#type,
            subtype,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Enrichment>, KoditError> {
        let row = sqlx::query("SELECT * FROM enrichments WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| KoditError::wrap("get enrichment", e))?;
        row.as_ref()
            .map(decode)
            .transpose()
            .map_err(|e| KoditError::wrap("decode enrichment", e))
    }

    pub async fn find_for_entity(
        &self,
        entity_type: TrackableEntity,
        entity_id: &str,
    ) -> Result<Vec<Enrichment>, KoditError> {
        let rows = sqlx::query(
            r#"SELECT e.* FROM enrichments e
               JOIN enrichment_associations a ON a.enrichment_id = e.id
               WHERE a.entity_type = ? AND a.entity_id = ?
               ORDER BY e.created_at ASC"#,
        )
        .bind(entity_type.to_string())
        .bind(entity_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| KoditError::wrap("find enrichments for entity", e))?;
        rows.iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode enrichments", e))
    }

    /// Best-effort batch lookup for multiple snippet ids, used by hybrid
    /// search's enrichment-fetch step (spec §4.8 step 8).
    pub async fn find_for_entities(
        &self,
        entity_type: TrackableEntity,
        entity_ids: &[String],
    ) -> Result<Vec<Enrichment>, KoditError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = entity_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT e.* FROM enrichments e
             JOIN enrichment_associations a ON a.enrichment_id = e.id
             WHERE a.entity_type = ? AND a.entity_id IN ({placeholders})
             ORDER BY e.created_at ASC"
        );
        let mut query = sqlx::query(&sql).bind(entity_type.to_string());
        for id in entity_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(self.pool)
            .await
            .map_err(|e| KoditError::wrap("find enrichments for entities", e))?;
        rows.iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KoditError::wrap("decode enrichments", e))
    }

    /// Deleting an enrichment also deletes its associations (spec §3
    /// invariant).
    pub async fn delete(&self, id: i64) -> Result<(), KoditError> {
        let mut tx = self.pool.begin().await.map_err(KoditError::from)?;
        sqlx::query("DELETE FROM enrichment_associations WHERE enrichment_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete enrichment associations", e))?;
        sqlx::query("DELETE FROM enrichments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| KoditError::wrap("delete enrichment", e))?;
        tx.commit().await.map_err(KoditError::from)?;
        Ok(())
    }
}
