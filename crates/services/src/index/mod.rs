use std::sync::Arc;

use kodit_db::{Embedding, EmbeddingStore, Modality};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Db(#[from] kodit_utils::KoditError),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl From<IndexError> for kodit_utils::KoditError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Db(e) => e,
        }
    }
}

/// Turns text (snippet content or an enrichment summary) into a fixed-width
/// vector. The real model lives outside this workspace; this is the seam.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

const HASH_EMBEDDING_DIMS: usize = 32;

/// Deterministic stand-in for a real embedding model (SPEC_FULL §2
/// supplement): SHA-256 the text, then scatter each output byte into a
/// `[-1.0, 1.0]` component so cosine similarity is a meaningful, if
/// semantically shallow, proxy in tests.
#[derive(Default)]
pub struct HashEmbeddingProvider;

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        digest
            .iter()
            .cycle()
            .take(HASH_EMBEDDING_DIMS)
            .map(|b| (*b as f32 / 127.5) - 1.0)
            .collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone)]
pub struct VectorResult {
    pub snippet_sha: String,
    pub score: f32,
}

/// Capability set a concrete vector backend must implement (spec §6.4).
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query_vector: &[f32], modality: Modality, top_k: usize) -> Result<Vec<VectorResult>>;
    async fn embeddings_for_snippets(&self, snippet_shas: &[String], modality: Modality) -> Result<Vec<Embedding>>;
    async fn index(&self, snippet_sha: &str, modality: Modality, vector: Vec<f32>) -> Result<()>;
    async fn delete_by_snippet(&self, snippet_sha: &str) -> Result<()>;
}

/// Scans every stored embedding of a modality and ranks by cosine
/// similarity. SQLite has no native vector index, so this brute-force scan
/// stands in for one (acceptable at the scale a single-host queue implies).
pub struct SqliteVectorStore<'a> {
    embeddings: EmbeddingStore<'a>,
}

impl<'a> SqliteVectorStore<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self {
            embeddings: EmbeddingStore::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl<'a> VectorStore for SqliteVectorStore<'a> {
    async fn search(&self, query_vector: &[f32], modality: Modality, top_k: usize) -> Result<Vec<VectorResult>> {
        let all = self.embeddings.all_for_modality(modality).await?;
        let mut scored: Vec<VectorResult> = all
            .into_iter()
            .map(|e| VectorResult {
                score: cosine_similarity(query_vector, &e.vector),
                snippet_sha: e.snippet_sha,
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn embeddings_for_snippets(&self, snippet_shas: &[String], modality: Modality) -> Result<Vec<Embedding>> {
        Ok(self.embeddings.embeddings_for_snippets(snippet_shas, modality).await?)
    }

    async fn index(&self, snippet_sha: &str, modality: Modality, vector: Vec<f32>) -> Result<()> {
        self.embeddings.upsert(snippet_sha, modality, &vector).await?;
        Ok(())
    }

    async fn delete_by_snippet(&self, snippet_sha: &str) -> Result<()> {
        self.embeddings.delete_by_snippet(snippet_sha).await?;
        Ok(())
    }
}

/// Write-through cache over the snippet store for `modality=code` (spec
/// §4.7 "Code vector index").
pub struct CodeIndex<'a> {
    store: Arc<dyn VectorStore + 'a>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl<'a> CodeIndex<'a> {
    pub fn new(store: Arc<dyn VectorStore + 'a>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Stale embeddings for a re-scanned commit's snippets are replaced by
    /// simply upserting again under the same (snippet_sha, modality) key.
    pub async fn index_snippet(&self, snippet_sha: &str, content: &str) -> Result<()> {
        let vector = self.provider.embed(content);
        self.store.index(snippet_sha, Modality::Code, vector).await
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorResult>> {
        let vector = self.provider.embed(query);
        self.store.search(&vector, Modality::Code, top_k).await
    }

    pub async fn embeddings_for_snippets(&self, snippet_shas: &[String]) -> Result<Vec<Embedding>> {
        self.store.embeddings_for_snippets(snippet_shas, Modality::Code).await
    }
}

/// Write-through cache over `snippet_summary` enrichment content for
/// `modality=text` (spec §4.7 "Text vector index"), keyed by the summary's
/// associated snippet id.
pub struct TextIndex<'a> {
    store: Arc<dyn VectorStore + 'a>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl<'a> TextIndex<'a> {
    pub fn new(store: Arc<dyn VectorStore + 'a>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn index_summary(&self, snippet_sha: &str, summary_text: &str) -> Result<()> {
        let vector = self.provider.embed(summary_text);
        self.store.index(snippet_sha, Modality::Text, vector).await
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorResult>> {
        let vector = self.provider.embed(query);
        self.store.search(&vector, Modality::Text, top_k).await
    }

    pub async fn embeddings_for_snippets(&self, snippet_shas: &[String]) -> Result<Vec<Embedding>> {
        self.store.embeddings_for_snippets(snippet_shas, Modality::Text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic_and_fixed_width() {
        let provider = HashEmbeddingProvider;
        let a = provider.embed("fn foo() {}");
        let b = provider.embed("fn foo() {}");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_EMBEDDING_DIMS);
    }

    #[test]
    fn different_text_yields_different_vectors() {
        let provider = HashEmbeddingProvider;
        assert_ne!(provider.embed("alpha"), provider.embed("beta"));
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = HashEmbeddingProvider.embed("same text");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_has_zero_similarity() {
        let zeros = vec![0.0_f32; HASH_EMBEDDING_DIMS];
        let v = HashEmbeddingProvider.embed("x");
        assert_eq!(cosine_similarity(&zeros, &v), 0.0);
    }
}
