use std::collections::HashMap;

use kodit_db::{Enrichment, EnrichmentStore, Snippet, SnippetStore, TrackableEntity};
use kodit_utils::SearchConfig;
use tracing::warn;

use crate::index::{CodeIndex, TextIndex, VectorResult};

const FUSION_FANOUT: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct MultiRequest {
    pub top_k: Option<usize>,
    pub text_query: Option<String>,
    pub code_query: Option<String>,
    pub keywords: Vec<String>,
    pub filters: HashMap<String, String>,
}

impl MultiRequest {
    fn top_k(&self, config: &SearchConfig) -> usize {
        self.top_k.unwrap_or(config.default_top_k)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultiSearchResult {
    pub snippets: Vec<Snippet>,
    pub enrichments: Vec<Enrichment>,
    pub fused_scores: HashMap<String, f64>,
}

/// One ranked hit against a single index, before fusion.
#[derive(Debug, Clone)]
struct RankedHit {
    snippet_sha: String,
    rank: usize,
    score: f32,
}

fn rank(results: &[VectorResult]) -> Vec<RankedHit> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| RankedHit {
            snippet_sha: r.snippet_sha.clone(),
            rank: i + 1,
            score: r.score,
        })
        .collect()
}

/// Reciprocal Rank Fusion over whichever lists are non-empty (spec §4.8
/// step 5). `k` defaults to 60. Ties break on the higher individual-list
/// score.
pub fn reciprocal_rank_fusion(lists: &[Vec<RankedHit>], k: f64) -> Vec<(String, f64, f32)> {
    let non_empty: Vec<&Vec<RankedHit>> = lists.iter().filter(|l| !l.is_empty()).collect();
    if non_empty.len() == 1 {
        return non_empty[0]
            .iter()
            .map(|hit| (hit.snippet_sha.clone(), 1.0 / (k + hit.rank as f64), hit.score))
            .collect();
    }

    let mut fused: HashMap<String, (f64, f32)> = HashMap::new();
    for list in &non_empty {
        for hit in list.iter() {
            let entry = fused.entry(hit.snippet_sha.clone()).or_insert((0.0, f32::MIN));
            entry.0 += 1.0 / (k + hit.rank as f64);
            if hit.score > entry.1 {
                entry.1 = hit.score;
            }
        }
    }

    let mut out: Vec<(String, f64, f32)> = fused.into_iter().map(|(id, (score, best))| (id, score, best)).collect();
    out.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.0.cmp(&b.0))
    });
    out
}

/// Hybrid search over the text and code vector indexes (spec §4.8).
pub struct HybridSearch<'a> {
    snippets: SnippetStore<'a>,
    enrichments: EnrichmentStore<'a>,
    text_index: &'a TextIndex<'a>,
    code_index: &'a CodeIndex<'a>,
    config: SearchConfig,
}

impl<'a> HybridSearch<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool, text_index: &'a TextIndex<'a>, code_index: &'a CodeIndex<'a>) -> Self {
        Self::with_config(pool, text_index, code_index, SearchConfig::default())
    }

    pub fn with_config(
        pool: &'a sqlx::SqlitePool,
        text_index: &'a TextIndex<'a>,
        code_index: &'a CodeIndex<'a>,
        config: SearchConfig,
    ) -> Self {
        Self {
            snippets: SnippetStore::new(pool),
            enrichments: EnrichmentStore::new(pool),
            text_index,
            code_index,
            config,
        }
    }

    pub async fn search(&self, request: &MultiRequest) -> MultiSearchResult {
        let text_empty = request.text_query.as_deref().unwrap_or("").is_empty();
        let code_empty = request.code_query.as_deref().unwrap_or("").is_empty();
        if text_empty && code_empty {
            return MultiSearchResult::default();
        }

        let top_k = request.top_k(&self.config);
        let fanout = top_k * FUSION_FANOUT;

        let text_hits = if !text_empty {
            match self.text_index.search(request.text_query.as_deref().unwrap_or(""), fanout).await {
                Ok(results) => rank(&results),
                Err(e) => {
                    warn!(error = %e, "text index search failed, degrading to empty");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let code_hits = if !code_empty {
            match self.code_index.search(request.code_query.as_deref().unwrap_or(""), fanout).await {
                Ok(results) => rank(&results),
                Err(e) => {
                    warn!(error = %e, "code index search failed, degrading to empty");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let fused = reciprocal_rank_fusion(&[text_hits, code_hits], self.config.rrf_k);
        let top: Vec<(String, f64)> = fused.into_iter().take(top_k).map(|(id, score, _)| (id, score)).collect();
        let ids: Vec<String> = top.iter().map(|(id, _)| id.clone()).collect();

        let mut snippets = match self.snippets.by_ids(&ids).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snippet materialization failed, returning empty result");
                return MultiSearchResult::default();
            }
        };
        let order: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        snippets.sort_by_key(|s| order.get(s.sha.as_str()).copied().unwrap_or(usize::MAX));

        let enrichments = match self
            .enrichments
            .find_for_entities(TrackableEntity::Snippets, &ids)
            .await
        {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "enrichment fetch failed, returning snippets without enrichments");
                Vec::new()
            }
        };

        let fused_scores: HashMap<String, f64> = top.into_iter().collect();

        MultiSearchResult {
            snippets,
            enrichments,
            fused_scores,
        }
    }

    /// Direct-hit bypass: materialized in index order, no fusion (spec §4.8
    /// final paragraph).
    pub async fn search_text(&self, query: &str, top_k: usize) -> Vec<Snippet> {
        self.search_single(self.text_index.search(query, top_k).await).await
    }

    pub async fn search_code(&self, query: &str, top_k: usize) -> Vec<Snippet> {
        self.search_single(self.code_index.search(query, top_k).await).await
    }

    async fn search_single(&self, results: crate::index::Result<Vec<VectorResult>>) -> Vec<Snippet> {
        let hits = match results {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "direct index search failed, returning empty result");
                return Vec::new();
            }
        };
        let ids: Vec<String> = hits.iter().map(|h| h.snippet_sha.clone()).collect();
        let mut snippets = match self.snippets.by_ids(&ids).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snippet materialization failed, returning empty result");
                return Vec::new();
            }
        };
        let order: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        snippets.sort_by_key(|s| order.get(s.sha.as_str()).copied().unwrap_or(usize::MAX));
        snippets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(sha: &str, rank: usize, score: f32) -> RankedHit {
        RankedHit {
            snippet_sha: sha.to_string(),
            rank,
            score,
        }
    }

    #[test]
    fn single_non_empty_list_passes_through_unfused() {
        let list = vec![hit("a", 1, 0.9), hit("b", 2, 0.5)];
        let fused = reciprocal_rank_fusion(&[list, Vec::new()], 60.0);
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
    }

    #[test]
    fn fusion_favors_items_ranked_highly_in_both_lists() {
        let text = vec![hit("a", 1, 0.9), hit("b", 2, 0.8)];
        let code = vec![hit("b", 1, 0.7), hit("a", 3, 0.3)];
        let fused = reciprocal_rank_fusion(&[text, code], 60.0);
        // b: 1/(60+2) + 1/(60+1) ; a: 1/(60+1) + 1/(60+3)
        let b_score = fused.iter().find(|(id, _, _)| id == "b").expect("b present").1;
        let a_score = fused.iter().find(|(id, _, _)| id == "a").expect("a present").1;
        assert!(b_score > a_score);
    }

    #[test]
    fn empty_lists_fuse_to_empty() {
        let fused = reciprocal_rank_fusion(&[Vec::new(), Vec::new()], 60.0);
        assert!(fused.is_empty());
    }
}
