use crate::corpus::SectionCorpus;
use crate::traits::GraphIndex;
use crate::vector_index::VectorRetriever;
use crate::{GraphContext, RetrievalResult, RetrieverOptions, SearchError, SearchHit};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Vector search expanded through the concept graph.
pub struct HybridRetriever<G>
where
    G: GraphIndex,
{
    vector: VectorRetriever,
    graph: G,
    options: RetrieverOptions,
}

impl<G> HybridRetriever<G>
where
    G: GraphIndex,
{
    pub fn new(vector: VectorRetriever, graph: G) -> Self {
        Self {
            vector,
            graph,
            options: RetrieverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RetrieverOptions) -> Self {
        self.options = options;
        self
    }

    /// Graph failures degrade to vector-only hits or an empty summary; vector
    /// failures are returned.
    pub async fn search(&self, question: &str, k: usize) -> Result<RetrievalResult, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::Request("question is empty".to_string()));
        }

        let vec_hits = self
            .vector
            .search(question, k.max(self.options.candidate_floor))?;
        let seed_ids: Vec<String> = vec_hits.iter().map(|hit| hit.id.clone()).collect();

        let neighbor_ids = if seed_ids.is_empty() {
            Vec::new()
        } else {
            match self
                .graph
                .expand_neighbors(&seed_ids, self.options.limit_per_concept)
                .await
            {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(%error, "graph expansion unavailable, serving vector hits only");
                    Vec::new()
                }
            }
        };

        let hits = merge_hits(vec_hits, &neighbor_ids, self.vector.corpus(), k, &self.options);

        let final_ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
        let graph = if final_ids.is_empty() {
            GraphContext::default()
        } else {
            match self
                .graph
                .summarize_subgraph(&final_ids, self.options.max_summary_nodes)
                .await
            {
                Ok(context) => context,
                Err(error) => {
                    warn!(%error, "graph summary unavailable");
                    GraphContext::default()
                }
            }
        };

        Ok(RetrievalResult { hits, graph })
    }
}

/// Boosts graph-connected vector hits, appends graph-only neighbours, then
/// stable-sorts by score and keeps `max(k, result_floor)`.
pub fn merge_hits(
    vec_hits: Vec<SearchHit>,
    neighbor_ids: &[String],
    corpus: &SectionCorpus,
    k: usize,
    options: &RetrieverOptions,
) -> Vec<SearchHit> {
    let neighbors: HashSet<&str> = neighbor_ids.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(vec_hits.len() + neighbor_ids.len());
    let mut merged = Vec::with_capacity(vec_hits.len() + neighbor_ids.len());

    for mut hit in vec_hits {
        if neighbors.contains(hit.id.as_str()) {
            hit.score += options.graph_boost;
        }
        seen.insert(hit.id.clone());
        merged.push(hit);
    }

    for neighbor_id in neighbor_ids {
        if seen.contains(neighbor_id) {
            continue;
        }
        let Some(section) = corpus.get(neighbor_id) else {
            debug!(section_id = %neighbor_id, "graph neighbour missing from corpus");
            continue;
        };
        merged.push(SearchHit {
            rank: options.graph_only_rank,
            score: options.graph_only_score,
            id: section.id.clone(),
            doc_name: section.doc_name.clone(),
            chunk_idx: section.chunk_idx,
            text: section.text.clone(),
        });
        seen.insert(neighbor_id.clone());
    }

    merged.sort_by(|left, right| right.score.total_cmp(&left.score));
    merged.truncate(k.max(options.result_floor));
    merged
}
