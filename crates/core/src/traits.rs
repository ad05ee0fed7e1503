use crate::{GraphContext, Mention, SearchError, Section};
use async_trait::async_trait;

/// Read/write contract of the Section–Concept graph.
///
/// Every call is an independent unit of work: writers commit per call and
/// readers see whatever was committed before them.
#[async_trait]
pub trait GraphIndex: Send + Sync {
    /// Merges sections by id, overwriting `doc_name`, `chunk_idx` and `text`.
    async fn upsert_sections(&self, sections: &[Section]) -> Result<(), SearchError>;

    /// Merges concepts by name and `MENTIONS` edges by endpoint pair.
    async fn upsert_mentions(&self, mentions: &[Mention]) -> Result<(), SearchError>;

    /// Sections sharing at least one concept with a seed, most shared paths first.
    async fn expand_neighbors(
        &self,
        seed_ids: &[String],
        limit_per_concept: usize,
    ) -> Result<Vec<String>, SearchError>;

    async fn summarize_subgraph(
        &self,
        section_ids: &[String],
        max_nodes: usize,
    ) -> Result<GraphContext, SearchError>;
}

/// Result cap for [`GraphIndex::expand_neighbors`].
pub fn neighbor_limit(seed_count: usize, limit_per_concept: usize) -> usize {
    (seed_count * limit_per_concept).max(20)
}
