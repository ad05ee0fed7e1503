use serde::{Deserialize, Serialize};

/// A chunk of document text; the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub id: String,
    pub doc_name: String,
    pub chunk_idx: u32,
    pub text: String,
}

impl Section {
    pub fn reference(&self) -> SectionRef {
        SectionRef {
            id: self.id.clone(),
            doc_name: self.doc_name.clone(),
            chunk_idx: self.chunk_idx,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Concept {
    pub name: String,
    pub name_lower: String,
}

impl Concept {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name_lower = name.to_lowercase();
        Self { name, name_lower }
    }
}

/// A section's text contains a concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mention {
    pub section_id: String,
    pub concept: Concept,
}

/// Section identity without its text, as stored in the index row mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SectionRef {
    pub id: String,
    pub doc_name: String,
    pub chunk_idx: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub rank: u32,
    pub score: f64,
    pub id: String,
    pub doc_name: String,
    pub chunk_idx: u32,
    pub text: String,
}

impl SearchHit {
    pub fn citation(&self) -> String {
        format!("{}#{}", self.doc_name, self.chunk_idx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GraphContext {
    pub sections: Vec<SectionRef>,
    pub concepts: Vec<String>,
}

impl GraphContext {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.concepts.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<SearchHit>,
    pub graph: GraphContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<String>,
    pub graph_context: GraphContext,
    pub latency_ms: f64,
    /// Set when the completion service failed and the answer is a raw context excerpt.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub min_boundary_offset: usize,
    pub extensions: Vec<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 2_000,
            chunk_overlap_chars: 300,
            min_chunk_chars: 80,
            min_boundary_offset: 500,
            extensions: vec!["pdf".to_string(), "md".to_string(), "txt".to_string()],
        }
    }
}

/// Tuning constants for [`crate::HybridRetriever`].
#[derive(Debug, Clone, Copy)]
pub struct RetrieverOptions {
    pub candidate_floor: usize,
    pub result_floor: usize,
    pub limit_per_concept: usize,
    pub graph_boost: f64,
    pub graph_only_score: f64,
    pub graph_only_rank: u32,
    pub max_summary_nodes: usize,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            candidate_floor: 8,
            result_floor: 5,
            limit_per_concept: 5,
            graph_boost: 0.05,
            graph_only_score: 0.01,
            graph_only_rank: 9_999,
            max_summary_nodes: 30,
        }
    }
}
