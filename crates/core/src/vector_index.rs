use crate::corpus::SectionCorpus;
use crate::embeddings::{inner_product, Embedder};
use crate::error::SearchError;
use crate::models::{SearchHit, SectionRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const INDEX_FILE_NAME: &str = "index.json";
pub const MAPPING_FILE_NAME: &str = "mapping.json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub score: f32,
    pub row: usize,
}

/// Read-only nearest-neighbour search by inner product.
pub trait VectorIndex: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns at most `k` rows ordered by descending score.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>, SearchError>;
}

/// Exact brute-force index over a row-major matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimensions: usize,
    data: Vec<f32>,
    built_at: DateTime<Utc>,
}

impl FlatIndex {
    pub fn build(dimensions: usize, vectors: &[Vec<f32>]) -> Result<Self, SearchError> {
        if dimensions == 0 {
            return Err(SearchError::Request(
                "index dimension must be positive".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(dimensions * vectors.len());
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimensions {
                return Err(SearchError::Request(format!(
                    "vector at row {row} has dimension {} instead of {dimensions}",
                    vector.len()
                )));
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dimensions,
            data,
            built_at: Utc::now(),
        })
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dimensions..(row + 1) * self.dimensions]
    }
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>, SearchError> {
        if query.len() != self.dimensions {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<ScoredRow> = (0..self.len())
            .map(|row| ScoredRow {
                score: inner_product(self.row(row), query),
                row,
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.row.cmp(&right.row))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Writes index and row mapping side by side, replacing any previous pair.
pub fn save_artifact(
    dir: &Path,
    index: &FlatIndex,
    mapping: &[SectionRef],
) -> Result<(), SearchError> {
    if index.len() != mapping.len() {
        return Err(SearchError::Request(format!(
            "index has {} rows but mapping has {}",
            index.len(),
            mapping.len()
        )));
    }

    fs::create_dir_all(dir)?;
    let index_tmp = dir.join(format!("{INDEX_FILE_NAME}.tmp"));
    let mapping_tmp = dir.join(format!("{MAPPING_FILE_NAME}.tmp"));
    fs::write(&index_tmp, serde_json::to_vec(index)?)?;
    fs::write(&mapping_tmp, serde_json::to_vec(mapping)?)?;
    fs::rename(index_tmp, dir.join(INDEX_FILE_NAME))?;
    fs::rename(mapping_tmp, dir.join(MAPPING_FILE_NAME))?;
    Ok(())
}

pub fn load_artifact(dir: &Path) -> Result<(FlatIndex, Vec<SectionRef>), SearchError> {
    let index_path = dir.join(INDEX_FILE_NAME);
    let mapping_path = dir.join(MAPPING_FILE_NAME);
    if !index_path.exists() || !mapping_path.exists() {
        return Err(SearchError::IndexUnavailable(format!(
            "index or mapping missing under {}; build the index first",
            dir.display()
        )));
    }

    let unreadable =
        |path: &Path, error: String| SearchError::IndexUnavailable(format!("{}: {error}", path.display()));

    let raw_index = fs::read(&index_path).map_err(|error| unreadable(&index_path, error.to_string()))?;
    let index: FlatIndex =
        serde_json::from_slice(&raw_index).map_err(|error| unreadable(&index_path, error.to_string()))?;
    let raw_mapping =
        fs::read(&mapping_path).map_err(|error| unreadable(&mapping_path, error.to_string()))?;
    let mapping: Vec<SectionRef> = serde_json::from_slice(&raw_mapping)
        .map_err(|error| unreadable(&mapping_path, error.to_string()))?;

    if index.dimensions == 0 || index.data.len() % index.dimensions != 0 {
        return Err(unreadable(&index_path, "matrix is not rectangular".to_string()));
    }

    Ok((index, mapping))
}

/// Embeds the whole corpus in order and persists a fresh index + mapping pair.
pub fn build_vector_index(
    corpus: &SectionCorpus,
    embedder: &dyn Embedder,
    dir: &Path,
) -> Result<FlatIndex, SearchError> {
    let texts: Vec<&str> = corpus
        .sections()
        .iter()
        .map(|section| section.text.as_str())
        .collect();
    let vectors = embedder.embed_batch(&texts);
    let index = FlatIndex::build(embedder.dimensions(), &vectors)?;
    let mapping: Vec<SectionRef> = corpus.sections().iter().map(|section| section.reference()).collect();

    save_artifact(dir, &index, &mapping)?;
    info!(
        rows = index.len(),
        dimensions = index.dimensions(),
        dir = %dir.display(),
        "vector index written"
    );
    Ok(index)
}

/// Embedding + index + mapping + corpus, checked for mutual consistency.
pub struct VectorRetriever {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    mapping: Vec<SectionRef>,
    corpus: SectionCorpus,
}

impl VectorRetriever {
    pub fn from_parts(
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        mapping: Vec<SectionRef>,
        corpus: SectionCorpus,
    ) -> Result<Self, SearchError> {
        if index.len() != mapping.len() {
            return Err(SearchError::IndexUnavailable(format!(
                "index has {} rows but mapping has {}",
                index.len(),
                mapping.len()
            )));
        }
        if index.dimensions() != embedder.dimensions() {
            return Err(SearchError::IndexUnavailable(format!(
                "index dimension {} does not match embedder dimension {}",
                index.dimensions(),
                embedder.dimensions()
            )));
        }
        if let Some(orphan) = mapping.iter().find(|entry| corpus.get(&entry.id).is_none()) {
            return Err(SearchError::IndexUnavailable(format!(
                "mapping row {} is not in the section corpus",
                orphan.id
            )));
        }

        Ok(Self {
            embedder,
            index,
            mapping,
            corpus,
        })
    }

    pub fn open(
        dir: &Path,
        corpus: SectionCorpus,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let (index, mapping) = load_artifact(dir)?;
        Self::from_parts(embedder, Box::new(index), mapping, corpus)
    }

    pub fn corpus(&self) -> &SectionCorpus {
        &self.corpus
    }

    pub fn search(&self, question: &str, k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let query = self.embedder.embed(question);
        let rows = self.index.search(&query, k)?;

        rows.into_iter()
            .enumerate()
            .map(|(position, scored)| {
                let section = self
                    .mapping
                    .get(scored.row)
                    .and_then(|entry| self.corpus.get(&entry.id))
                    .ok_or_else(|| {
                        SearchError::IndexUnavailable(format!(
                            "row {} has no mapped section",
                            scored.row
                        ))
                    })?;

                Ok(SearchHit {
                    rank: position as u32 + 1,
                    score: f64::from(scored.score),
                    id: section.id.clone(),
                    doc_name: section.doc_name.clone(),
                    chunk_idx: section.chunk_idx,
                    text: section.text.clone(),
                })
            })
            .collect()
    }
}
