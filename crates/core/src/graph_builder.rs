use crate::concepts::{ConceptExtractor, DEFAULT_MAX_PHRASES, DEFAULT_MAX_PHRASE_LEN};
use crate::error::BuildError;
use crate::traits::GraphIndex;
use crate::Section;
use tracing::info;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub sections: usize,
    pub mentions: usize,
    pub batches: usize,
}

/// Writes sections, concepts and `MENTIONS` edges through a [`GraphIndex`].
///
/// Batches are committed independently; a failed batch leaves earlier ones in place.
pub struct GraphIndexBuilder<'a, G: GraphIndex> {
    store: &'a G,
    extractor: ConceptExtractor,
    batch_size: usize,
}

impl<'a, G: GraphIndex> GraphIndexBuilder<'a, G> {
    pub fn new(store: &'a G) -> Result<Self, BuildError> {
        Ok(Self {
            store,
            extractor: ConceptExtractor::new(DEFAULT_MAX_PHRASE_LEN, DEFAULT_MAX_PHRASES)?,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_extractor(mut self, extractor: ConceptExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn build(&self, sections: &[Section]) -> Result<BuildReport, BuildError> {
        let mut report = BuildReport::default();

        for (batch, chunk) in sections.chunks(self.batch_size).enumerate() {
            let mentions: Vec<_> = chunk
                .iter()
                .flat_map(|section| self.extractor.mentions(section))
                .collect();

            self.store
                .upsert_sections(chunk)
                .await
                .map_err(|source| BuildError::Batch { batch, source })?;
            self.store
                .upsert_mentions(&mentions)
                .await
                .map_err(|source| BuildError::Batch { batch, source })?;

            report.sections += chunk.len();
            report.mentions += mentions.len();
            report.batches += 1;
            info!(
                batch,
                sections = chunk.len(),
                mentions = mentions.len(),
                "graph batch committed"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryGraphStore;
    use crate::{GraphContext, Mention};
    use crate::SearchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sections() -> Vec<Section> {
        [
            "Centrifugal pump seals leak when the shaft sleeve wears unevenly.",
            "Centrifugal pump seals also fail after dry running damages the faces.",
            "Switchgear grounding must be verified before any maintenance begins.",
        ]
        .iter()
        .enumerate()
        .map(|(index, text)| Section {
            id: format!("s{index}"),
            doc_name: "manual.txt".to_string(),
            chunk_idx: index as u32,
            text: text.to_string(),
        })
        .collect()
    }

    #[tokio::test]
    async fn replaying_a_build_adds_nothing() {
        let store = InMemoryGraphStore::new();
        let builder = GraphIndexBuilder::new(&store).unwrap().with_batch_size(2);

        let first = builder.build(&sections()).await.unwrap();
        let counts = (store.section_count(), store.concept_count(), store.mention_count());
        let second = builder.build(&sections()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.batches, 2);
        assert_eq!(first.sections, 3);
        assert_eq!(
            counts,
            (store.section_count(), store.concept_count(), store.mention_count())
        );
        assert_eq!(store.mention_count(), first.mentions);
    }

    #[tokio::test]
    async fn section_attributes_are_overwritten() {
        let store = InMemoryGraphStore::new();
        let builder = GraphIndexBuilder::new(&store).unwrap();
        let mut batch = sections();
        builder.build(&batch).await.unwrap();

        batch[0].doc_name = "renamed.txt".to_string();
        builder.build(&batch).await.unwrap();

        let summary = store
            .summarize_subgraph(&["s0".to_string()], 30)
            .await
            .unwrap();
        assert_eq!(summary.sections[0].doc_name, "renamed.txt");
        assert_eq!(store.section_count(), 3);
    }

    struct FailingSecondBatch {
        inner: InMemoryGraphStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphIndex for FailingSecondBatch {
        async fn upsert_sections(&self, sections: &[Section]) -> Result<(), SearchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(SearchError::DependencyTimeout {
                    backend: "fake".to_string(),
                });
            }
            self.inner.upsert_sections(sections).await
        }

        async fn upsert_mentions(&self, mentions: &[Mention]) -> Result<(), SearchError> {
            self.inner.upsert_mentions(mentions).await
        }

        async fn expand_neighbors(
            &self,
            seed_ids: &[String],
            limit_per_concept: usize,
        ) -> Result<Vec<String>, SearchError> {
            self.inner.expand_neighbors(seed_ids, limit_per_concept).await
        }

        async fn summarize_subgraph(
            &self,
            section_ids: &[String],
            max_nodes: usize,
        ) -> Result<GraphContext, SearchError> {
            self.inner.summarize_subgraph(section_ids, max_nodes).await
        }
    }

    #[tokio::test]
    async fn failed_batch_keeps_earlier_batches() {
        let store = FailingSecondBatch {
            inner: InMemoryGraphStore::new(),
            calls: AtomicUsize::new(0),
        };
        let builder = GraphIndexBuilder::new(&store).unwrap().with_batch_size(2);

        let result = builder.build(&sections()).await;
        assert!(matches!(result, Err(BuildError::Batch { batch: 1, .. })));
        assert_eq!(store.inner.section_count(), 2);
        assert!(store.inner.mention_count() > 0);
    }

    #[tokio::test]
    async fn shared_phrases_link_sections() {
        let store = InMemoryGraphStore::new();
        GraphIndexBuilder::new(&store)
            .unwrap()
            .build(&sections())
            .await
            .unwrap();

        let neighbors = store.expand_neighbors(&["s0".to_string()], 5).await.unwrap();
        assert_eq!(neighbors, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn custom_extractor_bounds_the_concepts_written() {
        let store = InMemoryGraphStore::new();
        let extractor = ConceptExtractor::new(1, 2).unwrap();
        let mut expected = extractor.extract(&sections()[0].text);
        expected.sort();

        GraphIndexBuilder::new(&store)
            .unwrap()
            .with_extractor(extractor)
            .build(&sections())
            .await
            .unwrap();

        let written = store.concepts_for("s0");
        assert_eq!(written, expected);
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|concept| !concept.contains(' ')));
    }
}
