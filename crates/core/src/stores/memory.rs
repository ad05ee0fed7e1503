use crate::traits::{neighbor_limit, GraphIndex};
use crate::{Concept, GraphContext, Mention, SearchError, Section};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct GraphState {
    sections: BTreeMap<String, Section>,
    concepts: BTreeMap<String, Concept>,
    mentions: BTreeSet<(String, String)>,
}

impl GraphState {
    fn concepts_of<'a>(&'a self, section_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.mentions
            .range((section_id.to_string(), String::new())..)
            .take_while(move |(sid, _)| sid == section_id)
            .map(|(_, concept)| concept.as_str())
    }
}

/// Process-local graph with the same merge and query semantics as [`crate::Neo4jStore`].
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: Mutex<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GraphState>, SearchError> {
        self.state.lock().map_err(|_| SearchError::DependencyFailure {
            backend: "memory".to_string(),
            details: "graph state lock poisoned".to_string(),
        })
    }

    pub fn section_count(&self) -> usize {
        self.lock().map(|state| state.sections.len()).unwrap_or_default()
    }

    pub fn concept_count(&self) -> usize {
        self.lock().map(|state| state.concepts.len()).unwrap_or_default()
    }

    pub fn mention_count(&self) -> usize {
        self.lock().map(|state| state.mentions.len()).unwrap_or_default()
    }

    pub fn concepts_for(&self, section_id: &str) -> Vec<String> {
        self.lock()
            .map(|state| state.concepts_of(section_id).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphIndex for InMemoryGraphStore {
    async fn upsert_sections(&self, sections: &[Section]) -> Result<(), SearchError> {
        let mut state = self.lock()?;
        for section in sections {
            state.sections.insert(section.id.clone(), section.clone());
        }
        Ok(())
    }

    async fn upsert_mentions(&self, mentions: &[Mention]) -> Result<(), SearchError> {
        let mut state = self.lock()?;
        for mention in mentions {
            state
                .concepts
                .entry(mention.concept.name.clone())
                .or_insert_with(|| mention.concept.clone());
            state
                .sections
                .entry(mention.section_id.clone())
                .or_insert_with(|| Section {
                    id: mention.section_id.clone(),
                    doc_name: String::new(),
                    chunk_idx: 0,
                    text: String::new(),
                });
            state
                .mentions
                .insert((mention.section_id.clone(), mention.concept.name.clone()));
        }
        Ok(())
    }

    async fn expand_neighbors(
        &self,
        seed_ids: &[String],
        limit_per_concept: usize,
    ) -> Result<Vec<String>, SearchError> {
        let state = self.lock()?;

        let mut mentioned_by: HashMap<&str, Vec<&str>> = HashMap::new();
        for (section_id, concept) in &state.mentions {
            mentioned_by
                .entry(concept.as_str())
                .or_default()
                .push(section_id.as_str());
        }

        let mut votes: HashMap<&str, usize> = HashMap::new();
        for seed in seed_ids {
            for concept in state.concepts_of(seed) {
                for neighbor in mentioned_by.get(concept).into_iter().flatten() {
                    if *neighbor != seed.as_str() {
                        *votes.entry(*neighbor).or_default() += 1;
                    }
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = votes.into_iter().collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));
        Ok(ranked
            .into_iter()
            .take(neighbor_limit(seed_ids.len(), limit_per_concept))
            .map(|(id, _)| id.to_string())
            .collect())
    }

    async fn summarize_subgraph(
        &self,
        section_ids: &[String],
        max_nodes: usize,
    ) -> Result<GraphContext, SearchError> {
        let state = self.lock()?;
        let mut context = GraphContext::default();
        let mut seen_sections = HashSet::new();
        let mut seen_concepts = HashSet::new();

        for section_id in section_ids {
            let Some(section) = state.sections.get(section_id) else {
                continue;
            };
            let mut concepts = state.concepts_of(section_id).peekable();
            if concepts.peek().is_none() {
                continue;
            }

            if context.sections.len() < max_nodes && seen_sections.insert(section_id.as_str()) {
                context.sections.push(section.reference());
            }
            for concept in concepts {
                if context.concepts.len() < max_nodes && seen_concepts.insert(concept) {
                    context.concepts.push(concept.to_string());
                }
            }
        }

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str) -> Section {
        Section {
            id: id.to_string(),
            doc_name: format!("{id}.txt"),
            chunk_idx: 0,
            text: format!("body of {id}"),
        }
    }

    fn mention(section_id: &str, concept: &str) -> Mention {
        Mention {
            section_id: section_id.to_string(),
            concept: Concept::new(concept),
        }
    }

    async fn seeded_store() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store
            .upsert_sections(&[section("a"), section("b"), section("c"), section("d")])
            .await
            .unwrap();
        store
            .upsert_mentions(&[
                mention("a", "pump seal"),
                mention("a", "bearing wear"),
                mention("b", "pump seal"),
                mention("b", "bearing wear"),
                mention("c", "pump seal"),
                mention("d", "grounding"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn mentions_are_set_like() {
        let store = seeded_store().await;
        store
            .upsert_mentions(&[mention("a", "pump seal"), mention("a", "pump seal")])
            .await
            .unwrap();

        assert_eq!(store.section_count(), 4);
        assert_eq!(store.concept_count(), 3);
        assert_eq!(store.mention_count(), 6);
    }

    #[tokio::test]
    async fn expansion_counts_shared_concept_paths() {
        let store = seeded_store().await;
        let neighbors = store.expand_neighbors(&["a".to_string()], 5).await.unwrap();
        assert_eq!(neighbors, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn expansion_breaks_vote_ties_by_id() {
        let store = seeded_store().await;
        let neighbors = store
            .expand_neighbors(&["c".to_string(), "d".to_string()], 5)
            .await
            .unwrap();
        assert_eq!(neighbors, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn isolated_seed_has_no_neighbors() {
        let store = seeded_store().await;
        let neighbors = store.expand_neighbors(&["d".to_string()], 5).await.unwrap();
        assert!(neighbors.is_empty());
    }

    #[tokio::test]
    async fn summary_is_distinct_and_capped() {
        let store = seeded_store().await;
        let ids = ["a", "b", "a", "missing", "c"].map(str::to_string);

        let summary = store.summarize_subgraph(&ids, 30).await.unwrap();
        assert_eq!(
            summary.sections.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(summary.concepts, vec!["bearing wear", "pump seal"]);

        let capped = store.summarize_subgraph(&ids, 1).await.unwrap();
        assert_eq!(capped.sections.len(), 1);
        assert_eq!(capped.concepts.len(), 1);
    }
}
