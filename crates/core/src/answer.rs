use crate::chunking::normalize_whitespace;
use crate::completion::{ChatMessage, CompletionClient};
use crate::orchestrator::HybridRetriever;
use crate::traits::GraphIndex;
use crate::{Answer, SearchError, SearchHit};
use std::time::Instant;
use tracing::warn;

pub const NO_CONTEXT_ANSWER: &str = "No context retrieved.";
pub const CONTEXT_HITS: usize = 3;
pub const CONTEXT_MAX_CHARS: usize = 800;

const SYSTEM_PROMPT: &str = "You are a precise assistant. Answer only using the provided context. \
If the answer is not present, say you don't know. Be concise and cite sources as [source: doc#chunk].";

pub fn assemble_context(hits: &[SearchHit], max_chars: usize) -> String {
    hits.iter()
        .map(|hit| normalize_whitespace(&hit.text))
        .collect::<Vec<_>>()
        .join(" … ")
        .chars()
        .take(max_chars)
        .collect()
}

pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context: {context}\nQuestion: {question}")),
    ]
}

/// Retrieval plus answer synthesis for one question.
pub struct AnswerService<G, C>
where
    G: GraphIndex,
    C: CompletionClient,
{
    retriever: HybridRetriever<G>,
    completion: C,
}

impl<G, C> AnswerService<G, C>
where
    G: GraphIndex,
    C: CompletionClient,
{
    pub fn new(retriever: HybridRetriever<G>, completion: C) -> Self {
        Self {
            retriever,
            completion,
        }
    }

    pub async fn ask(&self, question: &str, k: usize) -> Result<Answer, SearchError> {
        let started = Instant::now();
        let result = self.retriever.search(question, k).await?;

        if result.hits.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                graph_context: result.graph,
                latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
                degraded: false,
            });
        }

        let top = &result.hits[..result.hits.len().min(CONTEXT_HITS)];
        let context = assemble_context(top, CONTEXT_MAX_CHARS);
        let citations = top.iter().map(SearchHit::citation).collect();

        let (answer, degraded) = match self
            .completion
            .complete(&build_messages(question, &context))
            .await
        {
            Ok(answer) => (answer, false),
            Err(error) => {
                warn!(%error, "completion unavailable, answering with retrieved context");
                (context, true)
            }
        };

        Ok(Answer {
            answer,
            citations,
            graph_context: result.graph,
            latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;
    use crate::corpus::SectionCorpus;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::stores::InMemoryGraphStore;
    use crate::vector_index::{FlatIndex, VectorRetriever};
    use crate::Section;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCompletion {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SearchError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(messages.to_vec());
            }
            if self.fail {
                return Err(SearchError::DependencyTimeout {
                    backend: "fake".to_string(),
                });
            }
            Ok("synthesized".to_string())
        }
    }

    fn retriever(texts: &[&str]) -> HybridRetriever<InMemoryGraphStore> {
        let sections = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Section {
                id: format!("s{index}"),
                doc_name: "guide.md".to_string(),
                chunk_idx: index as u32,
                text: text.to_string(),
            })
            .collect();
        let corpus = SectionCorpus::new(sections).unwrap();
        let embedder = CharacterNgramEmbedder { dimensions: 64 };
        let texts: Vec<&str> = corpus.sections().iter().map(|s| s.text.as_str()).collect();
        let index = FlatIndex::build(64, &embedder.embed_batch(&texts)).unwrap();
        let mapping = corpus.sections().iter().map(|s| s.reference()).collect();
        let vector =
            VectorRetriever::from_parts(Box::new(embedder), Box::new(index), mapping, corpus).unwrap();
        HybridRetriever::new(vector, InMemoryGraphStore::new())
    }

    fn hit(text: &str) -> SearchHit {
        SearchHit {
            rank: 1,
            score: 1.0,
            id: "s".to_string(),
            doc_name: "d".to_string(),
            chunk_idx: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn context_is_collapsed_joined_and_truncated() {
        let hits = [hit("first\n\n  block"), hit("second   block")];
        assert_eq!(assemble_context(&hits, 800), "first block … second block");
        assert_eq!(assemble_context(&hits, 5), "first");
    }

    #[test]
    fn messages_carry_question_and_context() {
        let messages = build_messages("why?", "because");
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Context: because\nQuestion: why?");
    }

    #[tokio::test]
    async fn empty_corpus_answers_without_calling_completion() {
        let service = AnswerService::new(retriever(&[]), RecordingCompletion::default());
        let answer = service.ask("anything", 4).await.unwrap();

        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.citations.is_empty());
        assert!(!answer.degraded);
        assert!(service.completion.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_cites_the_top_three_hits() {
        let texts = ["pump seals", "pump bearings", "pump impeller", "pump casing"];
        let service = AnswerService::new(retriever(&texts), RecordingCompletion::default());
        let answer = service.ask("pump seals", 4).await.unwrap();

        assert_eq!(answer.answer, "synthesized");
        assert_eq!(answer.citations.len(), 3);
        assert_eq!(answer.citations[0], "guide.md#0");
        assert_eq!(service.completion.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_failure_falls_back_to_context() {
        let completion = RecordingCompletion {
            fail: true,
            ..RecordingCompletion::default()
        };
        let service = AnswerService::new(retriever(&["lubricate gearboxes monthly"]), completion);
        let answer = service.ask("gearbox lubrication", 4).await.unwrap();

        assert!(answer.degraded);
        assert_eq!(answer.answer, "lubricate gearboxes monthly");
        assert_eq!(answer.citations, vec!["guide.md#0".to_string()]);
    }
}
