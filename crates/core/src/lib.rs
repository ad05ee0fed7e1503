pub mod answer;
pub mod chunking;
pub mod completion;
pub mod concepts;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod graph_builder;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;
pub mod vector_index;

pub use answer::{assemble_context, AnswerService, NO_CONTEXT_ANSWER};
pub use chunking::{
    build_sections, chunk_text, chunk_with_config, clean_text_block, normalize_whitespace,
    ChunkingConfig,
};
pub use completion::{
    ChatMessage, CompletionClient, OpenRouterClient, Role, DEFAULT_COMPLETION_MODEL,
};
pub use concepts::{extract_concepts, extract_default_concepts, ConceptExtractor};
pub use corpus::{SectionCorpus, CORPUS_FILE_NAME};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BuildError, IngestError, SearchError};
pub use extractor::extract_pdf_text;
pub use graph_builder::{BuildReport, GraphIndexBuilder, DEFAULT_BATCH_SIZE};
pub use ingest::{discover_documents, ingest_folder, IngestionReport, SkippedDocument};
pub use models::{
    Answer, Concept, GraphContext, IngestionOptions, Mention, RetrievalResult, RetrieverOptions,
    SearchHit, Section, SectionRef,
};
pub use orchestrator::{merge_hits, HybridRetriever};
pub use stores::{InMemoryGraphStore, Neo4jStore};
pub use traits::GraphIndex;
pub use vector_index::{build_vector_index, FlatIndex, ScoredRow, VectorIndex, VectorRetriever};
