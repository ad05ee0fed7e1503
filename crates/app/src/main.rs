use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use graph_rag_core::{
    build_vector_index, ingest_folder, AnswerService, CharacterNgramEmbedder, ChatMessage,
    CompletionClient, GraphIndexBuilder, HybridRetriever, IngestionOptions, Neo4jStore,
    OpenRouterClient, RetrievalResult, SearchError, SectionCorpus, VectorRetriever,
    CORPUS_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_DIMENSIONS,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "graph-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data root; raw documents are read from `<data-dir>/raw`.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Where the section corpus is written.
    #[arg(long, env = "PROCESSED_DIR", default_value = "./data/processed")]
    processed_dir: PathBuf,

    /// Where the vector index and row mapping are written.
    #[arg(long, env = "INDEX_DIR", default_value = "./data/index")]
    index_dir: PathBuf,

    /// Embedding dimension for the hashed n-gram embedder.
    #[arg(long, env = "EMBEDDING_DIMS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dims: usize,

    /// Neo4j HTTP base URL
    #[arg(long, env = "NEO4J_URL", default_value = "http://localhost:7474")]
    neo4j_url: String,

    /// Neo4j database name
    #[arg(long, env = "NEO4J_DB", default_value = "neo4j")]
    neo4j_db: String,

    /// Neo4j username
    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password
    #[arg(long, env = "NEO4J_PASS", default_value = "neo4jpassword")]
    neo4j_password: String,

    /// OpenRouter API token, required by `ask` and the completion health check.
    #[arg(long, env = "OPENROUTER_TOKEN", hide_env_values = true)]
    openrouter_token: Option<String>,

    /// Completion model
    #[arg(long, env = "OPENROUTER_MODEL", default_value = DEFAULT_COMPLETION_MODEL)]
    openrouter_model: String,

    /// Timeout in seconds for graph store and completion calls.
    #[arg(long, env = "DEPENDENCY_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk every pdf/md/txt under the raw folder into the section corpus.
    Ingest,
    /// Embed the section corpus and write the vector index with its row mapping.
    Index,
    /// Upsert sections, concepts and MENTIONS edges into Neo4j.
    BuildGraph {
        /// Sections per committed batch.
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Create uniqueness constraints before writing.
        #[arg(long, default_value_t = false)]
        apply_schema: bool,
    },
    /// Hybrid vector + graph retrieval.
    Search {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "4")]
        k: usize,
        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Retrieve context and synthesize an answer with citations.
    Ask {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "4")]
        k: usize,
        /// Print the answer as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check the graph store and the completion service.
    Health,
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    fn corpus_path(&self) -> PathBuf {
        self.processed_dir.join(CORPUS_FILE_NAME)
    }

    fn embedder(&self) -> CharacterNgramEmbedder {
        CharacterNgramEmbedder {
            dimensions: self.embedding_dims,
        }
    }

    fn graph_store(&self) -> Result<Neo4jStore, SearchError> {
        Neo4jStore::new(
            &self.neo4j_url,
            &self.neo4j_db,
            &self.neo4j_user,
            &self.neo4j_password,
            self.timeout(),
        )
    }

    fn completion(&self) -> anyhow::Result<OpenRouterClient> {
        let token = self
            .openrouter_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .context("OPENROUTER_TOKEN is not set")?;
        Ok(OpenRouterClient::new(
            token,
            &self.openrouter_model,
            self.timeout(),
        )?)
    }

    fn load_corpus(&self) -> anyhow::Result<SectionCorpus> {
        let path = self.corpus_path();
        SectionCorpus::load(&path).with_context(|| {
            format!(
                "section corpus {} is unreadable; run `graph-rag ingest` first",
                path.display()
            )
        })
    }

    /// Refuses to start when the index, mapping and corpus disagree.
    fn open_retriever(&self) -> anyhow::Result<HybridRetriever<Neo4jStore>> {
        let corpus = self.load_corpus()?;
        let vector = VectorRetriever::open(&self.index_dir, corpus, Box::new(self.embedder()))?;
        Ok(HybridRetriever::new(vector, self.graph_store()?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("failed to load .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "graph-rag boot"
    );

    match &cli.command {
        Command::Ingest => {
            let raw_dir = cli.data_dir.join("raw");
            let report = ingest_folder(&raw_dir, &IngestionOptions::default())?;

            if report.sections.is_empty() {
                println!("0 sections ingested from {}", raw_dir.display());
                return Ok(());
            }

            let corpus = SectionCorpus::new(report.sections)?;
            corpus.save(&cli.corpus_path())?;
            println!(
                "{} sections written to {} ({} files skipped)",
                corpus.len(),
                cli.corpus_path().display(),
                report.skipped_files.len()
            );
        }
        Command::Index => {
            let corpus = cli.load_corpus()?;
            let index = build_vector_index(&corpus, &cli.embedder(), &cli.index_dir)?;
            println!(
                "index rows={} dim={} written to {} at {}",
                corpus.len(),
                cli.embedding_dims,
                cli.index_dir.display(),
                index.built_at().to_rfc3339()
            );
        }
        Command::BuildGraph {
            batch_size,
            apply_schema,
        } => {
            let store = cli.graph_store()?;
            if *apply_schema {
                store.ensure_schema().await?;
                info!("graph schema applied");
            }

            let corpus = cli.load_corpus()?;
            let report = GraphIndexBuilder::new(&store)?
                .with_batch_size(*batch_size)
                .build(corpus.sections())
                .await?;
            println!(
                "graph built: sections={} mentions={} batches={}",
                report.sections, report.mentions, report.batches
            );
        }
        Command::Search { question, k, json } => {
            let retriever = cli.open_retriever()?;
            let result = retriever.search(question, *k).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_retrieval(&result);
            }
        }
        Command::Ask { question, k, json } => {
            let service = AnswerService::new(cli.open_retriever()?, cli.completion()?);
            let answer = service.ask(question, *k).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
                if answer.degraded {
                    println!("(completion unavailable; showing retrieved context)");
                }
                for citation in &answer.citations {
                    println!("  [source: {citation}]");
                }
                println!("latency_ms={:.1}", answer.latency_ms);
            }
        }
        Command::Health => {
            let mut errors = Vec::new();

            let neo4j = match cli.graph_store()?.health_check().await {
                Ok(()) => "ok",
                Err(error) => {
                    errors.push(json!({"service": "neo4j", "error": error.to_string()}));
                    "error"
                }
            };

            let llm = match cli.completion() {
                Ok(client) => match client.complete(&[ChatMessage::user("ping")]).await {
                    Ok(_) => "ok",
                    Err(error) => {
                        errors.push(json!({"service": "openrouter", "error": error.to_string()}));
                        "error"
                    }
                },
                Err(error) => {
                    errors.push(json!({"service": "openrouter", "error": error.to_string()}));
                    "error"
                }
            };

            let report = json!({
                "status": "ok",
                "graph": "on",
                "neo4j": neo4j,
                "llm": llm,
                "errors": errors,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn print_retrieval(result: &RetrievalResult) {
    if result.hits.is_empty() {
        println!("no context retrieved");
        return;
    }

    for hit in &result.hits {
        println!(
            "[{}] score={:.4} source={} id={}",
            hit.rank,
            hit.score,
            hit.citation(),
            hit.id
        );
        println!("  text:\n{}", hit.text);
    }

    if !result.graph.concepts.is_empty() {
        println!("concepts: {}", result.graph.concepts.join(", "));
    }
    for section in &result.graph.sections {
        println!("graph_section: {}#{} id={}", section.doc_name, section.chunk_idx, section.id);
    }
}
