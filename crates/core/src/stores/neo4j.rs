use crate::traits::{neighbor_limit, GraphIndex};
use crate::{GraphContext, Mention, SearchError, Section, SectionRef};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "neo4j";

const SCHEMA_STATEMENTS: [&str; 2] = [
    "CREATE CONSTRAINT section_id IF NOT EXISTS FOR (s:Section) REQUIRE s.id IS UNIQUE",
    "CREATE CONSTRAINT concept_name IF NOT EXISTS FOR (c:Concept) REQUIRE c.name IS UNIQUE",
];

const UPSERT_SECTIONS: &str = r#"
    UNWIND $rows AS row
    MERGE (s:Section {id: row.id})
      SET s.doc_name = row.doc_name,
          s.chunk_idx = row.chunk_idx,
          s.text = row.text
"#;

const UPSERT_MENTIONS: &str = r#"
    UNWIND $rows AS row
    MERGE (c:Concept {name: row.name})
      ON CREATE SET c.name_lower = row.name_lower
    MERGE (s:Section {id: row.sid})
    MERGE (s)-[:MENTIONS]->(c)
"#;

const EXPAND_NEIGHBORS: &str = r#"
    UNWIND $seed AS sid
    MATCH (s:Section {id: sid})-[:MENTIONS]->(c:Concept)<-[:MENTIONS]-(n:Section)
    WHERE n.id <> s.id
    WITH n, count(*) AS votes
    RETURN n.id AS id, votes
    ORDER BY votes DESC, id ASC
    LIMIT $lim
"#;

const SUMMARIZE_SUBGRAPH: &str = r#"
    UNWIND $seed AS sid
    MATCH (s:Section {id: sid})-[:MENTIONS]->(c:Concept)
    RETURN collect(DISTINCT {sid: s.id, doc: s.doc_name, idx: s.chunk_idx})[0..$mn] AS sections,
           collect(DISTINCT c.name)[0..$mn] AS concepts
"#;

/// Graph store over the Neo4j HTTP transaction endpoint. Every call is its own
/// auto-committed transaction.
pub struct Neo4jStore {
    endpoint: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    async fn run(&self, statements: Vec<Value>) -> Result<Value, SearchError> {
        let response = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        if !response.status().is_success() {
            return Err(SearchError::DependencyFailure {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        if let Some(error) = body
            .pointer("/errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            return Err(SearchError::DependencyFailure {
                backend: BACKEND.to_string(),
                details: error
                    .pointer("/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown cypher error")
                    .to_string(),
            });
        }

        Ok(body)
    }

    async fn run_one(&self, statement: &str, parameters: Value) -> Result<Value, SearchError> {
        self.run(vec![json!({ "statement": statement, "parameters": parameters })])
            .await
    }

    pub async fn ensure_schema(&self) -> Result<(), SearchError> {
        let statements = SCHEMA_STATEMENTS
            .iter()
            .map(|statement| {
                debug!(statement, "applying graph schema");
                json!({ "statement": statement })
            })
            .collect();
        self.run(statements).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), SearchError> {
        let body = self.run_one("RETURN 1 AS ok", json!({})).await?;
        let ok = extract_rows(&body)
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64);

        if ok == Some(1) {
            Ok(())
        } else {
            Err(SearchError::DependencyFailure {
                backend: BACKEND.to_string(),
                details: "health check returned no row".to_string(),
            })
        }
    }
}

#[async_trait]
impl GraphIndex for Neo4jStore {
    async fn upsert_sections(&self, sections: &[Section]) -> Result<(), SearchError> {
        if sections.is_empty() {
            return Ok(());
        }

        let rows: Vec<_> = sections
            .iter()
            .map(|section| {
                json!({
                    "id": section.id,
                    "doc_name": section.doc_name,
                    "chunk_idx": section.chunk_idx,
                    "text": section.text,
                })
            })
            .collect();

        self.run_one(UPSERT_SECTIONS, json!({ "rows": rows })).await?;
        Ok(())
    }

    async fn upsert_mentions(&self, mentions: &[Mention]) -> Result<(), SearchError> {
        if mentions.is_empty() {
            return Ok(());
        }

        let rows: Vec<_> = mentions
            .iter()
            .map(|mention| {
                json!({
                    "sid": mention.section_id,
                    "name": mention.concept.name,
                    "name_lower": mention.concept.name_lower,
                })
            })
            .collect();

        self.run_one(UPSERT_MENTIONS, json!({ "rows": rows })).await?;
        Ok(())
    }

    async fn expand_neighbors(
        &self,
        seed_ids: &[String],
        limit_per_concept: usize,
    ) -> Result<Vec<String>, SearchError> {
        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = self
            .run_one(
                EXPAND_NEIGHBORS,
                json!({
                    "seed": seed_ids,
                    "lim": neighbor_limit(seed_ids.len(), limit_per_concept),
                }),
            )
            .await?;

        Ok(parse_neighbor_ids(&body))
    }

    async fn summarize_subgraph(
        &self,
        section_ids: &[String],
        max_nodes: usize,
    ) -> Result<GraphContext, SearchError> {
        if section_ids.is_empty() {
            return Ok(GraphContext::default());
        }

        let body = self
            .run_one(
                SUMMARIZE_SUBGRAPH,
                json!({ "seed": section_ids, "mn": max_nodes }),
            )
            .await?;

        Ok(parse_summary(&body))
    }
}

fn parse_neighbor_ids(body: &Value) -> Vec<String> {
    extract_rows(body)
        .into_iter()
        .filter_map(|row| row.get(0).and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn parse_summary(body: &Value) -> GraphContext {
    let Some(row) = extract_rows(body).into_iter().next() else {
        return GraphContext::default();
    };

    let sections = row
        .get(0)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(SectionRef {
                        id: entry.pointer("/sid")?.as_str()?.to_string(),
                        doc_name: entry
                            .pointer("/doc")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        chunk_idx: entry
                            .pointer("/idx")
                            .and_then(Value::as_u64)
                            .and_then(|idx| u32::try_from(idx).ok())
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let concepts = row
        .get(1)
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    GraphContext { sections, concepts }
}

fn extract_rows(payload: &Value) -> Vec<&Value> {
    payload
        .pointer("/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| result.pointer("/data").and_then(Value::as_array))
                .flatten()
                .filter_map(|row_entry| {
                    row_entry
                        .pointer("/row")
                        .or(Some(row_entry))
                        .filter(|candidate| candidate.is_array())
                })
                .collect()
        })
        .unwrap_or_default()
}
