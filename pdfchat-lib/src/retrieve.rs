//! Retrieval orchestration
//!
//! Answering a question runs embed -> search -> filter -> generate. Results
//! above the similarity threshold become the context for the generator; when
//! the index has content but nothing clears the threshold, the best raw match
//! is returned verbatim (truncated) without calling the generator.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::generate::Generator;
use crate::ingest::EMBEDDING_MODEL_KEY;
use crate::store::{SearchResult, VectorStore};
use crate::Result;

/// Returned when the search comes back empty.
pub const NO_RELEVANT_DOCUMENTS: &str =
    "No relevant documents found. Try asking a question related to your PDF content.";

const FALLBACK_PREFIX: &str = "Based on the document content: ";

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    /// Completion from the generator over the filtered context
    Generated,
    /// Truncated top match, nothing cleared the threshold
    Fallback,
}

/// Terminal state of a query that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Answered {
        answer: String,
        sources_used: usize,
        path: AnswerPath,
    },
    NoRelevantDocuments { message: String },
}

/// Search results sorted into the branch the query takes.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Results above the threshold, in ranking order
    Context(Vec<SearchResult>),
    /// Top raw result when nothing clears the threshold
    Fallback(SearchResult),
    Empty,
}

/// Keep results strictly above `threshold`, preserving order.
pub fn select(results: Vec<SearchResult>, threshold: f32) -> Selection {
    let Some(top) = results.first().cloned() else {
        return Selection::Empty;
    };
    let relevant: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| r.similarity > threshold)
        .collect();
    if relevant.is_empty() {
        Selection::Fallback(top)
    } else {
        Selection::Context(relevant)
    }
}

/// Concatenate chunk contents in ranking order, one per line.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Degraded answer quoting the first `max_chars` characters of `content`.
pub fn fallback_answer(content: &str, max_chars: usize) -> String {
    let excerpt: String = content.chars().take(max_chars).collect();
    format!("{FALLBACK_PREFIX}{excerpt}...")
}

/// Answers questions against a populated vector store.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed `question` and return the raw ranked matches.
    pub async fn search(&self, question: &str) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed_checked(question).await?;

        match self.store.count().await {
            Ok(0) => warn!(store = self.store.name(), "Vector store is empty"),
            Ok(n) => debug!(store = self.store.name(), chunks = n, "Searching vector store"),
            Err(e) => warn!(error = %e, "Failed to count stored chunks"),
        }

        let results = self.store.search(&embedding, self.config.match_count).await?;
        debug!(
            results = results.len(),
            top = ?results.first().map(|r| r.similarity),
            "Search complete"
        );
        self.flag_model_switch(&results);
        Ok(results)
    }

    pub async fn answer(&self, question: &str) -> Result<Outcome> {
        let results = self.search(question).await?;

        match select(results, self.config.threshold) {
            Selection::Empty => {
                warn!("No documents matched the question");
                Ok(Outcome::NoRelevantDocuments {
                    message: NO_RELEVANT_DOCUMENTS.to_string(),
                })
            }
            Selection::Fallback(top) => {
                warn!(
                    similarity = top.similarity,
                    threshold = self.config.threshold,
                    "No result cleared the threshold, answering from top match"
                );
                Ok(Outcome::Answered {
                    answer: fallback_answer(&top.chunk.content, self.config.fallback_chars),
                    sources_used: 1,
                    path: AnswerPath::Fallback,
                })
            }
            Selection::Context(relevant) => {
                let context = build_context(&relevant);
                info!(
                    sources = relevant.len(),
                    context_chars = context.chars().count(),
                    model = self.generator.model_name(),
                    "Generating answer"
                );
                let answer = self.generator.generate(&context, question).await?;
                Ok(Outcome::Answered {
                    answer,
                    sources_used: relevant.len(),
                    path: AnswerPath::Generated,
                })
            }
        }
    }

    fn flag_model_switch(&self, results: &[SearchResult]) {
        let current = &self.embedder.model().name;
        let stale = results
            .iter()
            .filter_map(|r| r.chunk.metadata.extra.get(EMBEDDING_MODEL_KEY))
            .find(|model| *model != current);
        if let Some(stale) = stale {
            warn!(
                stored = %stale,
                current = %current,
                "Results were embedded with a different model; re-ingest to refresh the index"
            );
        }
    }
}
