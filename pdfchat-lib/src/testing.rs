//! Scripted stand-ins for the external services, shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chunk::ChunkMetadata;
use crate::embed::{Embedder, Embedding, EmbeddingModel};
use crate::extract::{ExtractedText, TextExtractor};
use crate::generate::Generator;
use crate::store::{ChunkId, SearchResult, StoredChunk, VectorStore};
use crate::{Error, Result};

/// Returns the same vector for every text, optionally failing on texts that
/// contain a marker.
pub struct StaticEmbedder {
    pub model: EmbeddingModel,
    pub vector: Embedding,
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: EmbeddingModel::new("static", dimension),
            vector: vec![1.0; dimension],
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(dimension: usize, marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::new(dimension)
        }
    }

    /// Declares `declared` dimensions but produces `actual`.
    pub fn mismatched(declared: usize, actual: usize) -> Self {
        Self {
            model: EmbeddingModel::new("static", declared),
            vector: vec![1.0; actual],
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(Error::Embedding("provider unavailable".to_string()));
            }
        }
        Ok(self.vector.clone())
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

/// Answers every search with a fixed, pre-ranked result list.
pub struct ScriptedStore {
    pub results: Vec<SearchResult>,
    pub dimension: usize,
    pub fail_search: bool,
    pub fail_count: bool,
    pub searches: AtomicUsize,
}

impl ScriptedStore {
    pub fn with_results(dimension: usize, scored: &[(&str, f32)]) -> Self {
        let results = scored
            .iter()
            .enumerate()
            .map(|(i, (content, similarity))| SearchResult {
                chunk: StoredChunk {
                    id: i.to_string(),
                    content: content.to_string(),
                    metadata: ChunkMetadata::default(),
                },
                similarity: *similarity,
            })
            .collect();
        Self {
            results,
            dimension,
            fail_search: false,
            fail_count: false,
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn insert(&self, _: &str, _: &ChunkMetadata, _: &[f32]) -> Result<ChunkId> {
        Err(Error::Store("read-only store".to_string()))
    }

    async fn search(&self, _query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(Error::Store("connection reset".to_string()));
        }
        Ok(self.results.iter().take(k).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        if self.fail_count {
            return Err(Error::Store("count unavailable".to_string()));
        }
        Ok(self.results.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Records every prompt and replies with a canned answer or error.
pub struct RecordingGenerator {
    pub reply: std::result::Result<String, String>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl RecordingGenerator {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        self.calls
            .lock()
            .push((context.to_string(), question.to_string()));
        self.reply.clone().map_err(Error::Generation)
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Ignores the bytes and returns fixed text.
pub struct StaticExtractor {
    pub text: String,
}

impl StaticExtractor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract(&self, _bytes: &[u8]) -> Result<ExtractedText> {
        Ok(ExtractedText::from_paged(&self.text))
    }

    fn name(&self) -> &str {
        "static"
    }
}
