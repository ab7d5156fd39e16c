//! Vector storage backends
//!
//! The in-memory store defines the reference semantics and backs tests and
//! single-process demos; the Supabase store talks to a pgvector table through
//! PostgREST functions.
//!
//! # Storage Model
//!
//! Each stored item consists of:
//! - Content: the chunk text
//! - Metadata: source and position of the chunk
//! - Embedding: the vector representation
//!
//! Items are immutable once inserted.
//!
//! # Usage
//!
//! ```ignore
//! use pdfchat_lib::store::{VectorStore, MemoryStore};
//!
//! let store = MemoryStore::new(384);
//!
//! let id = store.insert(&chunk.content, &chunk.metadata, &embedding).await?;
//!
//! // Search by vector similarity
//! let results = store.search(&query_embedding, 10).await?;
//! ```

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMetadata;
use crate::Result;

/// Identifier assigned by the store on insertion
pub type ChunkId = String;

/// A chunk as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A search result with similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// The matched chunk
    pub chunk: StoredChunk,
    /// Cosine similarity to the query, -1.0 to 1.0 (higher is more similar)
    pub similarity: f32,
}

/// Trait for vector storage backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store one chunk with its embedding.
    ///
    /// Fails rather than dropping the chunk; an embedding whose length
    /// differs from [`dimension`](Self::dimension) is rejected.
    async fn insert(
        &self,
        content: &str,
        metadata: &ChunkMetadata,
        embedding: &[f32],
    ) -> Result<ChunkId>;

    /// Search for similar chunks
    ///
    /// # Arguments
    /// * `query_embedding` - The query vector
    /// * `k` - Maximum number of results
    ///
    /// # Returns
    /// At most `k` results sorted by similarity (highest first); equal
    /// scores keep insertion order
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Get total number of stored chunks
    async fn count(&self) -> Result<usize>;

    /// Dimension the store was provisioned for
    fn dimension(&self) -> usize;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Stable descending sort by similarity; NaN scores sink to the end.
pub(crate) fn rank_descending(results: &mut [SearchResult]) {
    results.sort_by(|a, b| match (a.similarity.is_nan(), b.similarity.is_nan()) {
        (false, false) => b
            .similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    });
}

mod memory;
mod supabase;

pub use memory::*;
pub use supabase::*;
