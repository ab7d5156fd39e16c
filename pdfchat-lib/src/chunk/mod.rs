//! Document chunking
//!
//! Extracted document text is cut into overlapping character windows before
//! embedding. Windows are purely positional: there is no sentence or
//! paragraph awareness, so the same text and parameters always produce the
//! same chunks.
//!
//! # Implementing a Chunker
//!
//! ```ignore
//! use pdfchat_lib::chunk::{Chunker, Chunk, ChunkMetadata};
//!
//! struct MyChunker { /* ... */ }
//!
//! impl Chunker for MyChunker {
//!     fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk> {
//!         // Your chunking logic here
//!         todo!()
//!     }
//!
//!     fn name(&self) -> &str {
//!         "mine"
//!     }
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A chunk of text with its metadata
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Chunk {
    /// The text content of this chunk
    pub content: String,
    /// Metadata about the source and position
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChunkMetadata {
    /// Source document identifier (usually the uploaded file name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Index of this chunk within its document (0-indexed)
    #[serde(default)]
    pub index: usize,
    /// Character offset of the chunk start within the document
    #[serde(default)]
    pub position: usize,
    /// Total number of chunks from this source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// 1-based page the chunk starts on, when the source has pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Arbitrary additional metadata
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// Trait for document chunking strategies
pub trait Chunker: Send + Sync {
    /// Split content into chunks
    ///
    /// # Arguments
    /// * `content` - The text content to chunk
    /// * `metadata` - Base metadata to attach to each chunk
    ///
    /// # Returns
    /// Chunks in document order, each with index and position metadata
    fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk>;

    /// Returns the name of this chunking strategy
    fn name(&self) -> &str;
}

mod fixed;

pub use fixed::*;
