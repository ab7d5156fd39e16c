//! Text embedding
//!
//! The reference configuration calls `sentence-transformers/all-MiniLM-L6-v2`
//! on the HuggingFace Inference API.
//!
//! # Model Details
//!
//! - Dimensions: 384
//! - Max tokens: 256 (longer inputs are truncated by the provider)
//!
//! Model identity and dimension are fixed for the lifetime of a process. The
//! same embedder must serve both ingestion and queries, otherwise stored and
//! query vectors are not comparable.
//!
//! # Usage
//!
//! ```ignore
//! use pdfchat_lib::embed::{Embedder, HashingEmbedder};
//!
//! let embedder = HashingEmbedder::new(384);
//! let embedding = embedder.embed("What does clause 4 require?").await?;
//! assert_eq!(embedding.len(), embedder.model().dimension);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Identity of the model behind an embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    pub dimension: usize,
}

impl EmbeddingModel {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    /// Reject vectors whose length differs from the declared dimension.
    pub fn check(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::Configuration(format!(
                "embedding dimension mismatch: model '{}' declares {} but produced {}",
                self.name,
                self.dimension,
                embedding.len()
            )));
        }
        Ok(())
    }
}

/// Trait for text embedding models
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Used for both chunks and questions.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Returns the model identity, including its dimension
    fn model(&self) -> &EmbeddingModel;

    /// Embed and verify the vector matches the declared dimension.
    async fn embed_checked(&self, text: &str) -> Result<Embedding> {
        let embedding = self.embed(text).await?;
        self.model().check(&embedding)?;
        Ok(embedding)
    }
}

/// Cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction, and 0 when
/// either vector has zero length or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Render a vector the way pgvector parses it: `[x1,x2,...,xn]`.
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 12 + 2);
    out.push('[');
    for (i, value) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

mod hashing;
mod huggingface;
#[cfg(feature = "local-embed")]
mod local;

pub use hashing::*;
pub use huggingface::*;
#[cfg(feature = "local-embed")]
pub use local::*;
