use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use crate::embed::{Embedder, Embedding, EmbeddingModel};
use crate::{Error, Result};

/// Local all-MiniLM-L6-v2 embedder.
///
/// Uses fastembed for ONNX-based inference, so it produces the same 384-dim
/// vectors as the hosted reference model without network calls. Inference
/// runs on the blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    identity: EmbeddingModel,
    timeout: Duration,
}

impl FastEmbedder {
    /// Create a new local embedder.
    ///
    /// Downloads the model on first use (~90MB).
    pub fn new(timeout: Duration) -> Result<Self> {
        let opts = InitOptions::new(FastEmbedModel::AllMiniLML6V2)
            .with_show_download_progress(true);

        let model = TextEmbedding::try_new(opts).map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            identity: EmbeddingModel::new("sentence-transformers/all-MiniLM-L6-v2", 384),
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let task = tokio::task::spawn_blocking(move || {
            model
                .lock()
                .embed(&[text], None)
                .map_err(|e| Error::Embedding(e.to_string()))
        });

        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| Error::Embedding(format!("local inference timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))??
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }

    fn model(&self) -> &EmbeddingModel {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires model download, run with: cargo test --features local-embed -- --ignored
    async fn test_matches_reference_dimension() {
        let embedder = FastEmbedder::new(Duration::from_secs(60)).unwrap();
        let embedding = embedder.embed_checked("What is the notice period?").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
