use async_trait::async_trait;

use crate::embed::{Embedder, Embedding, EmbeddingModel};
use crate::Result;

/// Model name recorded on chunks; changes whenever bucketing changes.
pub const HASHING_MODEL_NAME: &str = "feature-hashing-fnv1a";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Offline embedder using feature hashing.
///
/// Each lower-cased alphanumeric token is hashed with 64-bit FNV-1a to a
/// bucket in `[0, dimension)` and the term-frequency vector is L2-normalized.
/// The hash is fixed, so vectors stored by one build still match queries
/// from another. No vocabulary is kept, so the same text always produces
/// the same vector.
/// Useful for development and tests; similarity is lexical, not semantic.
pub struct HashingEmbedder {
    model: EmbeddingModel,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: EmbeddingModel::new(HASHING_MODEL_NAME, dimension),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        (fnv1a(token.as_bytes()) % self.model.dimension as u64) as usize
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut tf = vec![0.0f32; self.model.dimension];
        if self.model.dimension == 0 {
            return tf;
        }

        let tokens = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty());
        for token in tokens {
            tf[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }
        tf
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_sync(text))
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}
