use async_trait::async_trait;
use parking_lot::RwLock;
use ulid::Ulid;

use crate::chunk::ChunkMetadata;
use crate::embed::{cosine_similarity, Embedding};
use crate::store::{rank_descending, ChunkId, SearchResult, StoredChunk, VectorStore};
use crate::{Error, Result};

/// In-memory vector store for development and testing.
///
/// Uses brute-force cosine similarity search over records kept in insertion
/// order. Suitable for small datasets (< 10k chunks); contents are lost when
/// the process exits.
pub struct MemoryStore {
    dimension: usize,
    records: RwLock<Vec<Record>>,
}

struct Record {
    chunk: StoredChunk,
    embedding: Embedding,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Remove every stored chunk.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn insert(
        &self,
        content: &str,
        metadata: &ChunkMetadata,
        embedding: &[f32],
    ) -> Result<ChunkId> {
        if embedding.len() != self.dimension {
            return Err(Error::Store(format!(
                "embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dimension
            )));
        }

        let id = Ulid::new().to_string();
        self.records.write().push(Record {
            chunk: StoredChunk {
                id: id.clone(),
                content: content.to_string(),
                metadata: metadata.clone(),
            },
            embedding: embedding.to_vec(),
        });
        Ok(id)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimension {
            return Err(Error::Store(format!(
                "query has {} dimensions, store expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut results: Vec<SearchResult> = self
            .records
            .read()
            .iter()
            .map(|record| SearchResult {
                chunk: record.chunk.clone(),
                similarity: cosine_similarity(query, &record.embedding),
            })
            .collect();

        rank_descending(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "memory"
    }
}
