//! Ingestion orchestration
//!
//! Chunk the document, then embed and insert each chunk. Up to
//! `concurrency` chunks are in flight at once; the first failure stops new
//! chunks from starting, chunks already in flight are allowed to finish, and
//! nothing already stored is rolled back, so a failed ingestion may be
//! partially applied and can simply be retried.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::chunk::{Chunk, ChunkMetadata, Chunker};
use crate::embed::Embedder;
use crate::extract::ExtractedText;
use crate::store::{ChunkId, VectorStore};
use crate::{Error, Result};

/// Metadata key holding the id shared by all chunks of one ingestion
pub const DOCUMENT_ID_KEY: &str = "document_id";
/// Metadata key holding the name of the model that embedded the chunk
pub const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// Summary of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub source_id: String,
    pub document_id: String,
    pub chunks_inserted: usize,
    /// Store ids in chunk order
    pub chunk_ids: Vec<ChunkId>,
}

/// Drives chunker -> embedder -> store for one document at a time.
pub struct Ingestor {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Split `document` into chunks with page and provenance metadata.
    pub fn prepare(&self, document: &ExtractedText, source_id: &str) -> (String, Vec<Chunk>) {
        let document_id = Ulid::new().to_string();
        let mut base = ChunkMetadata {
            source_id: Some(source_id.to_string()),
            ..Default::default()
        };
        base.extra
            .insert(DOCUMENT_ID_KEY.to_string(), document_id.clone());
        base.extra.insert(
            EMBEDDING_MODEL_KEY.to_string(),
            self.embedder.model().name.clone(),
        );

        let mut chunks = self.chunker.chunk(&document.text, base);
        for chunk in &mut chunks {
            chunk.metadata.page = Some(document.page_at(chunk.metadata.position));
        }
        (document_id, chunks)
    }

    pub async fn ingest(&self, document: &ExtractedText, source_id: &str) -> Result<IngestResult> {
        if document.is_blank() {
            return Err(Error::Validation(
                "document contains no extractable text".to_string(),
            ));
        }

        let (document_id, chunks) = self.prepare(document, source_id);
        let total = chunks.len();
        info!(
            source = %source_id,
            document_id = %document_id,
            chunks = total,
            chunker = self.chunker.name(),
            store = self.store.name(),
            "Ingesting document"
        );

        // refill as chunks finish; after the first failure stop refilling but
        // let in-flight chunks settle so every committed insert is reported
        let mut queue = chunks.iter();
        let mut in_flight: FuturesUnordered<_> = queue
            .by_ref()
            .take(self.concurrency)
            .map(|chunk| self.store_chunk(chunk))
            .collect();

        let mut stored: Vec<(usize, ChunkId)> = Vec::with_capacity(total);
        let mut failure: Option<(usize, Error)> = None;
        while let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok(entry) => stored.push(entry),
                Err((index, err)) if failure.is_some() => {
                    warn!(index, error = %err, "Chunk failed while draining");
                }
                Err(first) => failure = Some(first),
            }
            if failure.is_none() {
                if let Some(chunk) = queue.next() {
                    in_flight.push(self.store_chunk(chunk));
                }
            }
        }

        if let Some((failed_chunk, source)) = failure {
            let mut inserted: Vec<usize> = stored.iter().map(|(i, _)| *i).collect();
            inserted.sort_unstable();
            error!(
                source_id = %source_id,
                failed_chunk,
                already_stored = inserted.len(),
                error = %source,
                "Ingestion aborted"
            );
            return Err(Error::Ingestion {
                failed_chunk,
                inserted,
                source: Box::new(source),
            });
        }

        stored.sort_unstable_by_key(|(i, _)| *i);
        info!(source = %source_id, chunks_inserted = stored.len(), "Document ingested");
        Ok(IngestResult {
            source_id: source_id.to_string(),
            document_id,
            chunks_inserted: stored.len(),
            chunk_ids: stored.into_iter().map(|(_, id)| id).collect(),
        })
    }

    async fn store_chunk(&self, chunk: &Chunk) -> std::result::Result<(usize, ChunkId), (usize, Error)> {
        let index = chunk.metadata.index;
        let embedding = self
            .embedder
            .embed_checked(&chunk.content)
            .await
            .map_err(|e| (index, e))?;
        let id = self
            .store
            .insert(&chunk.content, &chunk.metadata, &embedding)
            .await
            .map_err(|e| (index, e))?;
        debug!(index, id = %id, chars = chunk.content.chars().count(), "Stored chunk");
        Ok((index, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FixedSizeChunker;
    use crate::embed::{HashingEmbedder, HASHING_MODEL_NAME};
    use crate::store::MemoryStore;
    use crate::testing::StaticEmbedder;

    fn text(len: usize) -> String {
        (0..len).map(|i| if i % 7 == 6 { ' ' } else { 'x' }).collect()
    }

    fn ingestor(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        concurrency: usize,
    ) -> Ingestor {
        Ingestor::new(Arc::new(FixedSizeChunker::default()), embedder, store, concurrency)
    }

    #[tokio::test]
    async fn test_2400_chars_stores_three_chunks() {
        let store = Arc::new(MemoryStore::new(384));
        let ingestor = ingestor(Arc::new(HashingEmbedder::new(384)), store.clone(), 4);

        let result = ingestor
            .ingest(&ExtractedText::from_paged(&text(2400)), "doc.pdf")
            .await
            .unwrap();

        assert_eq!(result.chunks_inserted, 3);
        assert_eq!(result.chunk_ids.len(), 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_metadata_carries_provenance() {
        let store = Arc::new(MemoryStore::new(16));
        let ingestor = ingestor(Arc::new(HashingEmbedder::new(16)), store.clone(), 1);
        let document = ExtractedText::from_paged(&format!("{}\u{c}{}", text(900), text(900)));

        let result = ingestor.ingest(&document, "paged.pdf").await.unwrap();
        assert_eq!(result.chunks_inserted, 3);

        let mut found = store.search(&[1.0; 16], 10).await.unwrap();
        found.sort_by_key(|r| r.chunk.metadata.index);
        let pages: Vec<_> = found.iter().map(|r| r.chunk.metadata.page).collect();
        assert_eq!(pages, [Some(1), Some(1), Some(2)]);
        for r in &found {
            assert_eq!(r.chunk.metadata.source_id.as_deref(), Some("paged.pdf"));
            assert_eq!(r.chunk.metadata.extra[DOCUMENT_ID_KEY], result.document_id);
            assert_eq!(r.chunk.metadata.extra[EMBEDDING_MODEL_KEY], HASHING_MODEL_NAME);
            assert_eq!(r.chunk.metadata.total_chunks, Some(3));
        }
    }

    #[tokio::test]
    async fn test_blank_document_rejected() {
        let store = Arc::new(MemoryStore::new(8));
        let ingestor = ingestor(Arc::new(HashingEmbedder::new(8)), store.clone(), 2);

        let err = ingestor
            .ingest(&ExtractedText::from_paged("  \n\u{c} "), "blank.pdf")
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_ingestion() {
        let store = Arc::new(MemoryStore::new(384));
        let ingestor = ingestor(Arc::new(StaticEmbedder::mismatched(384, 3)), store.clone(), 1);

        let err = ingestor
            .ingest(&ExtractedText::from_paged(&text(500)), "doc.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::Configuration(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sequential_failure_reports_stored_chunks() {
        // chunk 2 (chars 1600..2600) is the first to contain the marker
        let mut content = text(4000);
        content.replace_range(2000..2004, "FAIL");

        let store = Arc::new(MemoryStore::new(8));
        let embedder = Arc::new(StaticEmbedder::failing_on(8, "FAIL"));
        let ingestor = ingestor(embedder.clone(), store.clone(), 1);

        let err = ingestor
            .ingest(&ExtractedText::from_paged(&content), "doc.pdf")
            .await
            .unwrap_err();

        match err {
            Error::Ingestion { failed_chunk, inserted, source } => {
                assert_eq!(failed_chunk, 2);
                assert_eq!(inserted, vec![0, 1]);
                assert!(matches!(*source, Error::Embedding(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        // no rollback, and nothing after the failure was attempted
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_failure_does_not_mask_stored_chunks() {
        let mut content = text(8000);
        content.replace_range(4000..4004, "FAIL");

        let store = Arc::new(MemoryStore::new(8));
        let ingestor = ingestor(Arc::new(StaticEmbedder::failing_on(8, "FAIL")), store.clone(), 3);

        let err = ingestor
            .ingest(&ExtractedText::from_paged(&content), "doc.pdf")
            .await
            .unwrap_err();

        let Error::Ingestion { inserted, .. } = err else {
            panic!("expected ingestion error");
        };
        assert_eq!(inserted.len(), store.count().await.unwrap());
    }

    /// Commits the row, then takes a while to acknowledge it.
    struct SlowAckStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl VectorStore for SlowAckStore {
        async fn insert(&self, content: &str, metadata: &ChunkMetadata, embedding: &[f32]) -> Result<ChunkId> {
            let id = self.inner.insert(content, metadata, embedding).await?;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(id)
        }

        async fn search(&self, query: &[f32], k: usize) -> Result<Vec<crate::store::SearchResult>> {
            self.inner.search(query, k).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "slow-ack"
        }
    }

    #[tokio::test]
    async fn test_failure_waits_for_in_flight_inserts() {
        // chunks 0..=2 start together; only chunk 2 contains the marker
        let mut content = text(4000);
        content.replace_range(2000..2004, "FAIL");

        let store = Arc::new(SlowAckStore {
            inner: MemoryStore::new(8),
        });
        let embedder = Arc::new(StaticEmbedder::failing_on(8, "FAIL"));
        let ingestor = ingestor(embedder.clone(), store.clone(), 3);

        let err = ingestor
            .ingest(&ExtractedText::from_paged(&content), "doc.pdf")
            .await
            .unwrap_err();

        let Error::Ingestion { failed_chunk, inserted, .. } = err else {
            panic!("expected ingestion error");
        };
        assert_eq!(failed_chunk, 2);
        assert_eq!(inserted, vec![0, 1]);
        assert_eq!(store.count().await.unwrap(), 2);
        // nothing new is started once a chunk has failed
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_error() {
        let store = Arc::new(MemoryStore::new(4));
        let ingestor = ingestor(Arc::new(StaticEmbedder::new(8)), store, 2);

        let err = ingestor
            .ingest(&ExtractedText::from_paged(&text(100)), "doc.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::Store(_)));
    }
}
