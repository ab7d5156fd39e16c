//! Error types for pdfchat

use thiserror::Error;

/// Result type alias for pdfchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pdfchat operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters or a component wired with incompatible settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller input rejected before entering the pipeline
    #[error("{0}")]
    Validation(String),

    /// Failed to pull text out of an uploaded document
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Embedding provider unreachable or rejected the input
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to store or retrieve from the vector index
    #[error("store error: {0}")]
    Store(String),

    /// Generative model failed to produce a completion
    #[error("generation error: {0}")]
    Generation(String),

    /// Ingestion aborted on its first failing chunk.
    ///
    /// Chunks listed in `inserted` were stored before the abort and are not
    /// rolled back.
    #[error("ingestion failed at chunk {failed_chunk} ({} chunks already stored): {source}", inserted.len())]
    Ingestion {
        failed_chunk: usize,
        inserted: Vec<usize>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the error that actually stopped the operation, looking through
    /// ingestion wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Ingestion { source, .. } => source.root(),
            other => other,
        }
    }

    /// Validation failures are reported to callers as ordinary messages
    /// rather than internal errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
