//! pdfchat - question answering over uploaded PDFs
//!
//! # Architecture
//!
//! ```text
//! PDF -> Extractor -> Chunker -> Embedder -> Store
//!                                              |
//! Question -> Embedder -> Search <-------------+
//!                            |
//!                      threshold filter
//!                       /          \
//!                  Context       Fallback
//!                     |
//!                 Generator -> Answer
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pdfchat_lib::{config::Settings, retrieve::Outcome, Pipeline};
//!
//! let pipeline = Pipeline::from_settings(&settings)?;
//!
//! // Index a document
//! let result = pipeline.ingest(&std::fs::read("handbook.pdf")?, "handbook.pdf").await?;
//! println!("stored {} chunks", result.chunks_inserted);
//!
//! // Ask about it
//! match pipeline.answer("How long is the refund window?").await? {
//!     Outcome::Answered { answer, sources_used, .. } => println!("{answer} ({sources_used} sources)"),
//!     Outcome::NoRelevantDocuments { message } => println!("{message}"),
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod generate;
pub mod http;
pub mod ingest;
pub mod pipeline;
pub mod retrieve;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use pipeline::Pipeline;
