//! pdfchat CLI - ingest documents and ask questions about them
//!
//! # Commands
//!
//! ```bash
//! # Print the SQL that provisions the Supabase table and functions
//! # (the vector column follows --embedding-dim)
//! pdfchat schema
//!
//! # Index a PDF (or .txt/.md) into the configured store
//! pdfchat --store supabase ingest handbook.pdf
//!
//! # Ask a question against the indexed documents
//! pdfchat --store supabase ask "How long is the refund window?"
//!
//! # Index and ask in one process, handy with the in-memory store
//! pdfchat --embedding-provider hashing demo handbook.pdf "refund window?"
//!
//! # Show how a document is split
//! pdfchat chunk handbook.pdf --size 1000 --overlap 200
//! ```
//!
//! Every option can also be set through the environment variable named in
//! `--help`. Set `RUST_LOG=pdfchat_lib=debug` to trace the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdfchat_lib::{
    chunk::{ChunkMetadata, Chunker, FixedSizeChunker},
    config::{
        ChunkingConfig, EmbeddingConfig, EmbeddingProviderKind, GenerationConfig, RequestConfig,
        RetrievalConfig, Settings, StoreConfig, StoreKind, DEFAULT_EMBEDDING_DIMENSION,
        DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_GROQ_BASE_URL,
        DEFAULT_HF_BASE_URL,
    },
    extract::{ExtractedText, PdfToText, TextExtractor},
    pipeline::{AnswerRequest, IngestResponse, Upload},
    store::supabase_schema_sql,
    Pipeline,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdfchat")]
#[command(about = "Ask questions about PDF documents")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk, embed and store a document
    Ingest {
        /// PDF, or a .txt/.md file ingested as plain text
        file: PathBuf,
    },

    /// Answer a question from the stored documents
    Ask {
        question: String,
    },

    /// Ingest a document then ask about it, in one process
    Demo {
        file: PathBuf,
        question: String,
    },

    /// Split a document and show the windows
    Chunk {
        file: PathBuf,

        /// Window size in characters
        #[arg(long, default_value_t = 1000)]
        size: usize,

        /// Characters shared by adjacent windows
        #[arg(long, default_value_t = 200)]
        overlap: usize,
    },

    /// Embed text and show vector info
    Embed {
        text: String,
    },

    /// Print the Supabase schema SQL, sized to --embedding-dim
    Schema,
}

#[derive(Args)]
struct ConfigArgs {
    /// Embedding provider: huggingface, hashing or fastembed
    #[arg(long, env = "PDFCHAT_EMBEDDING_PROVIDER", default_value = "huggingface")]
    embedding_provider: EmbeddingProviderKind,

    #[arg(long, env = "PDFCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, env = "PDFCHAT_EMBEDDING_DIM", default_value_t = DEFAULT_EMBEDDING_DIMENSION)]
    embedding_dim: usize,

    #[arg(long, env = "HUGGINGFACE_API_KEY", hide_env_values = true)]
    huggingface_api_key: Option<String>,

    #[arg(long, env = "PDFCHAT_HF_BASE_URL", default_value = DEFAULT_HF_BASE_URL)]
    hf_base_url: String,

    /// Vector store: memory or supabase
    #[arg(long, env = "PDFCHAT_STORE", default_value = "memory")]
    store: StoreKind,

    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_PRIVATE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// Table counted for diagnostics
    #[arg(long, env = "PDFCHAT_SUPABASE_TABLE", default_value = "documents")]
    supabase_table: String,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,

    #[arg(long, env = "PDFCHAT_GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    generation_model: String,

    #[arg(long, env = "PDFCHAT_GROQ_BASE_URL", default_value = DEFAULT_GROQ_BASE_URL)]
    groq_base_url: String,

    #[arg(long, env = "PDFCHAT_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    #[arg(long, env = "PDFCHAT_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Maximum number of search results
    #[arg(long, env = "PDFCHAT_MATCH_COUNT", default_value_t = 10)]
    match_count: usize,

    /// Minimum similarity for a result to reach the generator
    #[arg(long, env = "PDFCHAT_THRESHOLD", default_value_t = 0.01)]
    threshold: f32,

    /// Characters quoted by the fallback answer
    #[arg(long, env = "PDFCHAT_FALLBACK_CHARS", default_value_t = 500)]
    fallback_chars: usize,

    /// Chunks embedded and stored concurrently
    #[arg(long, env = "PDFCHAT_INGEST_CONCURRENCY", default_value_t = 4)]
    ingest_concurrency: usize,

    #[arg(long, env = "PDFCHAT_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, env = "PDFCHAT_MAX_RETRIES", default_value_t = 3)]
    max_retries: usize,

    /// Include the full error chain in failure output
    #[arg(long, env = "PDFCHAT_DEV_MODE")]
    dev_mode: bool,
}

impl ConfigArgs {
    fn into_settings(self) -> Settings {
        let defaults = Settings::default();
        Settings {
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            embedding: EmbeddingConfig {
                provider: self.embedding_provider,
                model: self.embedding_model,
                dimension: self.embedding_dim,
                api_key: self.huggingface_api_key,
                base_url: self.hf_base_url,
            },
            store: StoreConfig {
                kind: self.store,
                url: self.supabase_url,
                api_key: self.supabase_key,
                table: self.supabase_table,
            },
            generation: GenerationConfig {
                model: self.generation_model,
                api_key: self.groq_api_key,
                base_url: self.groq_base_url,
                ..defaults.generation
            },
            retrieval: RetrievalConfig {
                match_count: self.match_count,
                threshold: self.threshold,
                fallback_chars: self.fallback_chars,
            },
            request: RequestConfig {
                timeout_secs: self.timeout_secs,
                max_retries: self.max_retries,
                ingest_concurrency: self.ingest_concurrency,
            },
            dev_mode: self.dev_mode,
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn ingest_file(pipeline: &Pipeline, path: &Path) -> Result<IngestResponse> {
    let name = source_name(path);
    if is_pdf(path) {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(pipeline.handle_ingest(Upload::pdf(name, bytes)).await)
    } else {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(pipeline.handle_ingest_text(&text, &name).await)
    }
}

async fn read_document(path: &Path, settings: &Settings) -> Result<ExtractedText> {
    if is_pdf(path) {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let extractor = PdfToText::new(settings.request.timeout());
        Ok(extractor.extract(&bytes).await?)
    } else {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(ExtractedText::from_paged(&text))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.config.into_settings();

    match cli.command {
        Commands::Schema => {
            print!("{}", supabase_schema_sql(settings.embedding.dimension));
        }

        Commands::Chunk {
            file,
            size,
            overlap,
        } => {
            let document = read_document(&file, &settings).await?;
            let chunker = FixedSizeChunker::new(size, overlap)?;
            let chunks = chunker.chunk(&document.text, ChunkMetadata::default());

            println!(
                "Chunked '{}' into {} chunks ({} pages, {size}/{overlap}):\n",
                file.display(),
                chunks.len(),
                document.page_count()
            );
            for chunk in &chunks {
                let chars = chunk.content.chars().count();
                println!(
                    "--- Chunk {} ({chars} chars, offset {}, page {}) ---",
                    chunk.metadata.index + 1,
                    chunk.metadata.position,
                    document.page_at(chunk.metadata.position)
                );
                // Show preview (first 200 chars)
                let preview: String = chunk.content.chars().take(200).collect();
                println!("{}{}\n", preview, if chars > 200 { "..." } else { "" });
            }
        }

        Commands::Embed { text } => {
            let pipeline = Pipeline::from_settings(&settings)?;
            let embedder = pipeline.embedder();
            println!("Embedding with {}: {}", embedder.model().name, text);
            let embedding = embedder.embed_checked(&text).await?;

            println!("\nEmbedding stats:");
            println!("  Dimensions: {}", embedding.len());
            println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
            println!("  Min: {:.4}", embedding.iter().cloned().fold(f32::INFINITY, f32::min));
            println!("  Max: {:.4}", embedding.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
            let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            println!("  Norm: {norm:.4}");
        }

        Commands::Ingest { file } => {
            let pipeline = Pipeline::from_settings(&settings)?;
            let response = ingest_file(&pipeline, &file).await?;
            print_json(&response)?;
            if response.status_code() != 200 {
                std::process::exit(1);
            }
        }

        Commands::Ask { question } => {
            let pipeline = Pipeline::from_settings(&settings)?;
            let response = pipeline.handle_answer(AnswerRequest::new(question)).await;
            print_json(&response)?;
            if response.status_code() != 200 {
                std::process::exit(1);
            }
        }

        Commands::Demo { file, question } => {
            let pipeline = Pipeline::from_settings(&settings)?;
            let ingested = ingest_file(&pipeline, &file).await?;
            print_json(&ingested)?;
            if !ingested.is_success() {
                std::process::exit(1);
            }
            info!(stored = pipeline.store().count().await?, "Index ready");

            let response = pipeline.handle_answer(AnswerRequest::new(question)).await;
            print_json(&response)?;
            if response.status_code() != 200 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
