//! Pipeline assembly and request boundary
//!
//! [`Pipeline`] owns the components built once at startup and exposes the
//! two operations front ends call. `handle_ingest` and `handle_answer`
//! validate raw requests and render every outcome, including failures, as
//! a response with a `success` flag.
//!
//! ```ignore
//! use pdfchat_lib::{config::Settings, pipeline::{AnswerRequest, Pipeline}};
//!
//! let pipeline = Pipeline::from_settings(&settings)?;
//! let ingested = pipeline.ingest(&pdf_bytes, "handbook.pdf").await?;
//! let response = pipeline
//!     .handle_answer(AnswerRequest::new("What is the refund window?"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, info};

use crate::chunk::FixedSizeChunker;
use crate::config::{EmbeddingConfig, EmbeddingProviderKind, RequestConfig, Settings, StoreKind};
use crate::embed::{Embedder, HashingEmbedder, HuggingFaceEmbedder};
use crate::extract::{ExtractedText, PdfToText, TextExtractor};
use crate::generate::{Generator, GroqGenerator};
use crate::ingest::{IngestResult, Ingestor};
use crate::retrieve::{Outcome, Retriever};
use crate::store::{MemoryStore, SupabaseStore, VectorStore};
use crate::{Error, Result};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

pub const INGEST_SUCCESS: &str = "PDF processed successfully";
pub const NO_FILE: &str = "No file uploaded";
pub const NOT_A_PDF: &str = "File is not a PDF";
pub const QUESTION_REQUIRED: &str = "Question is required";

/// Externally constructed services a pipeline is assembled from.
pub struct Components {
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    /// Without a generator the pipeline can ingest but not answer.
    pub generator: Option<Arc<dyn Generator>>,
}

impl Components {
    /// Build every service described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = build_embedder(&settings.embedding, &settings.request)?;
        let dimension = embedder.model().dimension;

        let store: Arc<dyn VectorStore> = match settings.store.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new(dimension)),
            StoreKind::Supabase => Arc::new(SupabaseStore::from_config(
                &settings.store,
                settings.embedding.dimension,
                &settings.request,
            )?),
        };

        let generator: Option<Arc<dyn Generator>> = match settings.generation.api_key {
            Some(ref key) if !key.trim().is_empty() => Some(Arc::new(GroqGenerator::from_config(
                &settings.generation,
                &settings.request,
            )?)),
            _ => None,
        };

        Ok(Self {
            extractor: Arc::new(PdfToText::new(settings.request.timeout())),
            embedder,
            store,
            generator,
        })
    }
}

fn build_embedder(config: &EmbeddingConfig, request: &RequestConfig) -> Result<Arc<dyn Embedder>> {
    Ok(match config.provider {
        EmbeddingProviderKind::HuggingFace => Arc::new(HuggingFaceEmbedder::from_config(config, request)?),
        EmbeddingProviderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
        EmbeddingProviderKind::FastEmbed => local_embedder(request)?,
    })
}

#[cfg(feature = "local-embed")]
fn local_embedder(request: &RequestConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(crate::embed::FastEmbedder::new(request.timeout())?))
}

#[cfg(not(feature = "local-embed"))]
fn local_embedder(_request: &RequestConfig) -> Result<Arc<dyn Embedder>> {
    Err(Error::Configuration(
        "the fastembed provider requires the local-embed feature".to_string(),
    ))
}

/// Ingestion and question answering over one shared vector store.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    ingestor: Ingestor,
    retriever: Option<Retriever>,
    dev_mode: bool,
}

impl Pipeline {
    /// Assemble a pipeline from already constructed components.
    ///
    /// Fails when the embedder and store disagree on dimension.
    pub fn new(components: Components, settings: &Settings) -> Result<Self> {
        let Components {
            extractor,
            embedder,
            store,
            generator,
        } = components;

        let model = embedder.model();
        if model.dimension != store.dimension() {
            return Err(Error::Configuration(format!(
                "embedding model {} produces {} dimensions but the {} store holds {}",
                model.name,
                model.dimension,
                store.name(),
                store.dimension()
            )));
        }

        let chunker = FixedSizeChunker::from_config(&settings.chunking)?;
        let ingestor = Ingestor::new(
            Arc::new(chunker),
            embedder.clone(),
            store.clone(),
            settings.request.ingest_concurrency,
        );
        let retriever = generator.map(|generator| {
            Retriever::new(
                embedder.clone(),
                store.clone(),
                generator,
                settings.retrieval.clone(),
            )
        });

        info!(
            embedder = %model.name,
            dimension = model.dimension,
            store = store.name(),
            extractor = extractor.name(),
            answering = retriever.is_some(),
            "Pipeline ready"
        );

        Ok(Self {
            extractor,
            embedder,
            store,
            ingestor,
            retriever,
            dev_mode: settings.dev_mode,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(Components::from_settings(settings)?, settings)
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Extract, chunk, embed and store a PDF.
    pub async fn ingest(&self, bytes: &[u8], source_id: &str) -> Result<IngestResult> {
        let document = self.extractor.extract(bytes).await?;
        self.ingestor.ingest(&document, source_id).await
    }

    /// Ingest text that needs no extraction. Form feeds mark page breaks.
    pub async fn ingest_text(&self, text: &str, source_id: &str) -> Result<IngestResult> {
        self.ingestor
            .ingest(&ExtractedText::from_paged(text), source_id)
            .await
    }

    pub async fn answer(&self, question: &str) -> Result<Outcome> {
        if question.trim().is_empty() {
            return Err(Error::Validation(QUESTION_REQUIRED.to_string()));
        }
        let retriever = self.retriever.as_ref().ok_or_else(|| {
            Error::Configuration("answering requires a Groq API key".to_string())
        })?;
        retriever.answer(question).await
    }

    pub async fn handle_ingest(&self, upload: Upload) -> IngestResponse {
        if let Err(message) = upload.validate() {
            return IngestResponse::Rejected {
                message: message.to_string(),
            };
        }

        let source_id = upload.filename.as_deref().unwrap_or("upload.pdf");
        let result = self.ingest(&upload.bytes, source_id).await;
        self.render_ingest(source_id, result)
    }

    /// Boundary for plain-text documents, which skip upload validation.
    pub async fn handle_ingest_text(&self, text: &str, source_id: &str) -> IngestResponse {
        let result = self.ingest_text(text, source_id).await;
        self.render_ingest(source_id, result)
    }

    fn render_ingest(&self, source_id: &str, result: Result<IngestResult>) -> IngestResponse {
        match result {
            Ok(result) => IngestResponse::Ingested {
                message: INGEST_SUCCESS.to_string(),
                chunks_inserted: result.chunks_inserted,
            },
            Err(Error::Validation(message)) => IngestResponse::Rejected { message },
            Err(e) => {
                error!(source = %source_id, error = %e, "Ingestion failed");
                IngestResponse::Failed(Failure::new(&e, self.dev_mode))
            }
        }
    }

    pub async fn handle_answer(&self, request: AnswerRequest) -> AnswerResponse {
        let question = request.question.unwrap_or_default();
        match self.answer(&question).await {
            Ok(Outcome::Answered {
                answer,
                sources_used,
                ..
            }) => AnswerResponse::Answered {
                answer,
                sources_used,
            },
            Ok(Outcome::NoRelevantDocuments { message }) | Err(Error::Validation(message)) => {
                AnswerResponse::Rejected { message }
            }
            Err(e) => {
                error!(error = %e, "Answering failed");
                AnswerResponse::Failed(Failure::new(&e, self.dev_mode))
            }
        }
    }
}

/// Uploaded document as received by a front end.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    /// Declared media type, if the transport carries one
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn pdf(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: Some(PDF_CONTENT_TYPE.to_string()),
            bytes,
        }
    }

    fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.bytes.is_empty() {
            return Err(NO_FILE);
        }
        let declared_pdf = self
            .content_type
            .as_deref()
            .map_or(true, |ct| ct.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE));
        if !declared_pdf || !self.bytes.starts_with(PDF_MAGIC) {
            return Err(NOT_A_PDF);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub question: Option<String>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
        }
    }
}

/// Error rendered for callers; `detail` carries the full chain in dev mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error: String,
    pub detail: Option<String>,
}

impl Failure {
    fn new(err: &Error, dev_mode: bool) -> Self {
        Self {
            error: err.to_string(),
            detail: dev_mode.then(|| format!("{err:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResponse {
    Ingested { message: String, chunks_inserted: usize },
    Rejected { message: String },
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerResponse {
    Answered { answer: String, sources_used: usize },
    Rejected { message: String },
    Failed(Failure),
}

impl IngestResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ingested { .. })
    }

    /// HTTP status a web front end should use.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Failed(_) => 500,
            _ => 200,
        }
    }
}

impl AnswerResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Failed(_) => 500,
            _ => 200,
        }
    }
}

#[derive(Serialize)]
struct Wire<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources_used: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks_inserted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl<'a> Wire<'a> {
    fn success() -> Self {
        Self::with(true)
    }

    fn rejected(message: &'a str) -> Self {
        Self {
            message: Some(message),
            ..Self::with(false)
        }
    }

    fn failed(failure: &'a Failure) -> Self {
        Self {
            error: Some(&failure.error),
            detail: failure.detail.as_deref(),
            ..Self::with(false)
        }
    }

    fn with(success: bool) -> Self {
        Self {
            success,
            message: None,
            answer: None,
            sources_used: None,
            chunks_inserted: None,
            error: None,
            detail: None,
        }
    }
}

impl Serialize for IngestResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Ingested {
                message,
                chunks_inserted,
            } => Wire {
                message: Some(message),
                chunks_inserted: Some(*chunks_inserted),
                ..Wire::success()
            },
            Self::Rejected { message } => Wire::rejected(message),
            Self::Failed(failure) => Wire::failed(failure),
        };
        wire.serialize(serializer)
    }
}

impl Serialize for AnswerResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Answered {
                answer,
                sources_used,
            } => Wire {
                answer: Some(answer),
                sources_used: Some(*sources_used),
                ..Wire::success()
            },
            Self::Rejected { message } => Wire::rejected(message),
            Self::Failed(failure) => Wire::failed(failure),
        };
        wire.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::retrieve::NO_RELEVANT_DOCUMENTS;
    use crate::testing::{RecordingGenerator, StaticEmbedder, StaticExtractor};

    const PDF: &[u8] = b"%PDF-1.7\n...";

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.embedding.provider = EmbeddingProviderKind::Hashing;
        settings
    }

    fn pipeline_with(text: &str, generator: Option<Arc<dyn Generator>>, settings: &Settings) -> Pipeline {
        let components = Components {
            extractor: Arc::new(StaticExtractor::new(text)),
            embedder: Arc::new(HashingEmbedder::new(384)),
            store: Arc::new(MemoryStore::new(384)),
            generator,
        };
        Pipeline::new(components, settings).unwrap()
    }

    fn pipeline(text: &str) -> (Pipeline, Arc<RecordingGenerator>) {
        let generator = Arc::new(RecordingGenerator::answering("Thirty days."));
        let pipeline = pipeline_with(text, Some(generator.clone()), &settings());
        (pipeline, generator)
    }

    fn document(len: usize) -> String {
        "refund policy applies within thirty days of purchase. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let (pipeline, generator) = pipeline("unused");

        for request in [AnswerRequest::new(""), AnswerRequest::new("   "), AnswerRequest::default()] {
            let response = pipeline.handle_answer(request).await;
            assert_eq!(
                serde_json::to_value(&response).unwrap(),
                json!({"success": false, "message": "Question is required"})
            );
        }
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pdf_ingest_reports_chunks() {
        let (pipeline, _) = pipeline(&document(2400));

        let response = pipeline.handle_ingest(Upload::pdf("policy.pdf", PDF.to_vec())).await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": true, "message": "PDF processed successfully", "chunks_inserted": 3})
        );
        assert_eq!(pipeline.store().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (pipeline, _) = pipeline(&document(100));

        let missing = pipeline.handle_ingest(Upload::default()).await;
        assert_eq!(missing, IngestResponse::Rejected { message: NO_FILE.to_string() });

        let mut wrong_type = Upload::pdf("notes.txt", PDF.to_vec());
        wrong_type.content_type = Some("text/plain".to_string());
        let wrong_type = pipeline.handle_ingest(wrong_type).await;
        assert_eq!(wrong_type, IngestResponse::Rejected { message: NOT_A_PDF.to_string() });

        let wrong_bytes = pipeline.handle_ingest(Upload::pdf("fake.pdf", b"hello".to_vec())).await;
        assert_eq!(wrong_bytes, IngestResponse::Rejected { message: NOT_A_PDF.to_string() });

        let untyped = Upload {
            filename: None,
            content_type: None,
            bytes: PDF.to_vec(),
        };
        assert!(pipeline.handle_ingest(untyped).await.is_success());
        assert_eq!(pipeline.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_pdf_is_rejected_not_failed() {
        let (pipeline, _) = pipeline(" \u{c} \n");

        let response = pipeline.handle_ingest(Upload::pdf("scan.pdf", PDF.to_vec())).await;
        assert_eq!(
            response,
            IngestResponse::Rejected {
                message: "document contains no extractable text".to_string()
            }
        );
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn test_ingest_then_answer() {
        let (pipeline, generator) = pipeline(&document(2400));
        pipeline.ingest(PDF, "policy.pdf").await.unwrap();

        let response = pipeline
            .handle_answer(AnswerRequest::new("refund within thirty days?"))
            .await;
        let AnswerResponse::Answered { answer, sources_used } = response else {
            panic!("expected an answer, got {response:?}");
        };
        assert_eq!(answer, "Thirty days.");
        assert_eq!(sources_used, 3);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_index_answer() {
        let (pipeline, _) = pipeline("unused");

        let response = pipeline.handle_answer(AnswerRequest::new("anything?")).await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "message": NO_RELEVANT_DOCUMENTS})
        );
    }

    #[tokio::test]
    async fn test_failure_detail_only_in_dev_mode() {
        let failing: Option<Arc<dyn Generator>> = Some(Arc::new(RecordingGenerator::failing("upstream 503")));

        let quiet = pipeline_with("", failing.clone(), &settings());
        quiet.ingest_text(&document(300), "a.txt").await.unwrap();
        let response = quiet.handle_answer(AnswerRequest::new("refund?")).await;
        assert_eq!(response.status_code(), 500);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "error": "generation error: upstream 503"})
        );

        let mut dev = settings();
        dev.dev_mode = true;
        let verbose = pipeline_with("", failing, &dev);
        verbose.ingest_text(&document(300), "a.txt").await.unwrap();
        let value = serde_json::to_value(verbose.handle_answer(AnswerRequest::new("refund?")).await).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["detail"].as_str().unwrap().contains("Generation"));
    }

    #[tokio::test]
    async fn test_text_ingest_failure_is_rendered() {
        let components = Components {
            extractor: Arc::new(StaticExtractor::new("")),
            embedder: Arc::new(StaticEmbedder::failing_on(384, "refund")),
            store: Arc::new(MemoryStore::new(384)),
            generator: None,
        };
        let pipeline = Pipeline::new(components, &settings()).unwrap();

        let response = pipeline.handle_ingest_text(&document(2400), "notes.txt").await;
        let IngestResponse::Failed(failure) = response else {
            panic!("expected failure, got {response:?}");
        };
        assert!(failure.error.starts_with("ingestion failed at chunk"));
        assert_eq!(failure.detail, None);
    }

    #[tokio::test]
    async fn test_answer_without_generator_is_configuration_error() {
        let pipeline = pipeline_with("unused", None, &settings());
        assert!(matches!(pipeline.answer("q").await, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_dimension_mismatch_refuses_to_start() {
        let components = Components {
            extractor: Arc::new(StaticExtractor::new("")),
            embedder: Arc::new(StaticEmbedder::new(768)),
            store: Arc::new(MemoryStore::new(384)),
            generator: None,
        };
        assert!(matches!(
            Pipeline::new(components, &settings()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_from_settings() {
        let pipeline = Pipeline::from_settings(&settings()).unwrap();
        assert_eq!(pipeline.embedder().model().dimension, 384);
        assert_eq!(pipeline.store().name(), "memory");
        assert!(pipeline.retriever.is_none());

        // the reference configuration needs a HuggingFace key
        assert!(matches!(
            Pipeline::from_settings(&Settings::default()),
            Err(Error::Configuration(_))
        ));

        let mut with_groq = settings();
        with_groq.generation.api_key = Some("gsk_test".to_string());
        assert!(Pipeline::from_settings(&with_groq).unwrap().retriever.is_some());
    }
}
