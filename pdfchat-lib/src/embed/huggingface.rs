use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EmbeddingConfig, RequestConfig};
use crate::embed::{Embedder, Embedding, EmbeddingModel};
use crate::http::{build_client, send_with_retry, RetryPolicy};
use crate::{Error, Result};

/// Embedder backed by the HuggingFace Inference API feature-extraction
/// pipeline.
///
/// Sentence-transformers models return one pooled vector per input. Models
/// without a pooling head return a token-by-dimension matrix, which is
/// mean-pooled here.
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: EmbeddingModel,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
}

impl HuggingFaceEmbedder {
    pub fn new(
        api_key: String,
        model: EmbeddingModel,
        base_url: &str,
        request: &RequestConfig,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("missing HuggingFace API key".to_string()));
        }
        let client = build_client(request.timeout())
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!(
            "{}/models/{}/pipeline/feature-extraction",
            base_url.trim_end_matches('/'),
            model.name
        );
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
            model,
            retry: RetryPolicy::from_config(request),
        })
    }

    pub fn from_config(config: &EmbeddingConfig, request: &RequestConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone().unwrap_or_default(),
            EmbeddingModel::new(config.model.clone(), config.dimension),
            &config.base_url,
            request,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let body = FeatureExtractionRequest { inputs: text };
        let resp = send_with_retry(&self.retry, "HuggingFace feature-extraction", || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .map_err(Error::Embedding)?;

        let parsed: FeatureExtractionResponse = resp
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to parse HuggingFace response: {e}")))?;
        let embedding = pool(parsed)?;
        debug!(model = %self.model.name, dims = embedding.len(), "Generated embedding");
        Ok(embedding)
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

fn pool(response: FeatureExtractionResponse) -> Result<Embedding> {
    match response {
        FeatureExtractionResponse::Pooled(v) if !v.is_empty() => Ok(v),
        FeatureExtractionResponse::Tokens(rows) if !rows.is_empty() => {
            if rows.len() == 1 {
                return Ok(rows.into_iter().next().unwrap_or_default());
            }
            let dims = rows[0].len();
            if rows.iter().any(|r| r.len() != dims) {
                return Err(Error::Embedding(
                    "token embeddings have inconsistent widths".to_string(),
                ));
            }
            let mut mean = vec![0.0f32; dims];
            for row in &rows {
                for (m, x) in mean.iter_mut().zip(row) {
                    *m += x;
                }
            }
            let n = rows.len() as f32;
            mean.iter_mut().for_each(|m| *m /= n);
            Ok(mean)
        }
        _ => Err(Error::Embedding("HuggingFace returned an empty embedding".to_string())),
    }
}
