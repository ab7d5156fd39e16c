use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::chunk::ChunkMetadata;
use crate::config::{RequestConfig, StoreConfig};
use crate::embed::to_vector_literal;
use crate::http::{build_client_with_headers, send_with_retry, RetryPolicy};
use crate::store::{rank_descending, ChunkId, SearchResult, StoredChunk, VectorStore};
use crate::{Error, Result};

/// SQL that provisions the `documents` table plus the `insert_document` and
/// `match_documents` functions this store calls, with a 384-wide vector
/// column. Use [`supabase_schema_sql`] for other widths.
pub const SUPABASE_SCHEMA_SQL: &str = include_str!("../../sql/supabase.sql");

const SCHEMA_VECTOR_TYPE: &str = "vector(384)";

/// [`SUPABASE_SCHEMA_SQL`] with the `embedding` column sized to `dimension`.
pub fn supabase_schema_sql(dimension: usize) -> String {
    SUPABASE_SCHEMA_SQL.replace(SCHEMA_VECTOR_TYPE, &format!("vector({dimension})"))
}

/// Vector store backed by a Supabase (pgvector) table.
///
/// Inserts and searches go through PostgREST RPC so that embeddings travel
/// as pgvector text literals and the cosine ranking happens in the database.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    table: String,
    dimension: usize,
    retry: RetryPolicy,
    /// `insert_document` is not idempotent, so it never retries once the
    /// server may have seen the call.
    write_retry: RetryPolicy,
}

#[derive(Serialize)]
struct InsertArgs<'a> {
    p_content: &'a str,
    p_metadata: &'a ChunkMetadata,
    p_embedding: String,
}

#[derive(Serialize)]
struct MatchArgs {
    query_embedding: String,
    match_count: usize,
    filter: Value,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    id: Value,
    content: String,
    #[serde(default)]
    metadata: Value,
    similarity: f32,
}

impl SupabaseStore {
    pub fn new(
        url: &str,
        api_key: &str,
        table: impl Into<String>,
        dimension: usize,
        request: &RequestConfig,
    ) -> Result<Self> {
        if url.trim().is_empty() || api_key.trim().is_empty() {
            return Err(Error::Configuration(
                "Supabase URL and key are required".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| Error::Configuration("invalid Supabase key".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| Error::Configuration("invalid Supabase key".to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = build_client_with_headers(request.timeout(), headers)
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim().trim_end_matches('/')),
            table: table.into(),
            dimension,
            retry: RetryPolicy::from_config(request),
            write_retry: RetryPolicy::for_writes(request),
        })
    }

    pub fn from_config(config: &StoreConfig, dimension: usize, request: &RequestConfig) -> Result<Self> {
        Self::new(
            config.url.as_deref().unwrap_or_default(),
            config.api_key.as_deref().unwrap_or_default(),
            config.table.clone(),
            dimension,
            request,
        )
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rpc/{}", self.rest_url, function)
    }
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn insert(
        &self,
        content: &str,
        metadata: &ChunkMetadata,
        embedding: &[f32],
    ) -> Result<ChunkId> {
        if embedding.len() != self.dimension {
            return Err(Error::Store(format!(
                "embedding has {} dimensions, table expects {}",
                embedding.len(),
                self.dimension
            )));
        }

        let args = InsertArgs {
            p_content: content,
            p_metadata: metadata,
            p_embedding: to_vector_literal(embedding),
        };
        let url = self.rpc_url("insert_document");
        let resp = send_with_retry(&self.write_retry, "Supabase insert_document", || {
            self.client.post(&url).json(&args)
        })
        .await
        .map_err(Error::Store)?;

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Store(format!("failed to read insert response: {e}")))?;
        let id = parse_inserted_id(&body).unwrap_or_else(|| {
            // functions declared `returns void` give no id back
            let local = Ulid::new().to_string();
            debug!(local_id = %local, "insert_document returned no id");
            local
        });
        debug!(id = %id, index = metadata.index, "Inserted chunk");
        Ok(id)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let args = MatchArgs {
            query_embedding: to_vector_literal(query),
            match_count: k,
            filter: json!({}),
        };
        let url = self.rpc_url("match_documents");
        debug!(match_count = k, literal_len = args.query_embedding.len(), "Calling match_documents");

        let resp = send_with_retry(&self.retry, "Supabase match_documents", || {
            self.client.post(&url).json(&args)
        })
        .await
        .map_err(Error::Store)?;

        let rows: Vec<MatchRow> = resp
            .json()
            .await
            .map_err(|e| Error::Store(format!("failed to parse match_documents response: {e}")))?;

        let mut results: Vec<SearchResult> = rows.into_iter().map(into_result).collect();
        rank_descending(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let url = format!("{}/{}", self.rest_url, self.table);
        let resp = send_with_retry(&self.retry, "Supabase count", || {
            self.client
                .head(&url)
                .query(&[("select", "id")])
                .header("Prefer", "count=exact")
        })
        .await
        .map_err(Error::Store)?;

        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Store("count response has no Content-Range header".to_string()))?;
        let count = parse_content_range_total(range)
            .ok_or_else(|| Error::Store(format!("unexpected Content-Range '{range}'")))?;
        info!(table = %self.table, count, "Counted stored chunks");
        Ok(count)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

fn into_result(row: MatchRow) -> SearchResult {
    let id = match row.id {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let metadata = serde_json::from_value(row.metadata).unwrap_or_else(|e| {
        warn!(id = %id, error = %e, "Unrecognised chunk metadata, using defaults");
        ChunkMetadata::default()
    });
    SearchResult {
        chunk: StoredChunk {
            id,
            content: row.content,
            metadata,
        },
        similarity: row.similarity,
    }
}

/// Extract the id returned by `insert_document`, if any.
fn parse_inserted_id(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Number(n) => Some(n.to_string()),
            Value::Object(map) => map.get("id").map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            _ => None,
        }),
        Value::Object(map) => map.get("id").map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        _ => None,
    }
}

/// Total from a PostgREST `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range_total(range: &str) -> Option<usize> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}
