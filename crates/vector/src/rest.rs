//! REST implementation of [`ContextRetriever`].
//!
//! Translates `retrieve` into a POST against the vector search service,
//! with automatic retry + exponential back-off on transient (transport /
//! 5xx) failures. 4xx responses are permanent and not retried.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use loom_domain::clock::idempotency_token;
use loom_domain::config::VectorConfig;
use loom_domain::error::{Error, Result};

use crate::retriever::{sort_chunks, Chunk, ContextRetriever};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<Chunk>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based client for the vector search service. Created once and
/// reused; the underlying `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestVectorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl RestVectorClient {
    pub fn new(cfg: &VectorConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
            max_retries: cfg.max_retries,
        })
    }

    async fn search_with_retry(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let url = format!("{}/v1/search", self.base_url);
        let body = SearchRequest { query, top_k: k };

        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let base = 100u64 * 2u64.pow(attempt - 1);
                let jitter = rand::thread_rng().gen_range(0..=base / 2);
                tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("X-Request-Id", idempotency_token())
                .json(&body)
                .send()
                .await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    tracing::debug!(status = status.as_u16(), duration_ms, attempt, "vector search");

                    if status.is_server_error() {
                        let text = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Unavailable(format!(
                            "vector service returned {status}: {text}"
                        )));
                        continue;
                    }
                    if status.is_client_error() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(Error::InvalidInput(format!(
                            "vector service rejected the query ({status}): {text}"
                        )));
                    }

                    let raw = resp
                        .text()
                        .await
                        .map_err(|e| Error::Unavailable(e.to_string()))?;
                    let parsed: SearchResponse = serde_json::from_str(&raw).map_err(|e| {
                        Error::Unavailable(format!("malformed search response: {e}"))
                    })?;

                    let mut chunks = parsed.results;
                    sort_chunks(&mut chunks);
                    chunks.truncate(k);
                    return Ok(chunks);
                }
                Err(e) => {
                    tracing::debug!(error = %e, duration_ms, attempt, "vector transport error");
                    last_err = Some(Error::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Unavailable("vector retries exhausted".into())))
    }
}

#[async_trait::async_trait]
impl ContextRetriever for RestVectorClient {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.search_with_retry(query, k).await
    }
}
