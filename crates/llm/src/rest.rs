//! REST implementation of [`CompletionClient`].
//!
//! Wraps a `reqwest::Client` speaking the OpenAI-compatible
//! `/v1/chat/completions` wire format, with automatic retry + exponential
//! back-off on transient (transport / 5xx) failures, a hard per-call
//! deadline, and an admission semaphore bounding completions in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Deserialize;
use tokio::sync::Semaphore;

use loom_domain::clock::idempotency_token;
use loom_domain::config::LlmConfig;
use loom_domain::error::{Error, Result};

use crate::client::{CompletionClient, CompletionRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based completion client.
///
/// Created once and reused for the lifetime of the process. The
/// underlying `reqwest::Client` maintains a connection pool; the
/// semaphore is the service-wide backpressure point for the LLM.
pub struct RestCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    deadline: Duration,
    max_retries: u32,
    admission: Arc<Semaphore>,
    admission_timeout: Duration,
}

impl RestCompletionClient {
    /// Build a new client from the shared [`LlmConfig`] and the resolved
    /// API key. The key is held in memory only; it never appears in logs.
    pub fn new(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let deadline = Duration::from_secs(cfg.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: cfg.model.clone(),
            deadline,
            max_retries: cfg.max_retries,
            admission: Arc::new(Semaphore::new(cfg.max_inflight)),
            admission_timeout: Duration::from_secs(cfg.admission_timeout_secs),
        })
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Run the bounded retry loop for one completion.
    ///
    /// * Retries on transport errors and 5xx status codes.
    /// * Does **not** retry on 4xx (client errors are permanent).
    /// * The caller wraps this in the hard per-call deadline.
    async fn complete_with_retry(&self, req: &CompletionRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": req.prompt }],
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_with_jitter(attempt)).await;
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
                    tracing::debug!(status = status.as_u16(), duration_ms, attempt, "completion call");

                    if status.is_server_error() {
                        // 5xx — transient, retry
                        let text = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Unavailable(format!(
                            "completion service returned {status}: {text}"
                        )));
                        continue;
                    }

                    if status.is_client_error() {
                        // 4xx — permanent, do NOT retry
                        let text = resp.text().await.unwrap_or_default();
                        return Err(Error::InvalidInput(format!(
                            "completion service rejected the request ({status}): {text}"
                        )));
                    }

                    let raw = resp
                        .text()
                        .await
                        .map_err(|e| Error::Unavailable(e.to_string()))?;
                    return parse_completion(&raw);
                }
                Err(e) if e.is_timeout() => {
                    // The per-attempt clock ran out; the outer deadline is
                    // authoritative, so surface the timeout directly.
                    return Err(Error::GenerationTimeout(
                        "completion call exceeded its deadline".into(),
                    ));
                }
                Err(e) => {
                    tracing::debug!(error = %e, duration_ms, attempt, "completion transport error");
                    last_err = Some(Error::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Unavailable("completion retries exhausted".into())))
    }
}

#[async_trait::async_trait]
impl CompletionClient for RestCompletionClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        // Admission: bounded in-flight completions protect the provider.
        let permit = tokio::time::timeout(
            self.admission_timeout,
            self.admission.clone().acquire_owned(),
        )
        .await
        .map_err(|_| Error::Unavailable("completion admission queue is full".into()))?
        .map_err(|_| Error::Unavailable("completion admission closed".into()))?;

        // Hard deadline spans every retry attempt of this call.
        let result = tokio::time::timeout(self.deadline, self.complete_with_retry(&req))
            .await
            .map_err(|_| {
                Error::GenerationTimeout("completion call exceeded its deadline".into())
            })?;

        drop(permit);
        result
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: String,
}

fn parse_completion(raw: &str) -> Result<String> {
    let parsed: WireResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Unavailable(format!("malformed completion response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| Error::Unavailable("completion response held no choices".into()))
}

/// Exponential back-off (100ms base, doubling) with uniform jitter.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = 100u64 * 2u64.pow(attempt - 1);
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
