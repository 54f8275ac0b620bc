use loom_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single synchronous completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Token cap for this call (the style table decides it for final
    /// assembly; intermediate steps use a modest fixed budget).
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every completion backend implements.
///
/// Retry, backoff, and the per-call deadline live inside the client;
/// callers never wrap `complete` in their own retry loop. Identical
/// prompts are not cached here — any caching belongs to the caller.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and wait for the full text of the response.
    async fn complete(&self, req: CompletionRequest) -> Result<String>;
}
