//! Pre-scripted completion client for tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use loom_domain::error::{Error, Result};

use crate::client::{CompletionClient, CompletionRequest};

/// A deterministic [`CompletionClient`]: each call pops the next scripted
/// outcome from the front of the queue, and every request is recorded so
/// tests can inspect what was sent.
#[derive(Default)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion.
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.script.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn push_err(&self, err: Error) -> &Self {
        self.script.lock().push_back(Err(err));
        self
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        self.requests.lock().push(req);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Unavailable("completion script exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            prompt: prompt.into(),
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn pops_outcomes_in_order() {
        let client = ScriptedCompletionClient::new();
        client.push_text("first").push_text("second");

        assert_eq!(client.complete(req("a")).await.unwrap(), "first");
        assert_eq!(client.complete(req("b")).await.unwrap(), "second");
        assert_eq!(client.requests().len(), 2);
        assert_eq!(client.requests()[1].prompt, "b");
    }

    #[tokio::test]
    async fn exhausted_script_is_unavailable() {
        let client = ScriptedCompletionClient::new();
        let err = client.complete(req("a")).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }
}
