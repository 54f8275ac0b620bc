//! Pre-scripted retriever for tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use loom_domain::error::{Error, Result};

use crate::retriever::{Chunk, ContextRetriever};

/// A deterministic [`ContextRetriever`]: each call pops the next scripted
/// outcome; when the script is empty it returns an empty chunk list, so
/// tests that don't care about retrieval need no setup.
#[derive(Default)]
pub struct ScriptedRetriever {
    script: Mutex<VecDeque<Result<Vec<Chunk>>>>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunks(&self, chunks: Vec<Chunk>) -> &Self {
        self.script.lock().push_back(Ok(chunks));
        self
    }

    pub fn push_err(&self, err: Error) -> &Self {
        self.script.lock().push_back(Err(err));
        self
    }

    /// All `(query, k)` pairs seen so far, in order.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().clone()
    }
}

/// Convenience for building a scripted chunk.
pub fn chunk(id: &str, text: &str, score: f32) -> Chunk {
    Chunk {
        id: id.into(),
        text: text.into(),
        score,
    }
}

#[async_trait::async_trait]
impl ContextRetriever for ScriptedRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.queries.lock().push((query.to_owned(), k));
        self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_script_yields_empty_context() {
        let retriever = ScriptedRetriever::new();
        let chunks = retriever.retrieve("scott's addition", 5).await.unwrap();
        assert!(chunks.is_empty());
        assert_eq!(retriever.queries(), vec![("scott's addition".to_string(), 5)]);
    }

    #[tokio::test]
    async fn scripted_outcomes_pop_in_order() {
        let retriever = ScriptedRetriever::new();
        retriever
            .push_chunks(vec![chunk("c1", "the fan district", 0.9)])
            .push_err(Error::Unavailable("index offline".into()));

        let first = retriever.retrieve("q1", 3).await.unwrap();
        assert_eq!(first[0].id, "c1");

        let err = retriever.retrieve("q2", 3).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }
}
