use serde::{Deserialize, Serialize};

use loom_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chunk
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One text snippet from the pre-populated Richmond corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Deterministic result order: descending score, ties broken by chunk id.
pub fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retriever trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Top-k similarity search against the corpus.
///
/// A failed retrieval never fails a conversation turn: the engine
/// degrades to empty context and records a system note instead.
#[async_trait::async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, score: f32) -> Chunk {
        Chunk {
            id: id.into(),
            text: format!("text-{id}"),
            score,
        }
    }

    #[test]
    fn sorts_by_descending_score() {
        let mut chunks = vec![chunk("a", 0.2), chunk("b", 0.9), chunk("c", 0.5)];
        sort_chunks(&mut chunks);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn ties_break_on_chunk_id() {
        let mut chunks = vec![chunk("z", 0.5), chunk("a", 0.5), chunk("m", 0.5)];
        sort_chunks(&mut chunks);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "m", "z"]);
    }
}
