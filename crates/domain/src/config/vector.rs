use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vector search service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "d_vector_url")]
    pub base_url: String,
    /// Default number of context chunks fetched per retrieval.
    #[serde(default = "d_5")]
    pub top_k: usize,
    #[serde(default = "d_8")]
    pub timeout_secs: u64,
    #[serde(default = "d_3")]
    pub max_retries: u32,
    /// Environment variable holding the provider API key.
    #[serde(default = "d_vector_key_env")]
    pub api_key_env: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            base_url: d_vector_url(),
            top_k: 5,
            timeout_secs: 8,
            max_retries: 3,
            api_key_env: d_vector_key_env(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_vector_url() -> String {
    "http://localhost:6333".into()
}
fn d_5() -> usize {
    5
}
fn d_8() -> u64 {
    8
}
fn d_3() -> u32 {
    3
}
fn d_vector_key_env() -> String {
    "LOOM_VECTOR_API_KEY".into()
}
