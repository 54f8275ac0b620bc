use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM completion service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    /// Model name sent with every completion request.
    #[serde(default = "d_model")]
    pub model: String,
    /// Hard deadline per completion call.
    #[serde(default = "d_60")]
    pub timeout_secs: u64,
    /// Bounded retries on transport errors and 5xx responses.
    #[serde(default = "d_3")]
    pub max_retries: u32,
    #[serde(default = "d_temp")]
    pub temperature: f32,
    /// Bounded concurrency: completions in flight at once.
    #[serde(default = "d_32")]
    pub max_inflight: usize,
    /// How long an excess request may wait for an admission slot before
    /// failing fast.
    #[serde(default = "d_10")]
    pub admission_timeout_secs: u64,
    /// Environment variable holding the provider API key.
    #[serde(default = "d_llm_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_url(),
            model: d_model(),
            timeout_secs: 60,
            max_retries: 3,
            temperature: 0.7,
            max_inflight: 32,
            admission_timeout_secs: 10,
            api_key_env: d_llm_key_env(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_llm_url() -> String {
    "https://api.openai.com".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_60() -> u64 {
    60
}
fn d_3() -> u32 {
    3
}
fn d_temp() -> f32 {
    0.7
}
fn d_32() -> usize {
    32
}
fn d_10() -> u64 {
    10
}
fn d_llm_key_env() -> String {
    "LOOM_LLM_API_KEY".into()
}
