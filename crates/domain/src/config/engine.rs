use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reissues allowed when hook generation yields fewer than three
    /// parseable candidates.
    #[serde(default = "d_2")]
    pub hook_retries: u32,
    /// Same bound for call-to-action generation.
    #[serde(default = "d_2")]
    pub cta_retries: u32,
    /// Minimum length of the seed idea.
    #[serde(default = "d_10")]
    pub min_core_idea_chars: usize,
    /// Depth scores below this route through the follow-up stage.
    #[serde(default = "d_threshold")]
    pub depth_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hook_retries: 2,
            cta_retries: 2,
            min_core_idea_chars: 10,
            depth_threshold: 3.0,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_2() -> u32 {
    2
}
fn d_10() -> usize {
    10
}
fn d_threshold() -> f32 {
    3.0
}
