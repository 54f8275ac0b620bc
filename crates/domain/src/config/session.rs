use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime of an active session. Refreshed on each committed turn.
    #[serde(default = "d_86400")]
    pub ttl_secs: u64,
    /// How long terminal sessions (completed / expired / abandoned) remain
    /// exportable before the sweeper purges them.
    #[serde(default = "d_604800")]
    pub retention_secs: u64,
    /// Interval between TTL sweeps.
    #[serde(default = "d_60")]
    pub sweep_interval_secs: u64,
    /// Interval between persistence flushes.
    #[serde(default = "d_30")]
    pub flush_interval_secs: u64,
    /// Directory holding the persisted session file.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            retention_secs: 604_800,
            sweep_interval_secs: 60,
            flush_interval_secs: 30,
            state_path: d_state_path(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_86400() -> u64 {
    86_400
}
fn d_604800() -> u64 {
    604_800
}
fn d_60() -> u64 {
    60
}
fn d_30() -> u64 {
    30
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
