use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speech-to-text provider (external collaborator; key only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Environment variable holding the transcription provider key.
    /// Transcription itself happens upstream; the key is validated here so
    /// a deployment that relies on it fails at startup, not mid-session.
    #[serde(default = "d_stt_key_env")]
    pub api_key_env: String,
    /// When true, startup fails if the key is absent.
    #[serde(default)]
    pub required: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key_env: d_stt_key_env(),
            required: false,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_stt_key_env() -> String {
    "LOOM_STT_API_KEY".into()
}
