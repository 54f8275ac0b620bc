use serde::{Deserialize, Serialize};

use loom_domain::session::{Candidate, FinalStory, Stage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine replies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which kind of candidate an option payload (or selection) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Hook,
    Cta,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OptionKind::Hook => "hook",
            OptionKind::Cta => "cta",
        })
    }
}

/// Exactly three candidates offered for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsPayload {
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub options: Vec<Candidate>,
}

/// Reply to a `start` call.
#[derive(Debug, Clone, Serialize)]
pub struct StartReply {
    pub session_id: String,
    pub stage: Stage,
    pub next_question: String,
}

/// Reply to a `continue` call.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub message: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_story: Option<FinalStory>,
}

impl TurnReply {
    pub fn plain(message: impl Into<String>, stage: Stage) -> Self {
        Self {
            message: message.into(),
            stage,
            options: None,
            final_story: None,
        }
    }
}

/// Reply to a `select_option` call.
#[derive(Debug, Clone, Serialize)]
pub struct SelectReply {
    pub message: String,
    pub stage: Stage,
}
