//! Session model — the central entity of the conversation service.
//!
//! A [`Session`] carries the full observable history of one user's journey
//! from seed idea to finished story: the stage machine position, the
//! append-only turn log, and the [`StoryElements`] accumulator that the
//! engine fills in stage by stage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::style::StoryStyle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Position in the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Kickoff,
    DepthAnalysis,
    FollowUp,
    PersonalAnecdote,
    HookGeneration,
    HookSelection,
    ArcDevelopment,
    QuoteIntegration,
    CtaGeneration,
    CtaSelection,
    ReadyToGenerate,
    StoryGenerated,
}

impl Stage {
    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Kickoff => "kickoff",
            Stage::DepthAnalysis => "depth_analysis",
            Stage::FollowUp => "follow_up",
            Stage::PersonalAnecdote => "personal_anecdote",
            Stage::HookGeneration => "hook_generation",
            Stage::HookSelection => "hook_selection",
            Stage::ArcDevelopment => "arc_development",
            Stage::QuoteIntegration => "quote_integration",
            Stage::CtaGeneration => "cta_generation",
            Stage::CtaSelection => "cta_selection",
            Stage::ReadyToGenerate => "ready_to_generate",
            Stage::StoryGenerated => "story_generated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::StoryGenerated)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
    Expired,
}

impl SessionStatus {
    /// Terminal sessions are read-only; any mutating operation fails.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// One observable event in a session. Entries are append-only and
/// immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub role: TurnRole,
    pub content: String,
    pub stage_at_emission: Stage,
    pub timestamp: DateTime<Utc>,
    /// Named structured payloads attached to the turn (e.g. the three
    /// hook candidates, or the parsed depth score).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attachments: serde_json::Map<String, serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Story elements
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One generated hook or call-to-action candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthClass {
    Sufficient,
    Insufficient,
}

/// Result of the depth analysis over the seed idea.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthAssessment {
    /// Numeric judgment in `[0, 5]`.
    pub score: f32,
    pub classification: DepthClass,
}

/// The terminal artifact assembled from the accumulated fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStory {
    pub text: String,
    pub style: StoryStyle,
    /// Whitespace-delimited token count of the trimmed text.
    pub word_count: usize,
    pub themes: Vec<String>,
    pub tone: String,
    pub angle: String,
    /// Number of corpus chunks retrieved for the final assembly.
    pub richmond_context_used: usize,
}

/// Accumulator filled stage-by-stage as the conversation progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryElements {
    /// The seed input. Set exactly once, at session creation.
    pub core_idea: String,
    #[serde(default)]
    pub depth: Option<DepthAssessment>,
    /// Answers collected while in the follow-up stage.
    #[serde(default)]
    pub follow_up_answers: Vec<String>,
    #[serde(default)]
    pub personal_anecdote: Option<String>,
    /// Empty until generated; exactly three once generated.
    #[serde(default)]
    pub hook_candidates: Vec<Candidate>,
    #[serde(default)]
    pub selected_hook_index: Option<usize>,
    #[serde(default)]
    pub narrative_arc: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub cta_candidates: Vec<Candidate>,
    #[serde(default)]
    pub selected_cta_index: Option<usize>,
    #[serde(default)]
    pub final_story: Option<FinalStory>,
}

impl StoryElements {
    pub fn new(core_idea: String) -> Self {
        Self {
            core_idea,
            depth: None,
            follow_up_answers: Vec::new(),
            personal_anecdote: None,
            hook_candidates: Vec::new(),
            selected_hook_index: None,
            narrative_arc: None,
            quote: None,
            cta_candidates: Vec::new(),
            selected_cta_index: None,
            final_story: None,
        }
    }

    /// The core idea plus everything the user added to deepen it.
    /// This is the query text for hook-stage retrieval.
    pub fn enriched_core(&self) -> String {
        let mut parts = vec![self.core_idea.clone()];
        parts.extend(self.follow_up_answers.iter().cloned());
        if let Some(ref anecdote) = self.personal_anecdote {
            parts.push(anecdote.clone());
        }
        parts.join("\n\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session counters and opaque caller identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub turn_count: u64,
    #[serde(default)]
    pub llm_calls: u64,
    #[serde(default)]
    pub context_chunks_used: u64,
    /// Opaque user identifier; may be empty.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// The central entity: one user's conversation from seed idea to story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Absolute time after which the session expires; refreshed on each
    /// committed turn while active.
    pub ttl_deadline: DateTime<Utc>,
    pub stage: Stage,
    pub history: Vec<Turn>,
    pub elements: StoryElements,
    #[serde(default)]
    pub metadata: SessionMetadata,
    /// Monotonic commit counter used for conditional updates.
    #[serde(default)]
    pub version: u64,
}

impl Session {
    pub fn new(
        id: String,
        core_idea: String,
        user_id: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            status: SessionStatus::Active,
            ttl_deadline: now + ttl,
            stage: Stage::Kickoff,
            history: Vec::new(),
            elements: StoryElements::new(core_idea),
            metadata: SessionMetadata {
                user_id,
                ..Default::default()
            },
            version: 0,
        }
    }

    /// Append a turn with the next dense index.
    pub fn push_turn(&mut self, role: TurnRole, content: impl Into<String>, now: DateTime<Utc>) {
        self.push_turn_with(role, content, now, serde_json::Map::new());
    }

    pub fn push_turn_with(
        &mut self,
        role: TurnRole,
        content: impl Into<String>,
        now: DateTime<Utc>,
        attachments: serde_json::Map<String, serde_json::Value>,
    ) {
        let turn = Turn {
            index: self.history.len(),
            role,
            content: content.into(),
            stage_at_emission: self.stage,
            timestamp: now,
            attachments,
        };
        self.history.push(turn);
        self.metadata.turn_count = self.history.len() as u64;
    }

    pub fn is_read_only(&self) -> bool {
        self.status.is_terminal()
    }

    /// Structural invariants checked after every committed mutation.
    ///
    /// A violation rejects the commit; the stored session is untouched.
    pub fn check_invariants(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> {
            Err(Error::InvalidTransition {
                stage: self.stage,
                message,
            })
        };

        if self.elements.core_idea.trim().is_empty() {
            return fail("core_idea must not be empty".into());
        }

        for (i, turn) in self.history.iter().enumerate() {
            if turn.index != i {
                return fail(format!(
                    "turn indices must be dense from 0 (found {} at position {i})",
                    turn.index
                ));
            }
        }

        match self.elements.hook_candidates.len() {
            0 | 3 => {}
            n => return fail(format!("hook_candidates must be empty or exactly 3 (got {n})")),
        }
        match self.elements.cta_candidates.len() {
            0 | 3 => {}
            n => return fail(format!("cta_candidates must be empty or exactly 3 (got {n})")),
        }

        if let Some(i) = self.elements.selected_hook_index {
            if self.elements.hook_candidates.len() != 3 {
                return fail("hook selected before candidates were generated".into());
            }
            if i > 2 {
                return fail(format!("selected_hook_index out of range: {i}"));
            }
        }
        if let Some(i) = self.elements.selected_cta_index {
            if self.elements.cta_candidates.len() != 3 {
                return fail("cta selected before candidates were generated".into());
            }
            if i > 2 {
                return fail(format!("selected_cta_index out of range: {i}"));
            }
        }

        if self.elements.final_story.is_some() && self.stage != Stage::StoryGenerated {
            return fail("final_story may exist only at story_generated".into());
        }
        if self.status == SessionStatus::Completed {
            if self.elements.final_story.is_none() || self.stage != Stage::StoryGenerated {
                return fail("completed session must hold a final story".into());
            }
        }

        if self.updated_at < self.created_at {
            return fail("updated_at must not precede created_at".into());
        }
        if self.status == SessionStatus::Active && self.ttl_deadline <= self.updated_at {
            return fail("ttl_deadline must lie beyond updated_at while active".into());
        }

        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            stage: self.stage,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            turn_count: self.history.len(),
            user_id: self.metadata.user_id.clone(),
        }
    }
}

/// Compact listing row for observability endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub stage: Stage,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Deep, immutable copy of a session for offline inspection.
///
/// `schema_version` guards re-import: a snapshot written by a newer layout
/// is rejected rather than silently misread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub session: Session,
}

impl SessionSnapshot {
    pub const SCHEMA_VERSION: u32 = 1;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
