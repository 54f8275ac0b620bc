//! Conversation engine.
//!
//! One engine operation = read the session, compute (including any LLM and
//! retrieval calls, which run without holding any lock on the store), then
//! commit the whole outcome in a single conditional update. Any error
//! before the commit leaves the stored session byte-identical; the
//! per-session turn lock in the gateway keeps concurrent requests for the
//! same session serialized.

use std::collections::HashMap;
use std::sync::Arc;

use loom_domain::clock::Clock;
use loom_domain::config::Config;
use loom_domain::error::{Error, Result};
use loom_domain::session::{
    Candidate, DepthClass, FinalStory, Session, SessionStatus, Stage, TurnRole,
};
use loom_domain::style::StoryStyle;
use loom_llm::{CompletionClient, CompletionRequest};
use loom_prompts::{PromptKey, PromptLibrary};
use loom_sessions::SessionStore;
use loom_vector::{Chunk, ContextRetriever};

use crate::assembly::{build_final_story, format_context};
use crate::candidates::{parse_candidates, CandidateKind};
use crate::depth::parse_depth;
use crate::response::{OptionKind, OptionsPayload, SelectReply, StartReply, TurnReply};

// Token budgets for the intermediate steps; final assembly takes its
// budget from the style table.
const DEPTH_MAX_TOKENS: u32 = 256;
const QUESTION_MAX_TOKENS: u32 = 256;
const HOOK_MAX_TOKENS: u32 = 1024;
const ARC_MAX_TOKENS: u32 = 1024;
const QUOTE_MAX_TOKENS: u32 = 256;
const CTA_MAX_TOKENS: u32 = 1024;
const RECOVERY_MAX_TOKENS: u32 = 128;

/// System-turn note recorded when retrieval degrades to empty context.
const NO_CONTEXT_NOTE: &str = "no local context retrieved";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationEngine {
    store: Arc<SessionStore>,
    llm: Arc<dyn CompletionClient>,
    retriever: Arc<dyn ContextRetriever>,
    prompts: Arc<PromptLibrary>,
    clock: Arc<dyn Clock>,
    hook_retries: u32,
    cta_retries: u32,
    min_core_idea_chars: usize,
    depth_threshold: f32,
    temperature: f32,
    top_k: usize,
}

/// Everything computed for one advance, applied in a single commit.
struct TurnOutcome {
    user_text: Option<String>,
    degraded_retrieval: bool,
    llm_calls: u64,
    chunks_used: u64,
    apply: Box<dyn FnOnce(&mut Session) + Send>,
    reply: TurnReply,
}

impl ConversationEngine {
    pub fn new(
        config: &Config,
        store: Arc<SessionStore>,
        llm: Arc<dyn CompletionClient>,
        retriever: Arc<dyn ContextRetriever>,
        prompts: Arc<PromptLibrary>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            llm,
            retriever,
            prompts,
            clock,
            hook_retries: config.engine.hook_retries,
            cta_retries: config.engine.cta_retries,
            min_core_idea_chars: config.engine.min_core_idea_chars,
            depth_threshold: config.engine.depth_threshold,
            temperature: config.llm.temperature,
            top_k: config.vector.top_k,
        }
    }

    // ── public contract ──────────────────────────────────────────────

    /// Create a session from a seed idea and pose the opening question.
    pub async fn start(&self, core_idea: &str, user_id: Option<String>) -> Result<StartReply> {
        let trimmed = core_idea.trim();
        if trimmed.chars().count() < self.min_core_idea_chars {
            return Err(Error::InvalidInput(format!(
                "core_idea must be at least {} characters",
                self.min_core_idea_chars
            )));
        }

        // Ask the opening question before anything is stored, so an LLM
        // failure leaves no half-born session behind.
        let question = self
            .complete(PromptKey::FollowUpQuestion, QUESTION_MAX_TOKENS, &[(
                "core_idea",
                trimmed.to_owned(),
            )])
            .await?;

        let session = self.store.create(trimmed, user_id)?;
        let now = self.clock.now();
        let updated = self.store.update(&session.id, session.version, |s| {
            s.metadata.llm_calls += 1;
            s.stage = Stage::DepthAnalysis;
            s.push_turn(TurnRole::Assistant, question.clone(), now);
            Ok(())
        })?;

        tracing::info!(session_id = %updated.id, "conversation started");
        Ok(StartReply {
            session_id: updated.id,
            stage: updated.stage,
            next_question: question,
        })
    }

    /// Submit user text and advance the state machine one step.
    pub async fn advance(&self, session_id: &str, text: &str) -> Result<TurnReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }

        let session = self.store.get(session_id)?;
        let outcome = match session.stage {
            // An anecdote already on file (a re-imported session) goes
            // straight to hook generation; depth analysis otherwise.
            Stage::Kickoff | Stage::DepthAnalysis
                if session.elements.personal_anecdote.is_some() =>
            {
                self.turn_hooks(&session, text, None).await?
            }
            Stage::Kickoff | Stage::DepthAnalysis => self.turn_depth(&session, text).await?,
            Stage::FollowUp => self.turn_follow_up(&session, text).await?,
            Stage::PersonalAnecdote => {
                self.turn_hooks(&session, text, Some(text.to_owned())).await?
            }
            // A session observed mid-generation (e.g. re-imported) resumes
            // from the stored elements.
            Stage::HookGeneration => self.turn_hooks(&session, text, None).await?,
            Stage::ArcDevelopment => self.turn_arc(&session, text).await?,
            Stage::QuoteIntegration | Stage::CtaGeneration => {
                self.turn_quote_and_ctas(&session, text).await?
            }
            Stage::HookSelection => {
                return Err(Error::invalid_transition(
                    session.stage,
                    "a hook must be selected with select-option before continuing",
                ));
            }
            Stage::CtaSelection => {
                return Err(Error::invalid_transition(
                    session.stage,
                    "a call to action must be selected with select-option before continuing",
                ));
            }
            Stage::ReadyToGenerate => {
                return Err(Error::invalid_transition(
                    session.stage,
                    "the story is ready — call generate-final with a style",
                ));
            }
            Stage::StoryGenerated => {
                return Err(Error::invalid_transition(
                    session.stage,
                    "the story is already generated; start a new session",
                ));
            }
        };

        self.commit_turn(&session, outcome)
    }

    /// Record the user's choice of hook or call to action.
    pub async fn select_option(
        &self,
        session_id: &str,
        kind: OptionKind,
        index: usize,
    ) -> Result<SelectReply> {
        if index > 2 {
            return Err(Error::InvalidInput(format!(
                "option index must be 0, 1, or 2 (got {index})"
            )));
        }

        let session = self.store.get(session_id)?;
        let now = self.clock.now();

        let (expected_stage, next_stage) = match kind {
            OptionKind::Hook => (Stage::HookSelection, Stage::ArcDevelopment),
            OptionKind::Cta => (Stage::CtaSelection, Stage::ReadyToGenerate),
        };
        if session.stage != expected_stage {
            return Err(Error::invalid_transition(
                session.stage,
                format!("a {kind} cannot be selected at this point"),
            ));
        }

        let candidates = match kind {
            OptionKind::Hook => &session.elements.hook_candidates,
            OptionKind::Cta => &session.elements.cta_candidates,
        };
        let title = candidates
            .get(index)
            .map(|c| c.title.clone())
            .ok_or_else(|| {
                Error::invalid_transition(session.stage, format!("no {kind} candidates to select"))
            })?;

        let message = match kind {
            OptionKind::Hook => format!(
                "Locked in \"{title}\". Send anything and I'll draft the narrative arc."
            ),
            OptionKind::Cta => format!(
                "Closing on \"{title}\". Call generate-final with a style to finish the story."
            ),
        };

        let updated = self.store.update(&session.id, session.version, |s| {
            s.push_turn(TurnRole::User, format!("selected {kind} {index}"), now);
            match kind {
                OptionKind::Hook => s.elements.selected_hook_index = Some(index),
                OptionKind::Cta => s.elements.selected_cta_index = Some(index),
            }
            s.stage = next_stage;
            s.push_turn(TurnRole::Assistant, message.clone(), now);
            Ok(())
        })?;

        Ok(SelectReply {
            message,
            stage: updated.stage,
        })
    }

    /// Assemble and commit the final story.
    pub async fn generate_final(&self, session_id: &str, style: StoryStyle) -> Result<FinalStory> {
        let session = self.store.get(session_id)?;
        if session.stage != Stage::ReadyToGenerate {
            return Err(Error::invalid_transition(
                session.stage,
                "the story cannot be generated until a hook and a call to action are chosen",
            ));
        }

        let elements = &session.elements;
        let hook = selected_candidate(&elements.hook_candidates, elements.selected_hook_index)?;
        let cta = selected_candidate(&elements.cta_candidates, elements.selected_cta_index)?;
        let arc = elements.narrative_arc.clone().ok_or_else(|| {
            Error::invalid_transition(session.stage, "narrative arc is missing")
        })?;
        let quote = elements.quote.clone().ok_or_else(|| {
            Error::invalid_transition(session.stage, "quote is missing")
        })?;

        // Re-query with the union of anecdote and arc.
        let query = match &elements.personal_anecdote {
            Some(anecdote) => format!("{anecdote}\n\n{arc}"),
            None => arc.clone(),
        };
        let (chunks, degraded) = self.fetch_context(&query).await;

        let text = self
            .complete(PromptKey::FinalAssembly, style.max_tokens(), &[
                ("hook", format!("{} - {}", hook.title, hook.body)),
                ("narrative_arc", arc),
                ("quote", quote),
                ("cta", format!("{} - {}", cta.title, cta.body)),
                ("context", format_context(&chunks)),
                ("style_name", style.name().to_owned()),
            ])
            .await?;

        let story = build_final_story(elements, style, text, chunks.len());
        let now = self.clock.now();
        let chunk_count = chunks.len() as u64;

        let story_for_commit = story.clone();
        let updated = self.store.update(&session.id, session.version, |s| {
            s.push_turn(TurnRole::User, format!("finalize({})", style.id()), now);
            if degraded {
                s.push_turn(TurnRole::System, NO_CONTEXT_NOTE, now);
            }
            s.metadata.llm_calls += 1;
            s.metadata.context_chunks_used += chunk_count;
            s.stage = Stage::StoryGenerated;
            s.status = SessionStatus::Completed;
            s.elements.final_story = Some(story_for_commit.clone());
            s.push_turn(TurnRole::Assistant, story_for_commit.text.clone(), now);
            Ok(())
        })?;

        tracing::info!(
            session_id = %updated.id,
            word_count = story.word_count,
            style = %style,
            "story generated"
        );
        Ok(story)
    }

    /// Raw session view; works for terminal sessions too.
    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        Ok(self.store.export(session_id)?.session)
    }

    // ── per-stage turns ──────────────────────────────────────────────

    /// Depth analysis: score the (possibly elaborated) seed and route.
    async fn turn_depth(&self, session: &Session, text: &str) -> Result<TurnOutcome> {
        let seed = format!("{}\n\n{}", session.elements.core_idea, text);

        let raw = self
            .complete(PromptKey::DepthAnalysis, DEPTH_MAX_TOKENS, &[(
                "core_idea",
                seed.clone(),
            )])
            .await?;
        let depth = parse_depth(&raw, self.depth_threshold);
        tracing::debug!(
            session_id = %session.id,
            score = depth.score,
            classification = ?depth.classification,
            "depth analyzed"
        );

        let (next_stage, question_key) = match depth.classification {
            DepthClass::Insufficient => (Stage::FollowUp, PromptKey::FollowUpQuestion),
            DepthClass::Sufficient => (Stage::PersonalAnecdote, PromptKey::PersonalAnecdote),
        };
        let question = self
            .complete(question_key, QUESTION_MAX_TOKENS, &[("core_idea", seed)])
            .await?;

        let text_owned = text.to_owned();
        let question_clone = question.clone();
        let now = self.clock.now();
        Ok(TurnOutcome {
            user_text: Some(text_owned.clone()),
            degraded_retrieval: false,
            llm_calls: 2,
            chunks_used: 0,
            apply: Box::new(move |s| {
                s.elements.depth = Some(depth);
                s.elements.follow_up_answers.push(text_owned);
                s.stage = next_stage;
                let mut attachments = serde_json::Map::new();
                attachments.insert("depth_score".into(), serde_json::json!(depth.score));
                s.push_turn_with(TurnRole::Assistant, question_clone, now, attachments);
            }),
            reply: TurnReply::plain(question, next_stage),
        })
    }

    /// Follow-up: record the answer, invite the anecdote.
    async fn turn_follow_up(&self, session: &Session, text: &str) -> Result<TurnOutcome> {
        let mut enriched = session.elements.clone();
        enriched.follow_up_answers.push(text.to_owned());

        let question = self
            .complete(PromptKey::PersonalAnecdote, QUESTION_MAX_TOKENS, &[(
                "core_idea",
                enriched.enriched_core(),
            )])
            .await?;

        let text_owned = text.to_owned();
        let question_clone = question.clone();
        let now = self.clock.now();
        Ok(TurnOutcome {
            user_text: Some(text_owned.clone()),
            degraded_retrieval: false,
            llm_calls: 1,
            chunks_used: 0,
            apply: Box::new(move |s| {
                s.elements.follow_up_answers.push(text_owned);
                s.stage = Stage::PersonalAnecdote;
                s.push_turn(TurnRole::Assistant, question_clone, now);
            }),
            reply: TurnReply::plain(question, Stage::PersonalAnecdote),
        })
    }

    /// Hook generation: record the anecdote (when given), retrieve local
    /// context, and extract exactly three hooks.
    async fn turn_hooks(
        &self,
        session: &Session,
        text: &str,
        anecdote: Option<String>,
    ) -> Result<TurnOutcome> {
        let mut enriched = session.elements.clone();
        if let Some(ref a) = anecdote {
            enriched.personal_anecdote = Some(a.clone());
        }
        let query = enriched.enriched_core();

        let (chunks, degraded) = self.fetch_context(&query).await;
        let (hooks, attempts) = self
            .generate_candidates(
                CandidateKind::Hook,
                PromptKey::HookGeneration,
                HOOK_MAX_TOKENS,
                self.hook_retries,
                &[
                    ("enriched_core", query),
                    ("context", format_context(&chunks)),
                ],
            )
            .await?;

        let message = options_message("ways into your story", &hooks);
        let options = OptionsPayload {
            kind: OptionKind::Hook,
            options: hooks.clone(),
        };

        let now = self.clock.now();
        let message_clone = message.clone();
        let hooks_clone = hooks.clone();
        Ok(TurnOutcome {
            user_text: Some(text.to_owned()),
            degraded_retrieval: degraded,
            llm_calls: attempts as u64,
            chunks_used: chunks.len() as u64,
            apply: Box::new(move |s| {
                if let Some(a) = anecdote {
                    s.elements.personal_anecdote = Some(a);
                }
                s.stage = Stage::HookSelection;
                s.elements.hook_candidates = hooks_clone.clone();
                let mut attachments = serde_json::Map::new();
                attachments.insert(
                    "hook_candidates".into(),
                    serde_json::to_value(&hooks_clone).unwrap_or_default(),
                );
                s.push_turn_with(TurnRole::Assistant, message_clone, now, attachments);
            }),
            reply: TurnReply {
                message,
                stage: Stage::HookSelection,
                options: Some(options),
                final_story: None,
            },
        })
    }

    /// Arc development: one completion conditioned on the chosen hook,
    /// with fresh local context.
    async fn turn_arc(&self, session: &Session, text: &str) -> Result<TurnOutcome> {
        let elements = &session.elements;
        let hook = selected_candidate(&elements.hook_candidates, elements.selected_hook_index)?;
        let query = elements.enriched_core();

        let (chunks, degraded) = self.fetch_context(&query).await;
        let arc = self
            .complete(PromptKey::ArcDevelopment, ARC_MAX_TOKENS, &[
                ("enriched_core", query),
                ("hook", format!("{} - {}", hook.title, hook.body)),
                ("context", format_context(&chunks)),
            ])
            .await?;

        let now = self.clock.now();
        let arc_clone = arc.clone();
        Ok(TurnOutcome {
            user_text: Some(text.to_owned()),
            degraded_retrieval: degraded,
            llm_calls: 1,
            chunks_used: chunks.len() as u64,
            apply: Box::new(move |s| {
                s.elements.narrative_arc = Some(arc_clone.clone());
                s.stage = Stage::QuoteIntegration;
                s.push_turn(TurnRole::Assistant, arc_clone, now);
            }),
            reply: TurnReply::plain(arc, Stage::QuoteIntegration),
        })
    }

    /// Quote integration, then CTA generation, in one turn: the quote is a
    /// single completion with fresh context; the CTAs reuse that context
    /// and carry the exactly-three contract.
    async fn turn_quote_and_ctas(&self, session: &Session, text: &str) -> Result<TurnOutcome> {
        let elements = &session.elements;
        let arc = elements.narrative_arc.clone().ok_or_else(|| {
            Error::invalid_transition(session.stage, "narrative arc is missing")
        })?;

        let (chunks, degraded) = self.fetch_context(&arc).await;
        let context = format_context(&chunks);

        // Resuming from cta_generation keeps the stored quote.
        let (quote, quote_calls) = match (&elements.quote, session.stage) {
            (Some(q), Stage::CtaGeneration) => (q.clone(), 0u64),
            _ => {
                let q = self
                    .complete(PromptKey::QuoteIntegration, QUOTE_MAX_TOKENS, &[
                        ("narrative_arc", arc.clone()),
                        ("context", context.clone()),
                    ])
                    .await?;
                (q, 1)
            }
        };

        let (ctas, attempts) = self
            .generate_candidates(
                CandidateKind::Cta,
                PromptKey::CtaGeneration,
                CTA_MAX_TOKENS,
                self.cta_retries,
                &[
                    ("enriched_core", elements.enriched_core()),
                    ("narrative_arc", arc),
                    ("context", context),
                ],
            )
            .await?;

        let message = format!(
            "{quote}\n\n{}",
            options_message("ways to close", &ctas)
        );
        let options = OptionsPayload {
            kind: OptionKind::Cta,
            options: ctas.clone(),
        };

        let now = self.clock.now();
        let quote_clone = quote.clone();
        let message_clone = message.clone();
        let ctas_clone = ctas.clone();
        Ok(TurnOutcome {
            user_text: Some(text.to_owned()),
            degraded_retrieval: degraded,
            llm_calls: quote_calls + attempts as u64,
            chunks_used: chunks.len() as u64,
            apply: Box::new(move |s| {
                s.elements.quote = Some(quote_clone);
                s.stage = Stage::CtaSelection;
                s.elements.cta_candidates = ctas_clone.clone();
                let mut attachments = serde_json::Map::new();
                attachments.insert(
                    "cta_candidates".into(),
                    serde_json::to_value(&ctas_clone).unwrap_or_default(),
                );
                s.push_turn_with(TurnRole::Assistant, message_clone, now, attachments);
            }),
            reply: TurnReply {
                message,
                stage: Stage::CtaSelection,
                options: Some(options),
                final_story: None,
            },
        })
    }

    // ── shared machinery ─────────────────────────────────────────────

    /// Commit a computed turn: user turn, optional degradation note,
    /// counters, then the outcome's own mutations — one conditional write.
    fn commit_turn(&self, session: &Session, outcome: TurnOutcome) -> Result<TurnReply> {
        let now = self.clock.now();
        let TurnOutcome {
            user_text,
            degraded_retrieval,
            llm_calls,
            chunks_used,
            apply,
            reply,
        } = outcome;

        self.store.update(&session.id, session.version, move |s| {
            if let Some(text) = user_text {
                s.push_turn(TurnRole::User, text, now);
            }
            if degraded_retrieval {
                s.push_turn(TurnRole::System, NO_CONTEXT_NOTE, now);
            }
            s.metadata.llm_calls += llm_calls;
            s.metadata.context_chunks_used += chunks_used;
            apply(s);
            Ok(())
        })?;

        Ok(reply)
    }

    /// Retrieval with graceful degradation: a provider failure yields an
    /// empty context and a note, never a failed turn.
    async fn fetch_context(&self, query: &str) -> (Vec<Chunk>, bool) {
        match self.retriever.retrieve(query, self.top_k).await {
            Ok(chunks) => (chunks, false),
            Err(e) => {
                tracing::warn!(error = %e, "context retrieval failed; continuing without");
                (Vec::new(), true)
            }
        }
    }

    /// Reissue a generation prompt until exactly three candidates parse,
    /// up to `retries` extra attempts. Returns the candidates and how many
    /// completions were spent.
    async fn generate_candidates(
        &self,
        kind: CandidateKind,
        key: PromptKey,
        max_tokens: u32,
        retries: u32,
        vars: &[(&str, String)],
    ) -> Result<(Vec<Candidate>, u32)> {
        let attempts = retries + 1;
        let mut best = 0usize;
        for attempt in 1..=attempts {
            let raw = self.complete(key, max_tokens, vars).await?;
            let candidates = parse_candidates(kind, &raw);
            if candidates.len() == 3 {
                return Ok((candidates, attempt));
            }
            best = best.max(candidates.len());
            tracing::warn!(
                kind = kind.label(),
                parsed = candidates.len(),
                attempt,
                "candidate generation fell short"
            );
        }

        let stage = match kind {
            CandidateKind::Hook => Stage::HookGeneration,
            CandidateKind::Cta => Stage::CtaGeneration,
        };
        let recovery = self.recovery_message(stage).await;
        Err(Error::GenerationIncomplete(format!(
            "{} generation produced {best} of 3 candidates after {attempts} attempts. {recovery}",
            kind.label().to_lowercase()
        )))
    }

    /// A warm, user-facing line for a failed generation step, written by
    /// the model from the error-recovery template. A fixed line covers
    /// the case where that completion fails too.
    async fn recovery_message(&self, stage: Stage) -> String {
        match self
            .complete(PromptKey::ErrorRecovery, RECOVERY_MAX_TOKENS, &[(
                "stage",
                stage.as_str().to_owned(),
            )])
            .await
        {
            Ok(text) if !text.is_empty() => text,
            _ => "Your work so far is safe. Send another message to try that step again.".into(),
        }
    }

    async fn complete(
        &self,
        key: PromptKey,
        max_tokens: u32,
        vars: &[(&str, String)],
    ) -> Result<String> {
        let vars: HashMap<&str, String> = vars.iter().cloned().collect();
        let prompt = self.prompts.render(key, &vars)?;
        let text = self
            .llm
            .complete(CompletionRequest {
                prompt,
                max_tokens,
                temperature: self.temperature,
            })
            .await?;
        Ok(text.trim().to_owned())
    }
}

// ── helpers ─────────────────────────────────────────────────────────

fn selected_candidate(candidates: &[Candidate], index: Option<usize>) -> Result<Candidate> {
    index
        .and_then(|i| candidates.get(i))
        .cloned()
        .ok_or_else(|| Error::Unavailable("selection missing from accumulated elements".into()))
}

fn options_message(lead: &str, candidates: &[Candidate]) -> String {
    let mut out = format!("Here are three {lead}:");
    for (i, c) in candidates.iter().enumerate() {
        out.push_str(&format!("\n{}. {} — {}", i + 1, c.title, c.body));
    }
    out.push_str("\nPick one with select-option.");
    out
}
