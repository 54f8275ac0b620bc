//! Production wiring: config → clients → engine → shared state.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use loom_domain::clock::SystemClock;
use loom_domain::config::Config;
use loom_engine::ConversationEngine;
use loom_llm::RestCompletionClient;
use loom_prompts::PromptLibrary;
use loom_sessions::{SessionLockMap, SessionStore};
use loom_vector::RestVectorClient;

use crate::state::AppState;

/// Read a required secret from the environment. Only its presence is ever
/// reported; the value stays out of logs and errors.
fn require_secret(env_var: &str) -> anyhow::Result<String> {
    match std::env::var(env_var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("required secret env var {env_var} is not set"),
    }
}

/// Build the full application state from validated configuration.
pub fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Prompt library ───────────────────────────────────────────────
    let prompts = match &config.prompts.template_file {
        Some(path) => Arc::new(
            PromptLibrary::with_overrides(path).context("loading prompt template overrides")?,
        ),
        None => Arc::new(PromptLibrary::builtin()),
    };
    tracing::info!("prompt library ready");

    // ── External clients ─────────────────────────────────────────────
    let llm_key = require_secret(&config.llm.api_key_env)?;
    let llm = Arc::new(
        RestCompletionClient::new(&config.llm, llm_key).context("building completion client")?,
    );
    tracing::info!(url = %config.llm.base_url, model = %config.llm.model, "completion client ready");

    let vector_key = require_secret(&config.vector.api_key_env)?;
    let retriever = Arc::new(
        RestVectorClient::new(&config.vector, vector_key).context("building vector client")?,
    );
    tracing::info!(url = %config.vector.base_url, top_k = config.vector.top_k, "vector client ready");

    // ── Session management ───────────────────────────────────────────
    let clock = Arc::new(SystemClock);
    let store = Arc::new(
        SessionStore::open(&config.session, config.engine.min_core_idea_chars, clock.clone())
            .context("opening session store")?,
    );
    let session_locks = Arc::new(SessionLockMap::new());
    tracing::info!(sessions = store.len(), "session management ready");

    // ── Engine ───────────────────────────────────────────────────────
    let engine = Arc::new(ConversationEngine::new(
        &config,
        store.clone(),
        llm,
        retriever,
        prompts,
        clock,
    ));

    // ── API token (read once, hash for constant-time comparison) ─────
    let api_token_hash = match std::env::var(&config.server.api_token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %config.server.api_token_env, "API bearer-token auth enabled");
            Some(Arc::new(Sha256::digest(token.as_bytes()).to_vec()))
        }
        _ => {
            tracing::warn!(
                env_var = %config.server.api_token_env,
                "API bearer-token auth DISABLED — set the env var to enable"
            );
            None
        }
    };

    Ok(AppState {
        config,
        engine,
        store,
        session_locks,
        api_token_hash,
    })
}

/// Spawn the periodic maintenance loops: TTL sweep, persistence flush,
/// idle-lock pruning.
pub fn spawn_maintenance(state: &AppState) {
    let sweep_interval = std::time::Duration::from_secs(state.config.session.sweep_interval_secs);
    let flush_interval = std::time::Duration::from_secs(state.config.session.flush_interval_secs);

    {
        let store = state.store.clone();
        let locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                store.sweep();
                locks.prune_idle();
            }
        });
    }

    {
        let store = state.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            loop {
                interval.tick().await;
                if let Err(e) = store.flush_if_dirty() {
                    tracing::warn!(error = %e, "session store flush failed");
                }
            }
        });
    }

    tracing::info!(
        sweep_secs = sweep_interval.as_secs(),
        flush_secs = flush_interval.as_secs(),
        "maintenance loops started"
    );
}
