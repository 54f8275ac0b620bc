use std::sync::Arc;

use loom_domain::config::Config;
use loom_engine::ConversationEngine;
use loom_sessions::{SessionLockMap, SessionStore};

/// Shared application state passed to all API handlers.
///
/// - **Core services** — config, the conversation engine
/// - **Session management** — store, per-session turn locks
/// - **Security (startup-computed)** — API token hash
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<ConversationEngine>,
    pub store: Arc<SessionStore>,
    pub session_locks: Arc<SessionLockMap>,
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Arc<Vec<u8>>>,
}
