//! Session store.
//!
//! Owns the storage medium for all sessions: an in-memory map persisted to
//! `sessions.json` under the configured state path, loaded on boot and
//! flushed periodically. All mutation goes through [`SessionStore::update`],
//! which applies a mutator atomically, checks the structural invariants,
//! and commits with a compare-and-swap on the session's version counter.
//!
//! The map lock is held only for in-memory reads and commits; nothing that
//! blocks (LLM calls, retrieval) ever runs under it. Whole-turn
//! serialization per session is the job of [`crate::lock::SessionLockMap`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use loom_domain::clock::{session_id, Clock};
use loom_domain::config::SessionConfig;
use loom_domain::error::{Error, Result};
use loom_domain::session::{
    Session, SessionSnapshot, SessionStatus, SessionSummary, TurnRole,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    schema_version: u32,
    sessions: HashMap<String, Session>,
}

const SCHEMA_VERSION: u32 = 1;

/// Counters reported by one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Active sessions whose TTL had passed, now marked expired.
    pub expired: usize,
    /// Terminal sessions past the retention window, now dropped.
    pub purged: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retention: Duration,
    min_core_idea_chars: usize,
    /// `None` = memory-only store (tests).
    sessions_path: Option<PathBuf>,
    sessions: RwLock<HashMap<String, Session>>,
    dirty: AtomicBool,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions.json`.
    pub fn open(
        cfg: &SessionConfig,
        min_core_idea_chars: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&cfg.state_path)?;
        let sessions_path = cfg.state_path.join("sessions.json");

        let sessions = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path)?;
            match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) if state.schema_version == SCHEMA_VERSION => state.sessions,
                Ok(state) => {
                    return Err(Error::Config(format!(
                        "sessions.json schema_version {} is not supported (expected {})",
                        state.schema_version, SCHEMA_VERSION
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sessions.json unreadable; starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            clock,
            ttl: Duration::seconds(cfg.ttl_secs as i64),
            retention: Duration::seconds(cfg.retention_secs as i64),
            min_core_idea_chars,
            sessions_path: Some(sessions_path),
            sessions: RwLock::new(sessions),
            dirty: AtomicBool::new(false),
        })
    }

    /// Memory-only store for tests.
    pub fn in_memory(
        ttl: Duration,
        retention: Duration,
        min_core_idea_chars: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clock,
            ttl,
            retention,
            min_core_idea_chars,
            sessions_path: None,
            sessions: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    // ── lifecycle operations ─────────────────────────────────────────

    /// Create a new session from a seed idea.
    pub fn create(&self, core_idea: &str, user_id: Option<String>) -> Result<Session> {
        let trimmed = core_idea.trim();
        if trimmed.chars().count() < self.min_core_idea_chars {
            return Err(Error::InvalidInput(format!(
                "core_idea must be at least {} characters",
                self.min_core_idea_chars
            )));
        }

        let now = self.clock.now();
        let mut session = Session::new(
            session_id(),
            trimmed.to_owned(),
            user_id.filter(|u| !u.is_empty()),
            now,
            self.ttl,
        );
        session.push_turn(TurnRole::System, "session created", now);
        session.check_invariants()?;

        let mut sessions = self.sessions.write();
        sessions.insert(session.id.clone(), session.clone());
        self.dirty.store(true, Ordering::Relaxed);

        tracing::info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Fetch a session by id.
    ///
    /// A session whose TTL has passed is marked expired as a side effect
    /// and reported as such.
    pub fn get(&self, id: &str) -> Result<Session> {
        let now = self.clock.now();

        {
            let sessions = self.sessions.read();
            match sessions.get(id) {
                None => return Err(Error::NotFound(id.to_owned())),
                Some(s) => match s.status {
                    SessionStatus::Expired => return Err(Error::Expired(id.to_owned())),
                    SessionStatus::Active if s.ttl_deadline <= now => {
                        // fall through to mark under the write lock
                    }
                    _ => return Ok(s.clone()),
                },
            }
        }

        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        // Re-check under the write lock: a concurrent turn may have
        // refreshed the deadline in the meantime.
        if session.status == SessionStatus::Active && session.ttl_deadline <= now {
            session.status = SessionStatus::Expired;
            self.dirty.store(true, Ordering::Relaxed);
            tracing::info!(session_id = %id, "session expired on access");
        }
        match session.status {
            SessionStatus::Expired => Err(Error::Expired(id.to_owned())),
            _ => Ok(session.clone()),
        }
    }

    /// Atomically apply `mutator` to the session.
    ///
    /// `expected_version` is the version of the snapshot the caller
    /// computed from; a mismatch means a concurrent commit won, and the
    /// caller's request is rejected against the newer state.
    ///
    /// On success the TTL deadline is refreshed, `updated_at` advances,
    /// the version is bumped, and the invariants are re-checked. On any
    /// failure the stored session is untouched.
    pub fn update(
        &self,
        id: &str,
        expected_version: u64,
        mutator: impl FnOnce(&mut Session) -> Result<()>,
    ) -> Result<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let stored = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;

        if stored.status == SessionStatus::Active && stored.ttl_deadline <= now {
            stored.status = SessionStatus::Expired;
            self.dirty.store(true, Ordering::Relaxed);
            return Err(Error::Expired(id.to_owned()));
        }
        if stored.is_read_only() {
            return match stored.status {
                SessionStatus::Expired => Err(Error::Expired(id.to_owned())),
                _ => Err(Error::invalid_transition(
                    stored.stage,
                    format!("session is {:?} and read-only", stored.status),
                )),
            };
        }
        if stored.version != expected_version {
            return Err(Error::invalid_transition(
                stored.stage,
                "session changed under a concurrent request".to_string(),
            ));
        }

        // Work on a copy so a failed mutation commits nothing.
        let mut working = stored.clone();
        mutator(&mut working)?;

        if working.elements.core_idea != stored.elements.core_idea {
            return Err(Error::invalid_transition(
                stored.stage,
                "core_idea is immutable after creation".to_string(),
            ));
        }
        if working.history.len() < stored.history.len()
            || working.history[..stored.history.len()] != stored.history[..]
        {
            return Err(Error::invalid_transition(
                stored.stage,
                "history is append-only".to_string(),
            ));
        }

        working.updated_at = now;
        if working.status == SessionStatus::Active {
            working.ttl_deadline = now + self.ttl;
        }
        working.version = stored.version + 1;
        working.check_invariants()?;

        *stored = working.clone();
        self.dirty.store(true, Ordering::Relaxed);
        Ok(working)
    }

    // ── observability & export ───────────────────────────────────────

    /// Summaries of all sessions currently active (TTL not yet passed).
    pub fn list_active(&self) -> Vec<SessionSummary> {
        let now = self.clock.now();
        let sessions = self.sessions.read();
        let mut out: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active && s.ttl_deadline > now)
            .map(Session::summary)
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// Deep, immutable copy for offline inspection. Works for terminal
    /// sessions too — they stay exportable until retention elapses.
    pub fn export(&self, id: &str) -> Result<SessionSnapshot> {
        let sessions = self.sessions.read();
        let session = sessions
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        Ok(SessionSnapshot {
            schema_version: SessionSnapshot::SCHEMA_VERSION,
            exported_at: self.clock.now(),
            session: session.clone(),
        })
    }

    /// Re-import an exported snapshot (testing / offline tooling).
    pub fn import(&self, snapshot: SessionSnapshot) -> Result<Session> {
        if snapshot.schema_version != SessionSnapshot::SCHEMA_VERSION {
            return Err(Error::InvalidInput(format!(
                "snapshot schema_version {} is not supported",
                snapshot.schema_version
            )));
        }
        snapshot.session.check_invariants()?;

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&snapshot.session.id) {
            return Err(Error::InvalidInput(format!(
                "session {} already exists",
                snapshot.session.id
            )));
        }
        let session = snapshot.session;
        sessions.insert(session.id.clone(), session.clone());
        self.dirty.store(true, Ordering::Relaxed);
        Ok(session)
    }

    // ── maintenance ──────────────────────────────────────────────────

    /// One sweep pass: expire overdue active sessions, purge terminal
    /// sessions past the retention window.
    pub fn sweep(&self) -> SweepStats {
        let now = self.clock.now();
        let mut stats = SweepStats::default();
        let mut sessions = self.sessions.write();

        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active && session.ttl_deadline <= now {
                session.status = SessionStatus::Expired;
                stats.expired += 1;
            }
        }
        sessions.retain(|_, s| {
            let purge = s.status.is_terminal() && s.updated_at + self.retention <= now;
            if purge {
                stats.purged += 1;
            }
            !purge
        });

        if stats != SweepStats::default() {
            self.dirty.store(true, Ordering::Relaxed);
            tracing::info!(expired = stats.expired, purged = stats.purged, "session sweep");
        }
        stats
    }

    /// Persist to disk when something changed since the last flush.
    pub fn flush_if_dirty(&self) -> Result<()> {
        if self.dirty.swap(false, Ordering::Relaxed) {
            if let Err(e) = self.flush() {
                self.dirty.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Persist the current state to disk.
    pub fn flush(&self) -> Result<()> {
        let Some(ref path) = self.sessions_path else {
            return Ok(());
        };
        let json = {
            let sessions = self.sessions.read();
            serde_json::to_string_pretty(&PersistedState {
                schema_version: SCHEMA_VERSION,
                sessions: sessions.clone(),
            })?
        };
        write_atomically(path, &json)
    }

    /// Number of stored sessions, any status.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Write via a sibling temp file + rename so a crash mid-write never
/// truncates the store.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use loom_domain::clock::ManualClock;
    use loom_domain::session::Stage;

    const IDEA: &str = "A brewery in Scott's Addition that hosts coding meetups";

    fn store_with_clock() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = SessionStore::in_memory(
            Duration::hours(24),
            Duration::days(7),
            10,
            clock.clone(),
        );
        (store, clock)
    }

    #[test]
    fn create_rejects_short_ideas() {
        let (store, _) = store_with_clock();
        // One character below the minimum.
        let err = store.create("123456789", None).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(store.is_empty());
    }

    #[test]
    fn create_seeds_kickoff_with_a_system_turn() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, Some("caller-7".into())).unwrap();
        assert_eq!(session.stage, Stage::Kickoff);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.metadata.user_id.as_deref(), Some("caller-7"));
        assert_eq!(store.get(&session.id).unwrap().id, session.id);
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let (store, _) = store_with_clock();
        assert_eq!(store.get("nope").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn get_past_ttl_expires_as_side_effect() {
        let (store, clock) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();

        clock.advance(Duration::hours(25));
        assert_eq!(store.get(&session.id).unwrap_err().kind(), "expired");

        // The mark stuck: status is now expired, reported consistently.
        assert_eq!(store.get(&session.id).unwrap_err().kind(), "expired");
        assert!(store.list_active().is_empty());
    }

    #[test]
    fn update_refreshes_ttl_and_bumps_version() {
        let (store, clock) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();

        clock.advance(Duration::hours(23));
        let updated = store
            .update(&session.id, session.version, |s| {
                s.stage = Stage::DepthAnalysis;
                s.push_turn(TurnRole::Assistant, "tell me more", s.created_at);
                Ok(())
            })
            .unwrap();

        assert_eq!(updated.version, session.version + 1);
        assert!(updated.updated_at > session.updated_at);
        assert_eq!(updated.ttl_deadline, clock.now() + Duration::hours(24));

        // The refresh keeps the session alive past its original deadline.
        clock.advance(Duration::hours(2));
        assert!(store.get(&session.id).is_ok());
    }

    #[test]
    fn update_with_stale_version_is_rejected() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();

        store
            .update(&session.id, session.version, |s| {
                s.stage = Stage::DepthAnalysis;
                Ok(())
            })
            .unwrap();

        // Same snapshot again: the concurrent loser.
        let err = store
            .update(&session.id, session.version, |s| {
                s.stage = Stage::FollowUp;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(store.get(&session.id).unwrap().stage, Stage::DepthAnalysis);
    }

    #[test]
    fn failed_mutator_commits_nothing() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();
        let before = store.get(&session.id).unwrap();

        let err = store
            .update(&session.id, session.version, |s| {
                s.stage = Stage::StoryGenerated; // would be visible if committed
                Err(Error::Unavailable("downstream died".into()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");

        let after = store.get(&session.id).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn invariant_violation_rolls_back() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();
        let before = store.get(&session.id).unwrap();

        let err = store
            .update(&session.id, session.version, |s| {
                s.elements.selected_hook_index = Some(1); // no candidates yet
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(store.get(&session.id).unwrap(), before);
    }

    #[test]
    fn core_idea_is_immutable() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();

        let err = store
            .update(&session.id, session.version, |s| {
                s.elements.core_idea = "something else entirely".into();
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn history_rewrites_are_rejected() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();

        let err = store
            .update(&session.id, session.version, |s| {
                s.history.clear();
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn terminal_sessions_are_read_only() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();
        store
            .update(&session.id, session.version, |s| {
                s.status = SessionStatus::Abandoned;
                Ok(())
            })
            .unwrap();

        let err = store
            .update(&session.id, session.version + 1, |s| {
                s.stage = Stage::DepthAnalysis;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn sweep_expires_and_purges() {
        let (store, clock) = store_with_clock();
        let overdue = store.create(IDEA, None).unwrap();

        // Just past the deadline: one sweep marks it expired.
        clock.advance(Duration::hours(24) + Duration::seconds(1));
        let stats = store.sweep();
        assert_eq!(stats, SweepStats { expired: 1, purged: 0 });

        // Still exportable until retention elapses.
        assert!(store.export(&overdue.id).is_ok());

        clock.advance(Duration::days(7));
        let stats = store.sweep();
        assert_eq!(stats, SweepStats { expired: 0, purged: 1 });
        assert_eq!(store.export(&overdue.id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn export_then_import_round_trips() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();
        store
            .update(&session.id, session.version, |s| {
                s.stage = Stage::DepthAnalysis;
                s.push_turn(TurnRole::Assistant, "tell me more", s.created_at);
                Ok(())
            })
            .unwrap();

        let snapshot = store.export(&session.id).unwrap();

        let (other, _) = store_with_clock();
        let imported = other.import(snapshot.clone()).unwrap();
        assert_eq!(imported, snapshot.session);
        assert_eq!(other.get(&session.id).unwrap(), snapshot.session);
    }

    #[test]
    fn import_rejects_duplicates() {
        let (store, _) = store_with_clock();
        let session = store.create(IDEA, None).unwrap();
        let snapshot = store.export(&session.id).unwrap();
        assert_eq!(store.import(snapshot).unwrap_err().kind(), "invalid_input");
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SessionConfig {
            state_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));

        let store = SessionStore::open(&cfg, 10, clock.clone()).unwrap();
        let session = store.create(IDEA, None).unwrap();
        store.flush_if_dirty().unwrap();

        let reopened = SessionStore::open(&cfg, 10, clock).unwrap();
        assert_eq!(reopened.get(&session.id).unwrap(), session);
    }
}
