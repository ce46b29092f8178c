//! Session checkout and single-winner commit arbitration.
//!
//! The manager is the one piece of shared mutable state in the crate: a
//! registry of active sessions, one set per [`SessionKind`], guarded by a
//! single lock. Commits are totally ordered by that lock — the first
//! `try_commit` to enter arbitration wins, and every competitor's later
//! membership check observes the winner's cleanup. Invalidating all
//! competitors on a win is a correctness requirement, not an
//! optimization: their edits were computed against a source state that no
//! longer exists.
//!
//! There is no ambient registry. The manager is an explicit value owned
//! by the editing context and handed to every collaborator that needs to
//! check out sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::host::{CommitSink, TokenSource};
use crate::session::{
    CommitOutcome, RewriteSession, SessionError, SessionId, SessionKind, SessionStatus,
};

/// Factory and arbitrator for rewrite sessions.
pub struct RewritingManager {
    core: Arc<ManagerCore>,
}

pub(crate) struct ManagerCore {
    source: Arc<dyn TokenSource>,
    sink: Arc<dyn CommitSink>,
    next_id: AtomicU64,
    active: Mutex<ActiveSessions>,
}

#[derive(Default)]
struct ActiveSessions {
    primary: HashMap<SessionId, Arc<RewriteSession>>,
    secondary: HashMap<SessionId, Arc<RewriteSession>>,
}

impl ActiveSessions {
    fn set_mut(&mut self, kind: SessionKind) -> &mut HashMap<SessionId, Arc<RewriteSession>> {
        match kind {
            SessionKind::Primary => &mut self.primary,
            SessionKind::Secondary => &mut self.secondary,
        }
    }

    fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    fn drain_all(&mut self) -> Vec<Arc<RewriteSession>> {
        self.primary
            .drain()
            .chain(self.secondary.drain())
            .map(|(_, session)| session)
            .collect()
    }
}

impl RewritingManager {
    /// Create a manager over the host's token source and commit sink.
    ///
    /// One manager per editing context; it holds no persisted state and
    /// is torn down with the context.
    pub fn new(source: Arc<dyn TokenSource>, sink: Arc<dyn CommitSink>) -> Self {
        Self {
            core: Arc::new(ManagerCore {
                source,
                sink,
                next_id: AtomicU64::new(0),
                active: Mutex::new(ActiveSessions::default()),
            }),
        }
    }

    /// Check out a fresh `Valid` session of the given kind and register
    /// it as active. Any number of sessions of any kind may be
    /// outstanding at once.
    pub fn check_out(&self, kind: SessionKind) -> Arc<RewriteSession> {
        let id = SessionId(self.core.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(RewriteSession::new(
            id,
            kind,
            Arc::downgrade(&self.core),
            Arc::clone(&self.core.source),
        ));

        let mut active = self.core.lock_active();
        active.set_mut(kind).insert(id, Arc::clone(&session));
        tracing::debug!(session = %id, kind = ?kind, active = active.len(), "checked out session");

        session
    }

    /// Supersede every active session of every kind without any of them
    /// winning.
    ///
    /// Models an external source-generation change that makes all
    /// outstanding proposals stale. Sessions checked out afterwards are
    /// unaffected.
    pub fn invalidate_all(&self) {
        let mut active = self.core.lock_active();
        let drained = active.drain_all();
        for session in &drained {
            session.resolve(SessionStatus::Superseded);
        }
        tracing::debug!(count = drained.len(), "invalidated all active sessions");
    }

    /// Number of currently active sessions across both kinds.
    pub fn active_session_count(&self) -> usize {
        self.core.lock_active().len()
    }
}

impl ManagerCore {
    /// Decide a session's commit. Invoked only from
    /// [`RewriteSession::try_commit`].
    ///
    /// The whole decision runs under the active-set lock, so no observer
    /// ever sees a partial view of "some sessions invalidated, others
    /// not", and two racing commits cannot both win.
    pub(crate) fn arbitrate(
        &self,
        session: &RewriteSession,
    ) -> Result<CommitOutcome, SessionError> {
        let mut active = self.lock_active();

        // Guards double-commits and late commits from sessions already
        // resolved by a competing commit or a bulk invalidation.
        if !active.set_mut(session.kind()).contains_key(&session.id()) {
            tracing::debug!(session = %session.id(), "commit from inactive session; not applied");
            return Ok(CommitOutcome::NotApplied);
        }

        // Render before touching any status: a conflicting edit aborts
        // here with the session still valid and still active.
        let rendered = session.render_all()?;

        for other in active.drain_all() {
            if other.id() != session.id() {
                other.resolve(SessionStatus::Superseded);
            }
        }
        session.resolve(SessionStatus::Applied);
        tracing::debug!(
            session = %session.id(),
            kind = ?session.kind(),
            modules = rendered.len(),
            "commit applied"
        );

        // The arbitration outcome stands even if a write fails: the sink
        // is atomic per module, and competitors are stale either way.
        for (module, text) in &rendered {
            self.sink.replace_module(module, text)?;
        }

        Ok(CommitOutcome::Applied)
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveSessions> {
        self.active.lock().expect("active session lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryModules;

    fn manager() -> (RewritingManager, Arc<InMemoryModules>) {
        let store = Arc::new(InMemoryModules::new());
        store.install("mod_a", 1, ["a", "1"]);
        store.install("mod_b", 1, ["b", "2"]);
        (RewritingManager::new(store.clone(), store.clone()), store)
    }

    #[test]
    fn checked_out_sessions_start_valid() {
        let (manager, _) = manager();
        assert_eq!(
            manager.check_out(SessionKind::Primary).status(),
            SessionStatus::Valid
        );
        assert_eq!(
            manager.check_out(SessionKind::Secondary).status(),
            SessionStatus::Valid
        );
        assert_eq!(manager.active_session_count(), 2);
    }

    #[test]
    fn session_ids_are_unique() {
        let (manager, _) = manager();
        let a = manager.check_out(SessionKind::Primary);
        let b = manager.check_out(SessionKind::Primary);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn invalidate_all_empties_both_sets() {
        let (manager, _) = manager();
        let sessions = [
            manager.check_out(SessionKind::Primary),
            manager.check_out(SessionKind::Secondary),
            manager.check_out(SessionKind::Primary),
            manager.check_out(SessionKind::Secondary),
        ];

        manager.invalidate_all();

        assert_eq!(manager.active_session_count(), 0);
        for session in &sessions {
            assert_eq!(session.status(), SessionStatus::Superseded);
        }
    }

    #[test]
    fn sessions_checked_out_after_invalidation_are_unaffected() {
        let (manager, _) = manager();
        let stale = manager.check_out(SessionKind::Primary);
        manager.invalidate_all();

        let fresh = manager.check_out(SessionKind::Primary);
        assert_eq!(stale.status(), SessionStatus::Superseded);
        assert_eq!(fresh.status(), SessionStatus::Valid);
        assert_eq!(manager.active_session_count(), 1);
    }

    #[test]
    fn winning_commit_removes_winner_from_active_set() {
        let (manager, _) = manager();
        let session = manager.check_out(SessionKind::Primary);
        assert!(session.try_commit().unwrap().applied());
        assert_eq!(manager.active_session_count(), 0);
    }

    #[test]
    fn commit_after_manager_teardown_is_not_applied() {
        let (manager, _) = manager();
        let session = manager.check_out(SessionKind::Primary);
        drop(manager);
        assert!(!session.try_commit().unwrap().applied());
    }
}
