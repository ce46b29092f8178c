//! Rewrite sessions: transaction-scoped bundles of rewriters.
//!
//! A session is checked out from the [`RewritingManager`], accumulates
//! edits through per-module [`Rewriter`]s, and is resolved exactly once:
//! either its own [`try_commit`](RewriteSession::try_commit) wins
//! arbitration and every rewriter is rendered into the commit sink, or a
//! competing commit (or bulk invalidation) supersedes it and its edits
//! are discarded. Callers never set the status directly.
//!
//! [`RewritingManager`]: crate::RewritingManager

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use thiserror::Error;

use crate::diff::ModuleDiff;
use crate::host::{ModuleId, SinkError, SourceError, TokenSource};
use crate::manager::ManagerCore;
use crate::rewriter::{ProgramName, RewriteError, Rewriter};

/// Unique identity of one checked-out session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The logical view of the source a session edits.
///
/// Sessions of different kinds are tracked in separate active sets but
/// arbitrate against each other: a winning commit of either kind
/// supersedes every outstanding session of both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionKind {
    Primary,
    Secondary,
}

/// One-shot session status.
///
/// `Valid` is the only state that accepts edits or commits; `Applied` and
/// `Superseded` are terminal and no later event changes them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Valid,
    Applied,
    Superseded,
}

/// What a commit attempt did.
///
/// `NotApplied` is ordinary steady-state behavior (the session lost the
/// race or was already resolved), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[must_use = "a commit that was not applied means the caller should recompute against fresh state"]
pub enum CommitOutcome {
    Applied,
    NotApplied,
}

impl CommitOutcome {
    /// Whether the commit took effect.
    pub fn applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is no longer editable (status {status:?})")]
    NotEditable { status: SessionStatus },

    #[error("token source error: {0}")]
    Source(#[from] SourceError),

    #[error("rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("commit sink error: {0}")]
    Sink(#[from] SinkError),
}

/// A transaction-scoped bundle of rewriters with a one-shot status.
pub struct RewriteSession {
    id: SessionId,
    kind: SessionKind,
    manager: Weak<ManagerCore>,
    source: Arc<dyn TokenSource>,
    state: Mutex<SessionState>,
}

struct SessionState {
    status: SessionStatus,
    // insertion order is the order rewriters reach the sink on commit
    rewriters: Vec<((ModuleId, ProgramName), Rewriter)>,
}

impl RewriteSession {
    pub(crate) fn new(
        id: SessionId,
        kind: SessionKind,
        manager: Weak<ManagerCore>,
        source: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            id,
            kind,
            manager,
            source,
            state: Mutex::new(SessionState {
                status: SessionStatus::Valid,
                rewriters: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    /// The session's rewriter for `module`'s default program, created on
    /// first use.
    pub fn rewriter_for(&self, module: impl Into<ModuleId>) -> Result<Rewriter, SessionError> {
        self.rewriter_for_named(module, ProgramName::default())
    }

    /// The session's rewriter for `(module, program)`, created on first
    /// use. Repeated calls with the same key return handles to the same
    /// edit list.
    ///
    /// Fails with [`SessionError::NotEditable`] once the session is
    /// resolved, so stale references are never populated with edits that
    /// can no longer be applied.
    pub fn rewriter_for_named(
        &self,
        module: impl Into<ModuleId>,
        program: ProgramName,
    ) -> Result<Rewriter, SessionError> {
        let module = module.into();
        let mut state = self.lock_state();

        if state.status != SessionStatus::Valid {
            return Err(SessionError::NotEditable {
                status: state.status,
            });
        }

        let key = (module, program);
        if let Some((_, rewriter)) = state.rewriters.iter().find(|(k, _)| *k == key) {
            return Ok(rewriter.clone());
        }

        let buffer = self.source.token_buffer(&key.0)?;
        tracing::trace!(
            session = %self.id,
            module = %key.0,
            program = %key.1,
            generation = buffer.generation(),
            "checked out rewriter"
        );
        let rewriter = Rewriter::new(buffer);
        state.rewriters.push((key, rewriter.clone()));
        Ok(rewriter)
    }

    /// Attempt to commit this session's edits.
    ///
    /// Delegates to the manager's arbitration: if this session is still
    /// active, it wins — every rewriter is rendered and handed to the
    /// commit sink, this session becomes `Applied`, and every other
    /// outstanding session of either kind becomes `Superseded`.
    ///
    /// Calling this on an already-resolved session is a safe no-op
    /// returning [`CommitOutcome::NotApplied`]; arbitration is never
    /// re-attempted. Structural failures (conflicting edits, a rejected
    /// sink write) surface as errors instead of an outcome.
    pub fn try_commit(&self) -> Result<CommitOutcome, SessionError> {
        if self.status() != SessionStatus::Valid {
            tracing::debug!(session = %self.id, "commit on resolved session; not applied");
            return Ok(CommitOutcome::NotApplied);
        }

        let Some(core) = self.manager.upgrade() else {
            tracing::debug!(session = %self.id, "commit after manager teardown; not applied");
            return Ok(CommitOutcome::NotApplied);
        };

        core.arbitrate(self)
    }

    /// Render every rewriter without committing and pair each result with
    /// the module's original text.
    ///
    /// Read-only: the session stays `Valid` and a later commit still
    /// applies the same edits.
    pub fn preview(&self) -> Result<Vec<ModuleDiff>, SessionError> {
        let state = self.lock_state();

        if state.status != SessionStatus::Valid {
            return Err(SessionError::NotEditable {
                status: state.status,
            });
        }

        let mut diffs = Vec::with_capacity(state.rewriters.len());
        for ((module, _), rewriter) in &state.rewriters {
            diffs.push(ModuleDiff {
                module: module.clone(),
                original: rewriter.original_text(),
                rewritten: rewriter.render()?,
            });
        }
        Ok(diffs)
    }

    /// Render every rewriter in checkout order. Pure; used by arbitration
    /// before any status changes so a conflict leaves the session intact.
    pub(crate) fn render_all(&self) -> Result<Vec<(ModuleId, String)>, SessionError> {
        let state = self.lock_state();
        let mut rendered = Vec::with_capacity(state.rewriters.len());
        for ((module, _), rewriter) in &state.rewriters {
            rendered.push((module.clone(), rewriter.render()?));
        }
        Ok(rendered)
    }

    /// Resolve the session to a terminal status. One-shot: a session that
    /// already left `Valid` is never touched again.
    pub(crate) fn resolve(&self, status: SessionStatus) {
        let mut state = self.lock_state();
        if state.status != SessionStatus::Valid {
            return;
        }
        state.status = status;
        if status == SessionStatus::Superseded {
            // discarded, never rendered
            state.rewriters.clear();
        }
        tracing::debug!(session = %self.id, kind = ?self.kind, ?status, "session resolved");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }
}

impl fmt::Debug for RewriteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RewriteSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &state.status)
            .field("rewriters", &state.rewriters.len())
            .finish()
    }
}
