//! Rewrite Arbiter: optimistic rewrite-session coordination and
//! token-stream text rewriting.
//!
//! Many independent callers (inspections, refactorings, quick fixes)
//! propose edits to shared source modules. This crate guarantees that at
//! most one coherent set of edits is ever committed per source
//! generation, while every other outstanding proposal is safely and
//! detectably invalidated.
//!
//! # Architecture
//!
//! All editing flows through one primitive: a [`Rewriter`] accumulating
//! token-index edits against an immutable [`TokenBuffer`]. Sessions
//! bundle rewriters into a transaction; the [`RewritingManager`] is the
//! single arbiter that decides which session's commit wins. Intelligence
//! lives in the callers that compute edits, not in the application logic.
//!
//! # Safety
//!
//! - Range edits are bounds-checked when recorded, overlap-checked when
//!   rendered
//! - At most one session per manager ever reaches `Applied`; a win
//!   supersedes every competitor of every kind atomically
//! - Session status is one-shot: no event changes a resolved session
//! - Losing a commit race is an ordinary outcome, not an error
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rewrite_arbiter::{InMemoryModules, ModuleId, RewritingManager, SessionKind, SessionStatus};
//!
//! let store = Arc::new(InMemoryModules::new());
//! store.install("app", 1, ["fn", " ", "main", "(", ")", " ", "{", "}"]);
//!
//! let manager = RewritingManager::new(store.clone(), store.clone());
//!
//! let session = manager.check_out(SessionKind::Primary);
//! let rewriter = session.rewriter_for("app")?;
//! rewriter.replace(2, 2, "start")?;
//!
//! let competitor = manager.check_out(SessionKind::Secondary);
//!
//! assert!(session.try_commit()?.applied());
//! assert_eq!(store.text(&ModuleId::new("app")).unwrap(), "fn start() {}");
//! assert_eq!(competitor.status(), SessionStatus::Superseded);
//! # Ok::<(), rewrite_arbiter::SessionError>(())
//! ```

pub mod buffer;
pub mod diff;
pub mod host;
pub mod manager;
pub mod memory;
pub mod rewriter;
pub mod session;

// Re-exports
pub use buffer::{Token, TokenBuffer};
pub use diff::ModuleDiff;
pub use host::{CommitSink, Generation, ModuleId, SinkError, SourceError, TokenSource};
pub use manager::RewritingManager;
pub use memory::InMemoryModules;
pub use rewriter::{EditOp, ProgramName, RewriteError, Rewriter};
pub use session::{
    CommitOutcome, RewriteSession, SessionError, SessionId, SessionKind, SessionStatus,
};
