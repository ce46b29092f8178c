//! End-to-end arbitration: single winner, bulk invalidation, late
//! commits, and the commit race under real threads.

use std::sync::{Arc, Barrier};
use std::thread;

use rewrite_arbiter::{
    CommitOutcome, InMemoryModules, ModuleId, RewritingManager, SessionError, SessionKind,
    SessionStatus,
};

fn fixture() -> (RewritingManager, Arc<InMemoryModules>) {
    let store = Arc::new(InMemoryModules::new());
    store.install("alpha", 1, ["a", " ", "b", " ", "c"]);
    store.install("beta", 1, ["x", " ", "y"]);
    (RewritingManager::new(store.clone(), store.clone()), store)
}

#[test]
fn winning_commit_supersedes_every_active_session_of_both_kinds() {
    let (manager, store) = fixture();

    let winner = manager.check_out(SessionKind::Primary);
    let others = [
        manager.check_out(SessionKind::Secondary),
        manager.check_out(SessionKind::Primary),
        manager.check_out(SessionKind::Secondary),
    ];

    winner
        .rewriter_for("alpha")
        .unwrap()
        .replace(0, 0, "A")
        .unwrap();

    assert!(winner.try_commit().unwrap().applied());
    assert_eq!(winner.status(), SessionStatus::Applied);
    for other in &others {
        assert_eq!(other.status(), SessionStatus::Superseded);
    }
    assert_eq!(manager.active_session_count(), 0);
    assert_eq!(store.text(&ModuleId::new("alpha")).unwrap(), "A b c");
}

#[test]
fn secondary_kind_sessions_can_win_too() {
    let (manager, store) = fixture();

    let primary = manager.check_out(SessionKind::Primary);
    let secondary = manager.check_out(SessionKind::Secondary);

    secondary
        .rewriter_for("beta")
        .unwrap()
        .replace(2, 2, "z")
        .unwrap();

    assert!(secondary.try_commit().unwrap().applied());
    assert_eq!(secondary.status(), SessionStatus::Applied);
    assert_eq!(primary.status(), SessionStatus::Superseded);
    assert_eq!(store.text(&ModuleId::new("beta")).unwrap(), "x z");
}

#[test]
fn superseded_session_commit_is_a_safe_noop() {
    let (manager, store) = fixture();

    let winner = manager.check_out(SessionKind::Primary);
    let loser = manager.check_out(SessionKind::Secondary);

    loser
        .rewriter_for("alpha")
        .unwrap()
        .replace(0, 4, "LOST")
        .unwrap();

    assert!(winner.try_commit().unwrap().applied());

    assert_eq!(loser.try_commit().unwrap(), CommitOutcome::NotApplied);
    assert_eq!(loser.status(), SessionStatus::Superseded);
    // the loser's queued edits were discarded, not applied
    assert_eq!(store.text(&ModuleId::new("alpha")).unwrap(), "a b c");
}

#[test]
fn at_most_one_of_many_sessions_ever_applies() {
    let (manager, _) = fixture();

    let sessions: Vec<_> = (0..6)
        .map(|i| {
            manager.check_out(if i % 2 == 0 {
                SessionKind::Primary
            } else {
                SessionKind::Secondary
            })
        })
        .collect();

    let mut applied = 0;
    for session in &sessions {
        if session.try_commit().unwrap().applied() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(
        sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Superseded)
            .count(),
        5
    );
}

#[test]
fn invalidated_session_late_commit_leaves_newcomers_untouched() {
    let (manager, _) = fixture();

    let stale = manager.check_out(SessionKind::Primary);
    manager.invalidate_all();

    let fresh_a = manager.check_out(SessionKind::Primary);
    let fresh_b = manager.check_out(SessionKind::Secondary);

    assert_eq!(stale.try_commit().unwrap(), CommitOutcome::NotApplied);

    assert_eq!(stale.status(), SessionStatus::Superseded);
    assert_eq!(fresh_a.status(), SessionStatus::Valid);
    assert_eq!(fresh_b.status(), SessionStatus::Valid);
    assert_eq!(manager.active_session_count(), 2);
}

#[test]
fn status_is_one_shot() {
    let (manager, _) = fixture();

    let applied = manager.check_out(SessionKind::Primary);
    assert!(applied.try_commit().unwrap().applied());

    // no later event moves a resolved session
    manager.invalidate_all();
    assert_eq!(applied.status(), SessionStatus::Applied);
    assert_eq!(applied.try_commit().unwrap(), CommitOutcome::NotApplied);
    assert_eq!(applied.status(), SessionStatus::Applied);

    let superseded = manager.check_out(SessionKind::Secondary);
    manager.invalidate_all();
    manager.invalidate_all();
    assert_eq!(superseded.status(), SessionStatus::Superseded);
    assert_eq!(superseded.try_commit().unwrap(), CommitOutcome::NotApplied);
    assert_eq!(superseded.status(), SessionStatus::Superseded);
}

#[test]
fn commit_applies_every_touched_module() {
    let (manager, store) = fixture();

    let session = manager.check_out(SessionKind::Primary);
    session
        .rewriter_for("alpha")
        .unwrap()
        .remove(1, 2)
        .unwrap();
    session
        .rewriter_for("beta")
        .unwrap()
        .insert_after(2, "!")
        .unwrap();

    assert!(session.try_commit().unwrap().applied());

    assert_eq!(store.text(&ModuleId::new("alpha")).unwrap(), "a c");
    assert_eq!(store.text(&ModuleId::new("beta")).unwrap(), "x y!");
    assert_eq!(store.generation(&ModuleId::new("alpha")).unwrap(), 2);
    assert_eq!(store.generation(&ModuleId::new("beta")).unwrap(), 2);
}

#[test]
fn conflicting_edits_abort_the_commit_with_the_session_still_active() {
    let (manager, store) = fixture();

    let session = manager.check_out(SessionKind::Primary);
    let rewriter = session.rewriter_for("alpha").unwrap();
    rewriter.replace(0, 2, "X").unwrap();
    rewriter.replace(2, 4, "Y").unwrap();

    let result = session.try_commit();
    assert!(matches!(result, Err(SessionError::Rewrite(_))));

    // pre-render status: still valid, still active, nothing written
    assert_eq!(session.status(), SessionStatus::Valid);
    assert_eq!(manager.active_session_count(), 1);
    assert_eq!(store.text(&ModuleId::new("alpha")).unwrap(), "a b c");

    // a competitor can still win afterwards
    let competitor = manager.check_out(SessionKind::Secondary);
    assert!(competitor.try_commit().unwrap().applied());
    assert_eq!(session.status(), SessionStatus::Superseded);
}

#[test]
fn resolved_sessions_refuse_new_rewriters() {
    let (manager, _) = fixture();

    let superseded = manager.check_out(SessionKind::Primary);
    manager.invalidate_all();
    assert!(matches!(
        superseded.rewriter_for("alpha"),
        Err(SessionError::NotEditable {
            status: SessionStatus::Superseded
        })
    ));

    let applied = manager.check_out(SessionKind::Primary);
    assert!(applied.try_commit().unwrap().applied());
    assert!(matches!(
        applied.rewriter_for("alpha"),
        Err(SessionError::NotEditable {
            status: SessionStatus::Applied
        })
    ));
}

#[test]
fn unknown_module_is_a_source_error() {
    let (manager, _) = fixture();
    let session = manager.check_out(SessionKind::Primary);
    assert!(matches!(
        session.rewriter_for("gamma"),
        Err(SessionError::Source(_))
    ));
}

#[test]
fn racing_commits_produce_exactly_one_winner() {
    let (manager, _) = fixture();

    let sessions: Vec<_> = (0..8)
        .map(|i| {
            let session = manager.check_out(if i % 2 == 0 {
                SessionKind::Primary
            } else {
                SessionKind::Secondary
            });
            session
                .rewriter_for("alpha")
                .unwrap()
                .insert_before(0, format!("s{i} "))
                .unwrap();
            session
        })
        .collect();

    let barrier = Arc::new(Barrier::new(sessions.len()));
    let handles: Vec<_> = sessions
        .iter()
        .map(|session| {
            let session = Arc::clone(session);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                session.try_commit().unwrap().applied()
            })
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&won| won)
        .count();

    assert_eq!(wins, 1);
    assert_eq!(manager.active_session_count(), 0);
    assert_eq!(
        sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Applied)
            .count(),
        1
    );
    assert_eq!(
        sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Superseded)
            .count(),
        7
    );
}

#[test]
fn vocabulary_types_serialize_stably() {
    assert_eq!(
        serde_json::to_value(SessionStatus::Superseded).unwrap(),
        serde_json::json!("Superseded")
    );
    assert_eq!(
        serde_json::to_value(CommitOutcome::NotApplied).unwrap(),
        serde_json::json!("NotApplied")
    );
    assert_eq!(
        serde_json::to_value(SessionKind::Primary).unwrap(),
        serde_json::json!("Primary")
    );
    assert_eq!(
        serde_json::to_value(ModuleId::new("alpha")).unwrap(),
        serde_json::json!("alpha")
    );
}
