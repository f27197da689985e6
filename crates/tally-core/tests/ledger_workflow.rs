//! End-to-end workflows against a real ledger file in a temp directory.

use chrono::Utc;
use tempfile::TempDir;

use tally_core::error::{ErrorCode, PreconditionError};
use tally_core::model::{Agent, AgentKind, Status};
use tally_core::ops::{NewTask, TaskEdit, actions};
use tally_core::{Ledger, LedgerError, LedgerOptions, validate_document};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn fresh_ledger(dir: &TempDir) -> Ledger {
    let ledger = Ledger::open(dir.path().join("TASKS.md"), LedgerOptions::default());
    ledger.init("acme", "TASK", Utc::now()).expect("init ledger");
    ledger
}

fn create(ledger: &Ledger, title: &str) -> String {
    ledger
        .create_task(NewTask::titled(title), "@alice")
        .expect("create task")
}

fn create_blocked_on(ledger: &Ledger, title: &str, deps: &[&str]) -> String {
    let new = NewTask {
        status: Some(Status::Blocked),
        depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
        ..NewTask::titled(title)
    };
    ledger.create_task(new, "@alice").expect("create blocked task")
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn completing_a_dependency_unblocks_its_dependent() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);

    let first = create(&ledger, "Build auth");
    let second = create_blocked_on(&ledger, "Deploy", &[&first]);
    assert_eq!(first, "TASK-001");
    assert_eq!(second, "TASK-002");

    ledger.claim_task(&first, "@alice").expect("claim");
    let unblocked = ledger
        .complete_task(&first, "@alice", Some("merged"))
        .expect("complete");
    assert_eq!(unblocked, vec![second.clone()]);

    let doc = ledger.read().expect("read").document;
    let done = doc.task(&first).expect("first task");
    assert_eq!(done.status, Status::Done);
    assert!(done.claimed_by.is_none());

    let freed = doc.task(&second).expect("second task");
    assert_eq!(freed.status, Status::Todo);
    let last = freed.history.last().expect("history entry");
    assert_eq!(last.action, actions::UNBLOCKED);
    assert_eq!(last.note.as_deref(), Some("unblocked by completion of TASK-001"));
    assert_eq!(last.from.as_deref(), Some("blocked"));
    assert_eq!(last.to.as_deref(), Some("todo"));
}

#[test]
fn dependent_waits_for_every_dependency() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);

    let a = create(&ledger, "Schema");
    let b = create(&ledger, "Migrations");
    let c = create_blocked_on(&ledger, "Release", &[&a, &b]);

    assert!(ledger.complete_task(&a, "@alice", None).expect("complete a").is_empty());
    let doc = ledger.read().expect("read").document;
    assert_eq!(doc.task(&c).expect("c").status, Status::Blocked);

    assert_eq!(ledger.complete_task(&b, "@alice", None).expect("complete b"), vec![c]);
}

#[test]
fn claims_are_exclusive_until_released() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    let id = create(&ledger, "Contended");

    ledger.claim_task(&id, "@alice").expect("alice claims");
    let err = ledger.claim_task(&id, "@bob").expect_err("bob must not steal the claim");
    assert_eq!(err.code(), ErrorCode::AlreadyClaimed);

    let err = ledger
        .release_task(&id, "@bob", None)
        .expect_err("only the claimant releases");
    assert_eq!(err.code(), ErrorCode::NotClaimant);

    ledger.release_task(&id, "@alice", Some("handing off")).expect("release");
    ledger.claim_task(&id, "@bob").expect("bob claims after release");

    let doc = ledger.read().expect("read").document;
    let task = doc.task(&id).expect("task");
    assert_eq!(task.claimed_by.as_deref(), Some("@bob"));
    assert_eq!(task.status, Status::InProgress);
}

#[test]
fn history_only_ever_grows() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    let id = create(&ledger, "Audited");

    let mut seen = Vec::new();
    let steps: Vec<Box<dyn Fn(&Ledger)>> = vec![
        Box::new(|l: &Ledger| l.claim_task("TASK-001", "@alice").expect("claim")),
        Box::new(|l: &Ledger| l.comment_on_task("TASK-001", "@alice", "halfway").expect("comment")),
        Box::new(|l: &Ledger| {
            let edit = TaskEdit {
                title: Some("Audited twice".into()),
                ..TaskEdit::default()
            };
            l.edit_task("TASK-001", edit, "@alice").expect("edit");
        }),
        Box::new(|l: &Ledger| {
            l.complete_task("TASK-001", "@alice", None).expect("complete");
        }),
        Box::new(|l: &Ledger| l.reopen_task("TASK-001", "@bob", Some("regressed")).expect("reopen")),
    ];

    for step in &steps {
        let before = ledger.read().expect("read").document;
        let before = before.task(&id).expect("task").history.clone();
        step(&ledger);
        let after = ledger.read().expect("read").document;
        let after = after.task(&id).expect("task").history.clone();

        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(&after.as_slice()[..before.len()], before.as_slice());
        seen.push(after.last().expect("entry").action.clone());
    }

    assert_eq!(
        seen,
        vec![
            actions::CLAIMED,
            actions::COMMENTED,
            actions::EDITED,
            actions::COMPLETED,
            actions::REOPENED,
        ]
    );
}

#[test]
fn editing_in_a_cycle_is_rejected_and_nothing_is_written() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    let a = create(&ledger, "A");
    let b = create_blocked_on(&ledger, "B", &[&a]);

    let before = std::fs::read(ledger.path()).expect("read bytes");
    let edit = TaskEdit {
        depends_on: Some(vec![b.clone()]),
        ..TaskEdit::default()
    };
    let err = ledger.edit_task(&a, edit, "@alice").expect_err("cycle");
    assert!(matches!(
        err,
        LedgerError::Precondition(PreconditionError::CycleDetected(_))
    ));
    assert_eq!(std::fs::read(ledger.path()).expect("read bytes"), before);
}

#[test]
fn roster_follows_claims() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    assert!(ledger.register_agent(Agent::new("alice", AgentKind::Human)).expect("register"));
    assert!(!ledger.register_agent(Agent::new("@alice", AgentKind::Human)).expect("re-register"));

    let id = create(&ledger, "Tracked");
    ledger.claim_task(&id, "@alice").expect("claim");
    let doc = ledger.read().expect("read").document;
    assert_eq!(doc.agent("@alice").expect("agent").working_on.as_deref(), Some(id.as_str()));

    ledger.complete_task(&id, "@alice", None).expect("complete");
    let doc = ledger.read().expect("read").document;
    assert!(doc.agent("@alice").expect("agent").working_on.is_none());
    assert!(validate_document(&doc).is_clean());
}

// ---------------------------------------------------------------------------
// Destructive operations and backups
// ---------------------------------------------------------------------------

#[test]
fn delete_refuses_while_others_depend_on_the_task() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    let a = create(&ledger, "Base");
    create_blocked_on(&ledger, "Top", &[&a]);

    let err = ledger.delete_task(&a, "@alice", false).expect_err("has dependents");
    assert_eq!(err.code(), ErrorCode::HasDependents);
    assert!(ledger.backups().list().expect("list").is_empty());

    let removed = ledger.delete_task(&a, "@alice", true).expect("forced delete");
    assert_eq!(removed.id, a);
    assert_eq!(ledger.backups().list().expect("list").len(), 1);
}

#[test]
fn archive_keeps_done_work_that_live_tasks_still_need() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    let lone = create(&ledger, "Finished alone");
    let base = create(&ledger, "Finished base");
    let live = create(&ledger, "Still open");
    ledger
        .edit_task(
            &live,
            TaskEdit {
                depends_on: Some(vec![base.clone()]),
                ..TaskEdit::default()
            },
            "@alice",
        )
        .expect("add dependency");
    ledger.complete_task(&lone, "@alice", None).expect("complete lone");
    ledger.complete_task(&base, "@alice", None).expect("complete base");

    let archived = ledger.archive_completed().expect("archive");
    assert_eq!(archived.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec![lone.as_str()]);

    let doc = ledger.read().expect("read").document;
    assert!(doc.task(&base).is_some());
    assert!(doc.task(&lone).is_none());
    assert_eq!(ledger.backups().list().expect("list")[0].reason, "archive");
}

#[test]
fn ids_are_never_reused_after_delete() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = fresh_ledger(&dir);
    create(&ledger, "One");
    let two = create(&ledger, "Two");
    ledger.delete_task(&two, "@alice", false).expect("delete");

    assert_eq!(create(&ledger, "Three"), "TASK-003");
}
