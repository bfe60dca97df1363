//! Split/rewire integration tests.
//!
//! These tests verify that splitting a task replaces it with a linear chain,
//! rewires its dependents onto the chain tail, and leaves the graph untouched
//! when decomposition fails.

use conductor::core::{ActivityStatus, AgentRole, TaskStatus};
use conductor::Error;
use serde_json::json;

use crate::fixtures::{linear_plan, plan, Harness};

/// A, B -> T -> D, and E depends on both T and A.
fn fan_plan() -> conductor::core::PlanDraft {
    plan(json!({
        "name": "Fan",
        "tasks": [
            {"id": "a", "title": "A"},
            {"id": "b", "title": "B"},
            {"id": "t", "title": "T", "dependencies": ["a", "b"]},
            {"id": "d", "title": "D", "dependencies": ["t"]},
            {"id": "e", "title": "E", "dependencies": ["t", "a"]}
        ]
    }))
}

/// Test: Split into three
/// Given T with fan-in from A and B and two dependents
/// When T is split into S1, S2, S3
/// Then the chain inherits T's dependencies and dependents wait on S3
#[tokio::test]
async fn test_split_into_chain_rewires_dependents() {
    let h = Harness::planned(fan_plan()).await;
    h.scripted.decompose_into("T", &["S1", "S2", "S3"]);
    let (a, b, t) = (h.id_of("A"), h.id_of("B"), h.id_of("T"));

    let ids = h.orchestrator.split_task(&t).await.unwrap();

    assert_eq!(ids.len(), 3);
    assert_eq!(h.titles(), vec!["A", "B", "D", "E", "S1", "S2", "S3"]);
    assert_eq!(h.task("S1").dependencies, vec![a, b]);
    assert_eq!(h.task("S2").dependencies, vec![ids[0]]);
    assert_eq!(h.task("S3").dependencies, vec![ids[1]]);
    assert_eq!(h.task("D").dependencies, vec![ids[2]]);
    assert_eq!(h.task("E").dependencies, vec![ids[2], a]);
    assert_eq!(h.task("S2").agent_role, AgentRole::Developer);
    assert_eq!(h.task("S1").status, TaskStatus::Pending);

    let project = h.orchestrator.project().unwrap();
    assert!(project.tasks.get(&t).is_none());
    assert!(project.tasks.dangling_dependencies().is_empty());

    let entries = project.activity_log.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == ActivityStatus::Split));
    assert!(entries.iter().all(|e| e.task_id == t));
    assert_eq!(
        entries[1].details.as_deref(),
        Some("Successfully split into 3 subtasks")
    );
}

#[tokio::test]
async fn test_split_chain_runs_in_order() {
    let h = Harness::planned(fan_plan()).await;
    h.scripted.decompose_into("T", &["S1", "S2"]);
    h.orchestrator.split_task(&h.id_of("T")).await.unwrap();

    h.orchestrator.run_all().await.unwrap();

    assert_eq!(
        h.scripted.executed_titles(),
        vec!["A", "B", "S1", "S2", "D", "E"]
    );
    let d_call = h
        .scripted
        .executed
        .lock()
        .unwrap()
        .iter()
        .find(|c| c.title == "D")
        .cloned()
        .unwrap();
    assert_eq!(d_call.context, "Task \"S2\":\ndone: S2");
}

/// Test: Empty decomposition
/// Given a decomposer that returns no subtasks
/// When T is split
/// Then the split fails and only the leading audit entry is added
#[tokio::test]
async fn test_empty_decomposition_leaves_graph_unchanged() {
    let h = Harness::planned(fan_plan()).await;
    let before = h.orchestrator.project().unwrap();
    let t = h.id_of("T");

    let err = h.orchestrator.split_task(&t).await.unwrap_err();

    assert!(matches!(err, Error::EmptyDecomposition { .. }));
    let after = h.orchestrator.project().unwrap();
    assert_eq!(after.tasks, before.tasks);
    assert_eq!(after.activity_log.len(), 1);
    assert_eq!(after.activity_log.entries()[0].status, ActivityStatus::Split);
    assert!(!h.orchestrator.is_splitting());
}

#[tokio::test]
async fn test_decomposer_failure_leaves_graph_unchanged() {
    let h = Harness::planned(fan_plan()).await;
    h.scripted.fail_decomposition("T", "model overloaded");
    let before = h.orchestrator.project().unwrap();

    let err = h.orchestrator.split_task(&h.id_of("T")).await.unwrap_err();

    assert!(matches!(err, Error::Collaborator(ref m) if m == "model overloaded"));
    let after = h.orchestrator.project().unwrap();
    assert_eq!(after.tasks, before.tasks);
    assert_eq!(after.activity_log.len(), 1);
}

#[tokio::test]
async fn test_split_non_pending_task_is_refused() {
    let h = Harness::planned(linear_plan()).await;
    h.scripted.decompose_into("Models", &["M1", "M2"]);
    let models = h.id_of("Models");
    h.orchestrator.execute_task(&models).await.unwrap();
    let log_len = h.orchestrator.project().unwrap().activity_log.len();

    let err = h.orchestrator.split_task(&models).await.unwrap_err();

    assert!(matches!(err, Error::TaskNotSplittable { .. }));
    assert!(h.scripted.decomposed.lock().unwrap().is_empty());
    assert_eq!(
        h.orchestrator.project().unwrap().activity_log.len(),
        log_len
    );
}

#[tokio::test]
async fn test_second_split_is_busy() {
    let h = Harness::planned(fan_plan()).await;
    h.scripted.decompose_into("T", &["S1", "S2"]);
    let gate = h.scripted.gate_decomposition();
    let (t, d) = (h.id_of("T"), h.id_of("D"));

    let (first, second) = tokio::join!(h.orchestrator.split_task(&t), async {
        gate.entered.notified().await;
        let refused = h.orchestrator.split_task(&d).await;
        gate.release.notify_one();
        refused
    });

    assert_eq!(first.unwrap().len(), 2);
    assert!(matches!(second, Err(Error::Busy("split"))));
    assert_eq!(h.scripted.decomposed.lock().unwrap().len(), 1);
}

/// Test: Execution and split side by side
/// Given A executing while T is being split
/// When both finish
/// Then neither result overwrites the other
#[tokio::test]
async fn test_split_during_execution_keeps_both_results() {
    let h = Harness::planned(fan_plan()).await;
    h.scripted.decompose_into("T", &["S1", "S2"]);
    let gate = h.scripted.gate_execution();
    let (a, t) = (h.id_of("A"), h.id_of("T"));

    let (executed, split) = tokio::join!(h.orchestrator.execute_task(&a), async {
        gate.entered.notified().await;
        let split = h.orchestrator.split_task(&t).await;
        gate.release.notify_one();
        split
    });

    executed.unwrap();
    split.unwrap();
    assert_eq!(h.task("A").status, TaskStatus::Completed);
    assert_eq!(h.titles(), vec!["A", "B", "D", "E", "S1", "S2"]);

    // The stored snapshot is the latest one.
    let (h, _) = h.restart().await;
    assert_eq!(h.task("A").status, TaskStatus::Completed);
    assert_eq!(h.titles(), vec!["A", "B", "D", "E", "S1", "S2"]);
}

/// Test: Task leaves pending while its split is in flight
/// Given a split of Models waiting on the decomposer
/// When Models is executed to completion in the meantime
/// Then the split is not applied
#[tokio::test]
async fn test_split_not_applied_after_task_completed() {
    let h = Harness::planned(linear_plan()).await;
    h.scripted.decompose_into("Models", &["M1", "M2"]);
    let gate = h.scripted.gate_decomposition();
    let models = h.id_of("Models");

    let (split, executed) = tokio::join!(h.orchestrator.split_task(&models), async {
        gate.entered.notified().await;
        let executed = h.orchestrator.execute_task(&models).await;
        gate.release.notify_one();
        executed
    });

    executed.unwrap();
    assert!(matches!(split, Err(Error::TaskNotSplittable { .. })));
    assert_eq!(h.titles(), vec!["Models", "API", "UI"]);
    assert_eq!(h.task("Models").status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_split_unknown_task() {
    let h = Harness::planned(linear_plan()).await;
    let err = h
        .orchestrator
        .split_task(&conductor::core::TaskId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}
