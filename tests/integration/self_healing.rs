//! Runtime-fault self-healing tests.

use conductor::core::{ActivityStatus, AgentRole, TaskStatus};
use conductor::orchestration::RuntimeFault;
use conductor::Error;

use crate::fixtures::{linear_plan, Harness, Scripted};

/// Test: Fault before anything completed
/// Given a fresh plan
/// When the preview reports a runtime fault
/// Then a ready fix task with no dependencies is appended and logged
#[tokio::test]
async fn test_fault_before_any_completion() {
    let h = Harness::planned(linear_plan()).await;

    let fix = h
        .orchestrator
        .report_runtime_fault(&RuntimeFault::new("x is not defined", ""))
        .await
        .unwrap();

    assert_eq!(fix.title, "Fix: x is not defined");
    assert_eq!(fix.status, TaskStatus::Pending);
    assert_eq!(fix.agent_role, AgentRole::Developer);
    assert!(fix.dependencies.is_empty());
    assert_eq!(h.titles().last().map(String::as_str), Some("Fix: x is not defined"));
    assert_eq!(h.ready_titles(), vec!["Models", "Fix: x is not defined"]);

    let project = h.orchestrator.project().unwrap();
    let entry = project.activity_log.last().unwrap();
    assert_eq!(entry.status, ActivityStatus::Split);
    assert_eq!(entry.task_id, fix.id);
}

/// Test: Fault after progress
/// Given Models and API completed
/// When a fault is reported
/// Then the fix task waits on API and receives its output as context
#[tokio::test]
async fn test_fault_depends_on_last_completed() {
    let h = Harness::planned(linear_plan()).await;
    h.orchestrator.execute_next().await.unwrap();
    h.orchestrator.execute_next().await.unwrap();

    let fault = RuntimeFault::new(
        "TypeError: Cannot read properties of undefined (reading 'map')",
        "at TodoList (TodoList.tsx:14:22)",
    );
    let fix = h.orchestrator.report_runtime_fault(&fault).await.unwrap();

    assert_eq!(fix.title, "Fix: TypeError: Cannot read propert...");
    assert_eq!(fix.dependencies, vec![h.id_of("API")]);
    assert!(fix.description.contains("reading 'map'"));
    assert!(fix.description.contains("TodoList.tsx:14:22"));

    h.orchestrator.execute_task(&fix.id).await.unwrap();
    let call = h.scripted.last_call();
    assert_eq!(call.task_id, fix.id);
    assert_eq!(call.context, "Task \"API\":\ndone: API");
    assert_eq!(h.task(&fix.title).status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_fault_without_project() {
    let h = Harness::new(Scripted::new()).await;
    let err = h
        .orchestrator
        .report_runtime_fault(&RuntimeFault::new("boom", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoProject));
}

#[tokio::test]
async fn test_fault_is_persisted() {
    let h = Harness::planned(linear_plan()).await;
    let fix = h
        .orchestrator
        .report_runtime_fault(&RuntimeFault::new("boom", "trace"))
        .await
        .unwrap();

    let (h, _) = h.restart().await;
    assert_eq!(h.id_of("Fix: boom"), fix.id);
}
