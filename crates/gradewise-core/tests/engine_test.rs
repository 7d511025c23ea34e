// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle tests for the engine: leases, stale writers, sweeper and
//! deadlines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gradewise_core::persistence::SqlitePersistence;
use gradewise_core::{CoreError, Engine};
use gradewise_protocol::{
    CompleteRunRequest, FailRunRequest, RecordAttemptRequest, RunStatus, SaveStepRequest,
    StartRunRequest, StepOutcome,
};
use serde_json::json;

const QUEUE: &str = "gradewise-backend";

fn start(input: serde_json::Value) -> StartRunRequest {
    StartRunRequest {
        workflow_type: "InteractWithMe".to_string(),
        task_queue: QUEUE.to_string(),
        input,
        workflow_id: None,
        execution_timeout_ms: None,
    }
}

async fn sqlite_engine() -> Engine {
    let persistence = SqlitePersistence::connect("sqlite::memory:").await.unwrap();
    Engine::new(Arc::new(persistence))
}

#[tokio::test]
async fn test_full_lifecycle_on_sqlite() {
    let engine = sqlite_engine().await;
    let run_id = engine.start_run(start(json!("Sam"))).await.unwrap().run_id;

    let info = engine.describe_run(&run_id).await.unwrap();
    assert_eq!(info.status, RunStatus::Running);
    assert_eq!(info.worker_id, None);
    assert_eq!(info.claim_count, 0);

    let claimed = engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();
    assert_eq!(claimed.run_id, run_id);
    assert_eq!(claimed.input, json!("Sam"));
    assert_eq!(claimed.claim_count, 1);

    engine
        .record_attempt(
            &run_id,
            "1:Greet",
            RecordAttemptRequest {
                worker_id: "w-1".to_string(),
                activity_name: "Greet".to_string(),
                attempt: 1,
                error: None,
            },
        )
        .await
        .unwrap();
    let step = engine
        .save_step(
            &run_id,
            "1:Greet",
            SaveStepRequest {
                worker_id: "w-1".to_string(),
                activity_name: "Greet".to_string(),
                attempts: 1,
                outcome: StepOutcome::Completed {
                    output: json!("Hello, Sam!"),
                },
            },
        )
        .await
        .unwrap();
    assert!(step.is_settled());

    engine
        .complete_run(
            &run_id,
            CompleteRunRequest {
                worker_id: "w-1".to_string(),
                output: json!("Hello, Sam!\nGoodbye!"),
            },
        )
        .await
        .unwrap();

    let info = engine.describe_run(&run_id).await.unwrap();
    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(info.output, Some(json!("Hello, Sam!\nGoodbye!")));
    assert!(info.finished_at.is_some());

    let history = engine.history(&run_id).await.unwrap();
    assert_eq!(history.attempts.len(), 1);
    assert_eq!(history.attempts[0].step_key, "1:Greet");

    let health = engine.health().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.open_runs, 0);
}

#[tokio::test]
async fn test_unknown_run() {
    let engine = Engine::in_memory();
    assert!(matches!(
        engine.describe_run("missing").await,
        Err(CoreError::RunNotFound { .. })
    ));
    assert!(matches!(
        engine.history("missing").await,
        Err(CoreError::RunNotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_open_workflow_id_rejected() {
    let engine = Engine::in_memory();
    let mut request = start(json!("Sam"));
    request.workflow_id = Some("greet-sam".to_string());

    engine.start_run(request.clone()).await.unwrap();
    let err = engine.start_run(request).await.unwrap_err();
    assert!(matches!(err, CoreError::RunAlreadyStarted { .. }));
}

#[tokio::test]
async fn test_expired_lease_moves_run_to_second_worker() {
    let engine = Engine::in_memory().with_lease_duration(Duration::from_secs(5));
    let run_id = engine.start_run(start(json!("Sam"))).await.unwrap().run_id;

    engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();
    assert!(engine.claim_run(QUEUE, "w-2").await.unwrap().is_none());

    let report = engine
        .sweep_at(Utc::now() + chrono::Duration::seconds(6))
        .await
        .unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(report.timed_out, 0);

    let reclaimed = engine.claim_run(QUEUE, "w-2").await.unwrap().unwrap();
    assert_eq!(reclaimed.run_id, run_id);
    assert_eq!(reclaimed.claim_count, 2);

    // The first worker's writes are now rejected.
    let err = engine.heartbeat(&run_id, "w-1").await.unwrap_err();
    assert!(matches!(err, CoreError::LeaseLost { .. }));
    let err = engine
        .complete_run(
            &run_id,
            CompleteRunRequest {
                worker_id: "w-1".to_string(),
                output: json!("stale"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::LeaseLost { .. }));

    engine
        .complete_run(
            &run_id,
            CompleteRunRequest {
                worker_id: "w-2".to_string(),
                output: json!("fresh"),
            },
        )
        .await
        .unwrap();
    let info = engine.describe_run(&run_id).await.unwrap();
    assert_eq!(info.output, Some(json!("fresh")));
}

#[tokio::test]
async fn test_heartbeat_extends_lease() {
    let engine = Engine::in_memory().with_lease_duration(Duration::from_secs(5));
    let run_id = engine.start_run(start(json!("Sam"))).await.unwrap().run_id;
    let claimed = engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();

    let beat = engine.heartbeat(&run_id, "w-1").await.unwrap();
    assert!(beat.lease_expires_at >= claimed.lease_expires_at);

    let report = engine.sweep_at(Utc::now()).await.unwrap();
    assert_eq!(report.requeued, 0);
}

#[tokio::test]
async fn test_overdue_run_times_out() {
    let engine = Engine::in_memory();
    let mut request = start(json!("Sam"));
    request.execution_timeout_ms = Some(1_000);
    let run_id = engine.start_run(request).await.unwrap().run_id;
    engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();

    let report = engine
        .sweep_at(Utc::now() + chrono::Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(report.timed_out, 1);

    let info = engine.describe_run(&run_id).await.unwrap();
    assert_eq!(info.status, RunStatus::TimedOut);
    assert_eq!(info.error.as_deref(), Some("execution timeout exceeded"));

    // The worker that still believes it holds the run is told to stop.
    let err = engine
        .fail_run(
            &run_id,
            FailRunRequest {
                worker_id: "w-1".to_string(),
                error: "too late".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRunState { .. }));
}

#[tokio::test]
async fn test_first_settled_outcome_wins() {
    let engine = Engine::in_memory();
    let run_id = engine.start_run(start(json!("Sam"))).await.unwrap().run_id;
    engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();

    let save = |outcome: StepOutcome| SaveStepRequest {
        worker_id: "w-1".to_string(),
        activity_name: "Greet".to_string(),
        attempts: 1,
        outcome,
    };

    engine
        .save_step(
            &run_id,
            "1:Greet",
            save(StepOutcome::Completed {
                output: json!("first"),
            }),
        )
        .await
        .unwrap();
    let kept = engine
        .save_step(
            &run_id,
            "1:Greet",
            save(StepOutcome::Completed {
                output: json!("second"),
            }),
        )
        .await
        .unwrap();
    assert_eq!(
        kept.outcome,
        Some(StepOutcome::Completed {
            output: json!("first")
        })
    );
}

#[tokio::test]
async fn test_waiter_sees_timeout_transition() {
    let engine = Arc::new(Engine::in_memory());
    let mut request = start(json!("Sam"));
    request.execution_timeout_ms = Some(1);
    let run_id = engine.start_run(request).await.unwrap().run_id;

    let waiter = {
        let engine = engine.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move {
            engine
                .wait_for_terminal(&run_id, Duration::from_secs(10))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.sweep().await.unwrap();

    let info = waiter.await.unwrap().unwrap();
    assert_eq!(info.status, RunStatus::TimedOut);
}

#[tokio::test]
async fn test_unbounded_wait_returns_terminal_run() {
    let engine = Arc::new(Engine::in_memory());
    let run_id = engine.start_run(start(json!("Sam"))).await.unwrap().run_id;
    engine.claim_run(QUEUE, "w-1").await.unwrap().unwrap();
    engine
        .complete_run(
            &run_id,
            CompleteRunRequest {
                worker_id: "w-1".to_string(),
                output: json!("done"),
            },
        )
        .await
        .unwrap();

    let info = engine.wait_for_terminal(&run_id, Duration::MAX).await.unwrap();
    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(info.output, Some(json!("done")));
}
