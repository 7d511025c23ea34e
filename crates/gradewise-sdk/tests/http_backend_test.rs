// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP backend tests against a gradewise-core server bound to an ephemeral
//! port.

#![cfg(feature = "http")]

use std::sync::Arc;
use std::time::Duration;

use gradewise_core::Engine;
use gradewise_core::server::serve_listener;
use gradewise_protocol::{
    RecordAttemptRequest, RunStatus, SaveStepRequest, StartRunRequest, StepOutcome,
};
use gradewise_sdk::{
    ActivityError, ActivityRegistry, HttpBackend, SdkBackend, SdkConfig, SdkError, Worker,
    WorkflowContext, WorkflowRegistry,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "http-queue";

struct TestServer {
    engine: Arc<Engine>,
    config: SdkConfig,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let engine = Arc::new(Engine::in_memory());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(serve_listener(listener, engine.clone(), shutdown.clone()));

        let config = SdkConfig::default()
            .with_substrate_addr(addr.to_string())
            .with_worker_id("http-worker")
            .with_poll_interval_ms(10)
            .with_request_timeout_ms(5_000);
        Self {
            engine,
            config,
            shutdown,
        }
    }

    fn backend(&self) -> HttpBackend {
        HttpBackend::new(&self.config).unwrap()
    }

    async fn start_run(&self, input: serde_json::Value) -> String {
        self.engine
            .start_run(StartRunRequest {
                workflow_type: "Greeting".to_string(),
                task_queue: QUEUE.to_string(),
                input,
                workflow_id: None,
                execution_timeout_ms: None,
            })
            .await
            .unwrap()
            .run_id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn test_health_over_http() {
    let server = TestServer::start().await;
    let health = server.backend().health().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.open_runs, 0);
}

#[tokio::test]
async fn test_worker_primitives_over_http() {
    let server = TestServer::start().await;
    let backend = server.backend();
    let run_id = server.start_run(json!("Sam")).await;

    let claimed = backend.claim(QUEUE, "http-worker").await.unwrap().unwrap();
    assert_eq!(claimed.run_id, run_id);
    assert!(backend.claim(QUEUE, "other").await.unwrap().is_none());

    let expires = backend.heartbeat(&run_id, "http-worker").await.unwrap();
    assert!(expires >= claimed.lease_expires_at);

    assert!(backend.get_step(&run_id, "1:Greet").await.unwrap().is_none());
    backend
        .record_attempt(
            &run_id,
            "1:Greet",
            RecordAttemptRequest {
                worker_id: "http-worker".to_string(),
                activity_name: "Greet".to_string(),
                attempt: 1,
                error: None,
            },
        )
        .await
        .unwrap();
    let step = backend
        .save_step(
            &run_id,
            "1:Greet",
            SaveStepRequest {
                worker_id: "http-worker".to_string(),
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
    assert_eq!(
        backend.get_step(&run_id, "1:Greet").await.unwrap(),
        Some(step)
    );

    backend
        .complete(&run_id, "http-worker", json!("Hello, Sam!"))
        .await
        .unwrap();
    let info = server.engine.describe_run(&run_id).await.unwrap();
    assert_eq!(info.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_stale_worker_gets_lease_lost_over_http() {
    let server = TestServer::start().await;
    let backend = server.backend();
    let run_id = server.start_run(json!("Sam")).await;
    backend.claim(QUEUE, "http-worker").await.unwrap().unwrap();

    let err = backend.heartbeat(&run_id, "intruder").await.unwrap_err();
    assert!(err.is_lease_lost(), "unexpected error: {:?}", err);

    let err = backend.fail(&run_id, "intruder", "nope").await.unwrap_err();
    assert!(err.is_lease_lost());
}

#[tokio::test]
async fn test_unknown_run_maps_server_error() {
    let server = TestServer::start().await;
    let err = server
        .backend()
        .get_step("missing", "1:Greet")
        .await
        .unwrap_err();
    match err {
        SdkError::Server { code, .. } => assert_eq!(code, "RUN_NOT_FOUND"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_substrate_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SdkConfig::default()
        .with_substrate_addr(addr.to_string())
        .with_request_timeout_ms(1_000);
    let err = HttpBackend::new(&config).unwrap().health().await.unwrap_err();
    assert!(matches!(err, SdkError::Connection(_)), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn test_worker_runs_workflow_over_http() {
    let server = TestServer::start().await;

    let activities = ActivityRegistry::builder()
        .register_typed("Greet", |_ctx, name: String| async move {
            Ok::<_, ActivityError>(format!("Hello, {}!", name))
        })
        .build();
    let workflows = WorkflowRegistry::builder()
        .register_typed("Greeting", |ctx: WorkflowContext, name: String| async move {
            ctx.execute_activity::<_, String>("Greet", &name).await
        })
        .build();
    let worker = Worker::new(
        Arc::new(server.backend()),
        &server.config,
        QUEUE,
        Arc::new(workflows),
        Arc::new(activities),
    );
    worker.check_connection().await.unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { worker.run(token).await });

    let run_id = server.start_run(json!("Sam")).await;
    let info = server
        .engine
        .wait_for_terminal(&run_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(info.output, Some(json!("Hello, Sam!")));

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
