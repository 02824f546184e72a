//! HttpSchedulerClient against an in-process scheduler.
//!
//! An axum router bound to 127.0.0.1:0 plays both the desired-state and the
//! actual-state services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use procgrid_scheduler::payload::{DesiredHealthCheck, DesiredLifecycle};
use procgrid_scheduler::*;
use procgrid_state::HealthCheckType;
use serde_json::{Value, json};

const GUID: &str = "0b7f5a52-8c1e-4d4b-a3f1-6f6a1c2d9e11";

#[derive(Clone, Default)]
struct Recorded {
    desired: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn desire(
    State(recorded): State<Recorded>,
    Path(pg): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    recorded.desired.lock().unwrap().push((pg, body));
    StatusCode::ACCEPTED
}

async fn stats(Path(pg): Path<String>) -> axum::response::Response {
    if pg.ends_with("-unavailable") {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if pg.ends_with("-garbage") {
        return "not json".into_response();
    }
    Json(json!([
        {
            "process_guid": pg,
            "instance_guid": "ig-0",
            "index": 0,
            "state": "RUNNING",
            "details": null,
            "uptime": 42,
            "since": 1700000000,
            "host": "10.0.0.4",
            "port": 61000,
            "stats": {"time": "2024-01-02T03:04:05Z", "cpu": 0.5, "mem": 1024, "disk": 2048}
        },
        {"process_guid": pg, "index": 1, "state": "CLAIMED"}
    ]))
    .into_response()
}

async fn stop(Path((_pg, index)): Path<(String, u32)>) -> StatusCode {
    match index {
        0 => StatusCode::ACCEPTED,
        1 => StatusCode::NOT_FOUND,
        2 => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scheduler_router(recorded: Recorded) -> Router {
    Router::new()
        .route("/v1/apps/{pg}", put(desire))
        .route("/v1/apps/{pg}/index/{index}", delete(stop))
        .route("/v1/actual_lrps/{pg}/stats", get(stats))
        .with_state(recorded)
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client_for(base: &str) -> HttpSchedulerClient {
    HttpSchedulerClient::new(base, base, Duration::from_secs(5))
}

fn pg(version: &str) -> ProcessGuid {
    ProcessGuid::new(GUID, version).unwrap()
}

fn desired(version: &str) -> DesiredLrp {
    DesiredLrp {
        process_guid: pg(version).to_string(),
        instances: 3,
        memory_mb: 256,
        disk_mb: 512,
        ports: vec![8080],
        start_command: Some("./run".to_string()),
        health_check: DesiredHealthCheck {
            kind: HealthCheckType::Port,
            timeout_in_seconds: Some(30),
            endpoint: None,
        },
        lifecycle: DesiredLifecycle::Docker {
            image: "busybox".to_string(),
            credentials: None,
        },
    }
}

#[tokio::test]
async fn desire_app_puts_payload() {
    let recorded = Recorded::default();
    let base = spawn(scheduler_router(recorded.clone())).await;
    let client = client_for(&format!("{base}/"));

    client.desire_app(&desired("v1")).await.unwrap();

    let calls = recorded.desired.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, format!("{GUID}-v1"));
    assert_eq!(calls[0].1["instances"], 3);
    assert_eq!(calls[0].1["lifecycle"]["type"], "docker");
}

#[tokio::test]
async fn actual_instances_decodes_records() {
    let base = spawn(scheduler_router(Recorded::default())).await;
    let client = client_for(&base);

    let instances = client.actual_instances(&pg("v1")).await.unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].state, "RUNNING");
    assert_eq!(instances[0].stats.as_ref().unwrap().mem, 1024);
    assert_eq!(instances[1].state, "CLAIMED");
    assert!(instances[1].stats.is_none());
}

#[tokio::test]
async fn actual_instances_surfaces_status_errors() {
    let base = spawn(scheduler_router(Recorded::default())).await;
    let client = client_for(&base);

    let err = client.actual_instances(&pg("unavailable")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Status { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn actual_instances_rejects_undecodable_body() {
    let base = spawn(scheduler_router(Recorded::default())).await;
    let client = client_for(&base);

    let err = client.actual_instances(&pg("garbage")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Decode { .. }));
}

#[tokio::test]
async fn stop_index_maps_not_found_to_already_gone() {
    let base = spawn(scheduler_router(Recorded::default())).await;
    let client = client_for(&base);
    let pg = pg("v1");

    assert_eq!(client.stop_index(&pg, 0).await.unwrap(), StopOutcome::Stopped);
    assert_eq!(client.stop_index(&pg, 1).await.unwrap(), StopOutcome::AlreadyGone);
    assert_eq!(client.stop_index(&pg, 2).await.unwrap(), StopOutcome::AlreadyGone);

    let err = client.stop_index(&pg, 9).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Status { status: 500, .. }));
}

#[tokio::test]
async fn slow_scheduler_times_out() {
    let router = Router::new().route(
        "/v1/actual_lrps/{pg}/stats",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!([]))
        }),
    );
    let base = spawn(router).await;
    let client = HttpSchedulerClient::new(&base, &base, Duration::from_millis(100));

    let err = client.actual_instances(&pg("v1")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Timeout { .. }));
}

#[tokio::test]
async fn unreachable_scheduler_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{addr}"));
    let err = client.desire_app(&desired("v1")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Transport { .. }));
    assert!(err.is_transient());
}
