//! End-to-end convergence tests.
//!
//! Drives the full stack through the REST API: create a formation and a
//! layer, converge to running nodes, place containers, and verify the
//! desired-vs-actual report — all against the in-process mock
//! provisioner.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use flotilla_api::build_router;
use flotilla_lifecycle::RetryPolicy;
use flotilla_orchestrator::Orchestrator;
use flotilla_state::{NodeState, StateStore};
use flotilla_tasks::{MockProvisioner, TaskExecutor};

fn test_orchestrator(mock: Arc<MockProvisioner>) -> Orchestrator {
    Orchestrator::new(
        StateStore::open_in_memory().unwrap(),
        TaskExecutor::new(mock),
        RetryPolicy::immediate(),
        Duration::from_secs(5),
    )
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_formation_and_layer(router: &axum::Router, target: u32) {
    let resp = router
        .clone()
        .oneshot(post_json(
            "/api/v1/formations",
            serde_json::json!({ "id": "myapp", "owner": "alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router
        .clone()
        .oneshot(post_json(
            "/api/v1/formations/myapp/layers",
            serde_json::json!({
                "name": "runtime",
                "flavor": "m1.medium",
                "provider": "ec2",
                "ssh_username": "ubuntu",
                "ssh_private_key": "KEY",
                "target_count": target,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn converge_from_empty_layer_to_running_nodes() {
    let mock = Arc::new(MockProvisioner::new());
    let orchestrator = test_orchestrator(mock.clone());
    let store = orchestrator.store().clone();
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 2).await;

    let resp = router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let nodes = body["data"]["nodes"].as_object().unwrap();
    assert_eq!(nodes.len(), 2);
    for outcome in nodes.values() {
        assert_eq!(outcome["outcome"], "running");
    }

    // One bootstrap, one launch and one converge per node.
    let calls = mock.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("build_layer")).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.starts_with("launch_node")).count(), 2);
    assert_eq!(calls.iter().filter(|c| c.starts_with("converge_node")).count(), 2);

    let stored = store.list_nodes("myapp").unwrap();
    assert!(stored.iter().all(|n| n.state == NodeState::Running));
}

#[tokio::test]
async fn second_converge_is_empty_and_submits_nothing() {
    let mock = Arc::new(MockProvisioner::new());
    let orchestrator = test_orchestrator(mock.clone());
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 2).await;
    router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();
    let before = mock.call_count();

    let resp = router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert!(body["data"]["nodes"].as_object().unwrap().is_empty());
    assert_eq!(mock.call_count(), before);
}

#[tokio::test]
async fn partial_failure_reports_per_node_and_still_returns_ok() {
    let mock = Arc::new(MockProvisioner::new());
    mock.fail_launch("runtime-2");
    let orchestrator = test_orchestrator(mock);
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 2).await;

    let resp = router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let nodes = body["data"]["nodes"].as_object().unwrap();
    assert_eq!(nodes["runtime-1"]["outcome"], "running");
    assert_eq!(nodes["runtime-2"]["outcome"], "failed");

    // The report's failure shows up in the topology too.
    let resp = router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/calculate"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["data"]["layers"]["runtime"]["desired"], 2);
    assert_eq!(body["data"]["layers"]["runtime"]["actual"], 1);
}

#[tokio::test]
async fn containers_flow_from_scale_to_placement() {
    let orchestrator = test_orchestrator(Arc::new(MockProvisioner::new()));
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 3).await;
    router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(post_json(
            "/api/v1/formations/myapp/scale/containers",
            serde_json::json!({ "web": 6 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/formations/myapp/containers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let containers = body["data"].as_array().unwrap();
    assert_eq!(containers.len(), 6);

    // Even spread: two replicas per node.
    let mut per_node: BTreeMap<String, u32> = BTreeMap::new();
    for c in containers {
        *per_node
            .entry(c["node_id"].as_str().unwrap().to_string())
            .or_default() += 1;
    }
    assert!(per_node.values().all(|&n| n == 2));
}

#[tokio::test]
async fn layer_destroy_refused_until_nodes_are_gone() {
    let orchestrator = test_orchestrator(Arc::new(MockProvisioner::new()));
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 1).await;
    router
        .clone()
        .oneshot(post_empty("/api/v1/formations/myapp/converge"))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/formations/myapp/layers/runtime")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn build_and_rollback_keep_release_history_gapless() {
    let orchestrator = test_orchestrator(Arc::new(MockProvisioner::new()));
    let router = build_router(orchestrator);

    seed_formation_and_layer(&router, 0).await;

    for image in ["myapp:v1", "myapp:v2"] {
        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/formations/myapp/builds",
                serde_json::json!({
                    "image": image,
                    "procfile": { "web": "node server.js" },
                    "sha": "abc123",
                    "owner": "alice",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = router
        .clone()
        .oneshot(post_json(
            "/api/v1/formations/myapp/config",
            serde_json::json!({ "DEBUG": "1" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/formations/myapp/releases")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(resp).await;
    let versions: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["version"].as_u64().unwrap())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}
