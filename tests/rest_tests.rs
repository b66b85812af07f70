//! REST surface over a scripted fleet.

mod common;

use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use flux_sweeper::api::rest::{self, AppState};
use flux_sweeper::domain::automation::AutomationEngine;
use flux_sweeper::domain::discovery::slot_node;
use flux_sweeper::logging::Logger;

use common::{engine_with_nodes, FakeApi};

async fn serve(
    engine: Arc<AutomationEngine<FakeApi>>,
    logger: Arc<Logger>,
    scan_ips: Vec<IpAddr>,
) -> String {
    let state = AppState {
        engine,
        logger,
        scan_ips: Arc::new(scan_ips),
        internet: Arc::new(AtomicBool::new(true)),
        started: Instant::now(),
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, rest::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_reports_node_count() {
    let (engine, _, logger) = engine_with_nodes(&["n1", "n2"], &["Stuck"]).await;
    let base = serve(engine, logger, vec![]).await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["nodes"], 2);
    assert_eq!(body["internet"], true);
    assert_eq!(body["file_logging"], false);
}

#[tokio::test]
async fn login_event_starts_automation() {
    let (engine, _, logger) = engine_with_nodes(&["n1"], &["Stuck"]).await;
    let base = serve(engine.clone(), logger.clone(), vec![]).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{base}/api/v1/nodes/n1/auth"))
        .json(&json!({ "loggedIn": true, "token": "secret-token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["id"], "n1");
    assert_eq!(summary["state"], "starting");
    assert_eq!(summary["has_credential"], true);
    assert_eq!(summary["cycle_scheduled"], true);

    let resp = http
        .post(format!("{base}/api/v1/nodes/n1/auth"))
        .json(&json!({ "loggedIn": false }))
        .send()
        .await
        .unwrap();
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["state"], "idle");
    assert_eq!(summary["has_credential"], false);

    assert!(logger
        .history()
        .iter()
        .all(|l| !l.line.contains("secret-token")));
    engine.shutdown().await;
}

#[tokio::test]
async fn unknown_node_is_not_found() {
    let (engine, _, logger) = engine_with_nodes(&["n1"], &["Stuck"]).await;
    let base = serve(engine, logger, vec![]).await;
    let http = reqwest::Client::new();

    let auth = http
        .post(format!("{base}/api/v1/nodes/ghost/auth"))
        .json(&json!({ "loggedIn": true, "token": "t" }))
        .send()
        .await
        .unwrap();
    assert_eq!(auth.status(), 404);

    let get = http
        .get(format!("{base}/api/v1/nodes/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 404);
}

#[tokio::test]
async fn discover_endpoint_rescans_configured_ips() {
    let target: IpAddr = "10.1.1.1".parse().unwrap();
    let (engine, api, logger) = engine_with_nodes(&[], &["Stuck"]).await;
    api.set_alive(&[slot_node(target, "unused", 2).api_url]);
    let base = serve(engine, logger, vec![target]).await;
    let http = reqwest::Client::new();

    let before: Value = http
        .get(format!("{base}/api/v1/nodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["nodes"].as_array().unwrap().len(), 0);
    assert!(before["active_node_id"].is_null());

    let after: Value = http
        .post(format!("{base}/api/v1/discover"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["active_node_id"], "IP1-node03");
    assert_eq!(after["nodes"][0]["discovery"], "online");
    assert_eq!(after["nodes"][0]["api_url"], "http://10.1.1.1:16147");
}

#[tokio::test]
async fn log_history_can_be_filtered_by_node() {
    let (engine, _, logger) = engine_with_nodes(&["n1", "n2"], &["Stuck"]).await;
    let base = serve(engine.clone(), logger.clone(), vec![]).await;

    engine
        .handle_auth("n2", true, Some("t".into()))
        .await
        .unwrap();
    logger.record("SYSTEM", &["unrelated".into()]);

    let all: Vec<Value> = reqwest::get(format!("{base}/api/v1/logs"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let only_n2: Vec<Value> = reqwest::get(format!("{base}/api/v1/logs?node=n2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(all.len() > only_n2.len());
    assert!(!only_n2.is_empty());
    assert!(only_n2
        .iter()
        .all(|l| l["prefix"].as_str().unwrap().contains("n2")));
    engine.shutdown().await;
}
