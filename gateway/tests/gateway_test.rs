//! Integration tests for the gateway HTTP surface.
//!
//! Children are real `sleep` processes whose records point at a wiremock
//! server standing in for the model server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::Router;
use http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use inference_gateway::supervisor::LaunchSpec;
use inference_gateway::{routes, AppState, Config};

struct Harness {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
}

impl Harness {
    fn new(toml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_toml(toml).unwrap();
        config.state_file = dir.path().join("gw_state_history.json").display().to_string();
        config.timing.warmup_secs = 0.05;
        config.timing.kill_pause_secs = 0.0;
        Self {
            _dir: dir,
            state: AppState::new(config),
        }
    }

    fn app(&self) -> Router {
        routes::app(
            self.state.clone(),
            &["/run".to_string(), "/notifications".to_string()],
        )
    }

    /// Register a child named `name` whose HTTP port is `port`.
    async fn child(&self, name: &str, port: Option<u16>) {
        self.state
            .fleet
            .spawn(LaunchSpec {
                name: name.to_string(),
                program: "sleep".to_string(),
                args: vec!["30".to_string()],
                host: "127.0.0.1".to_string(),
                port,
            })
            .await
            .unwrap();
    }

    async fn cleanup(&self) {
        self.state.fleet.kill_all(Duration::ZERO).await;
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_proxy_forwards_and_stamps() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(body_json(json!({"INPUT_VALUE": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prediction": 7, "call_id": 1})))
        .expect(1)
        .mount(&upstream)
        .await;

    let h = Harness::new("app_version = \"3.1.0\"");
    h.child("dummy", Some(upstream.address().port())).await;

    let (status, json) = call(
        h.app(),
        post_json("/run", json!({"SIGNATURE": "dummy", "INPUT_VALUE": 3})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], 7);
    assert_eq!(json["app_ver"], "3.1.0");
    assert!(json["ver"].is_string());
    assert!(json["time"].is_string());
    assert!(json["gw-uptime"].as_str().unwrap().starts_with("0:00:"));
    h.cleanup().await;
}

#[tokio::test]
async fn test_proxy_get_query_is_forwarded_as_json() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .and(body_json(json!({"client": "tester"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .expect(1)
        .mount(&upstream)
        .await;

    let h = Harness::new("");
    h.child("dummy", Some(upstream.address().port())).await;

    let (_, json) = call(h.app(), get("/notifications?SIGNATURE=dummy&client=tester")).await;
    assert_eq!(json["data"], json!([1, 2]));
    h.cleanup().await;
}

#[tokio::test]
async fn test_proxy_unknown_signature() {
    let h = Harness::new("");
    h.child("dummy", Some(free_port())).await;

    let (status, json) = call(h.app(), post_json("/run", json!({"SIGNATURE": "nope"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["ERROR"],
        r#"Bad signature nope. Available signatures: ["dummy"]"#
    );
    assert_eq!(h.state.fleet.active_names().await, vec!["dummy"]);
    h.cleanup().await;
}

#[tokio::test]
async fn test_proxy_missing_signature() {
    let h = Harness::new("");
    let (_, json) = call(h.app(), post_json("/run", json!({"INPUT_VALUE": 1}))).await;
    assert_eq!(json["ERROR"], "Bad input. SIGNATURE not found");
}

#[tokio::test]
async fn test_proxy_upstream_down_during_init() {
    let h = Harness::new("");
    h.child("dummy", Some(free_port())).await;

    let (status, json) = call(h.app(), post_json("/run", json!({"SIGNATURE": "dummy"}))).await;
    assert_eq!(status, StatusCode::OK);
    let error = json["ERROR"].as_str().unwrap();
    assert!(error.starts_with("Server 'http://127.0.0.1:"));
    assert!(error.contains("probably is still in INIT stage"));
    h.cleanup().await;
}

#[tokio::test]
async fn test_proxy_download_directive() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("report.csv");
    std::fs::write(&file, "a,b\n1,2\n").unwrap();

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DOWNLOAD": {"DOWNLOAD_FILE_PATH": file.display().to_string()}
        })))
        .mount(&upstream)
        .await;

    let h = Harness::new("");
    h.child("dummy", Some(upstream.address().port())).await;

    let response = h
        .app()
        .oneshot(post_json("/run", json!({"SIGNATURE": "dummy"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(disposition, "attachment; filename=\"report.csv\"");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, bytes::Bytes::from_static(b"a,b\n1,2\n"));
    h.cleanup().await;
}

#[tokio::test]
async fn test_list_servers() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_paths"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"PATHS": ["/run"]})))
        .mount(&upstream)
        .await;

    let h = Harness::new("");
    let port = upstream.address().port();
    h.child("dummy", Some(port)).await;
    h.child("monitor", None).await;

    let (_, json) = call(h.app(), get("/list_servers")).await;
    let servers = &json["AVAIL_SERVERS"];

    assert_eq!(servers["dummy"]["ONLINE"], true);
    assert_eq!(servers["dummy"]["PORT"], port);
    assert_eq!(servers["dummy"]["PATHS"], json!(["/run"]));
    assert_eq!(
        servers["dummy"]["URLS"],
        json!([
            format!("http://127.0.0.1:{}/get_paths", port),
            format!("http://127.0.0.1:{}/run", port)
        ])
    );
    assert!(servers["dummy"]["UPTIME"].is_string());

    assert_eq!(servers["monitor"]["ONLINE"], true);
    assert_eq!(servers["monitor"]["PORT"], Value::Null);
    assert_eq!(servers["monitor"]["PATHS"], json!(["30"]));
    h.cleanup().await;
}

#[tokio::test]
async fn test_kill_all_servers() {
    let h = Harness::new("");
    h.child("a", Some(free_port())).await;
    h.child("b", None).await;

    let (_, json) = call(h.app(), post_json("/kill_server", json!({"SIGNATURE": "*"}))).await;
    assert_eq!(json["MESSAGE"], "OK. Killed 2 servers.");
    assert_eq!(json["KILLED"], json!(["a", "b"]));
    assert!(h.state.fleet.is_empty().await);
}

#[tokio::test]
async fn test_kill_one_server() {
    let h = Harness::new("");
    h.child("a", Some(free_port())).await;

    let (_, json) = call(h.app(), get("/kill_server?SIGNATURE=a")).await;
    assert!(json["MESSAGE"]
        .as_str()
        .unwrap()
        .starts_with("OK. Killed PID="));

    let (_, json) = call(h.app(), get("/kill_server?SIGNATURE=a")).await;
    assert_eq!(json["ERROR"], "Bad signature a. Available signatures: []");
}

#[tokio::test]
async fn test_start_server_rules() {
    let h = Harness::new(
        r#"
        [[endpoints]]
        name = "off"
        disabled = true
        "#,
    );
    h.child("dummy", Some(free_port())).await;

    let (_, json) = call(h.app(), post_json("/start_server", json!({"SIGNATURE": "off"}))).await;
    assert_eq!(json["MESSAGE"], "Server DISABLED.");

    let (_, json) = call(h.app(), post_json("/start_server", json!({"SIGNATURE": "dummy"}))).await;
    assert_eq!(json["ERROR"], "Signature dummy already started");

    let (_, json) = call(h.app(), post_json("/start_server", json!({}))).await;
    assert_eq!(json["ERROR"], "Bad input. SIGNATURE not found");

    let (_, json) = call(h.app(), post_json("/start_server", json!({"SIGNATURE": "ghost"}))).await;
    assert!(json["ERROR"].as_str().unwrap().starts_with("Bad signature ghost."));
    h.cleanup().await;
}

#[tokio::test]
async fn test_support_report_in_system_status() {
    let h = Harness::new("server_name = \"edge_box\"");

    let (_, json) = call(
        h.app(),
        post_json(
            "/support_update_status",
            json!({"SIGNATURE": "monitor", "msg": "Total Mem: 1.0GB", "total_memory": 1.0}),
        ),
    )
    .await;
    assert_eq!(json["MESSAGE"], "OK.");

    let (_, json) = call(h.app(), get("/system_status")).await;
    let status = &json["SYSTEM_STATUS"];
    assert_eq!(status["server_name"], "edge_box");
    assert!(status["mem_total"].as_f64().unwrap() > 0.0);
    assert_eq!(
        status["system_support_services"]["monitor"]["msg"],
        "Total Mem: 1.0GB"
    );
    assert!(status["system_support_services"]["monitor"]
        .get("SIGNATURE")
        .is_none());
    assert!(json["SYSTEM_ALERTS"]["alerts"].is_array());
    assert!(json["SYSTEM_HISTORY"]
        .as_object()
        .unwrap()
        .contains_key("CURRENT_STARTUP"));
}

#[tokio::test]
async fn test_shutdown_requires_token() {
    let h = Harness::new(
        r#"
        [servers]
        binary = "sleep"
        [[endpoints]]
        name = "late"
        "#,
    );
    h.child("dummy", Some(free_port())).await;

    let (_, json) = call(h.app(), post_json("/shutdown", json!({"SIGNATURE": "dummy"}))).await;
    assert_eq!(
        json["ERROR"],
        r#"Bad signature dummy. Available signatures: ["dummy"]"#
    );
    assert!(!h.state.shutdown.is_cancelled());

    let (_, json) = call(
        h.app(),
        post_json("/shutdown", json!({"SIGNATURE": "safe_kill_server_cmd"})),
    )
    .await;
    assert_eq!(json["MESSAGE"], "OK. Shutting down.");

    tokio::time::timeout(Duration::from_secs(10), h.state.shutdown.cancelled())
        .await
        .unwrap();
    assert!(h.state.fleet.is_empty().await);
    assert!(h.state.history.snapshot().last_shutdown.is_some());

    let (_, json) = call(h.app(), post_json("/start_server", json!({"SIGNATURE": "late"}))).await;
    assert_eq!(json["ERROR"], "Gateway is shutting down, late not started");
    assert!(h.state.fleet.is_empty().await);
}

#[tokio::test]
async fn test_reserved_paths_are_not_proxied() {
    let h = Harness::new("");
    let app = routes::app(
        h.state.clone(),
        &["/run".to_string(), "list_servers".to_string(), "run".to_string()],
    );

    let (_, json) = call(app, get("/list_servers")).await;
    assert!(json.get("AVAIL_SERVERS").is_some());
}
