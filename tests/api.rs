use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use crafty::containers::engine::{ContainerDetails, ContainerEngine, EngineError};
use crafty::containers::registry::ContainerRegistry;
use crafty::containers::runtime_config::ContainerSpec;
use crafty::containers::store::ConfigStore;
use crafty::server::config::ServerConfig;
use crafty::web::{create_axum_router, AppState};
use crafty::workspace::manager::WorkspaceManager;

/// In-memory engine: containers exist between create and remove.
#[derive(Default)]
struct MemoryEngine {
    containers: Mutex<HashMap<String, ContainerDetails>>,
}

impl MemoryEngine {
    fn set_running(&self, name: &str, running: bool) -> Result<(), EngineError> {
        let mut containers = self.containers.lock().unwrap();
        let details = containers
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        details.running = running;
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn create_container(&self, name: &str, _spec: ContainerSpec) -> Result<String, EngineError> {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            ContainerDetails {
                raw: json!({ "Name": format!("/{name}") }),
                ..ContainerDetails::default()
            },
        );
        Ok(format!("id-{name}"))
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.set_running(name, true)
    }

    async fn stop_container(&self, name: &str, _grace_secs: i32) -> Result<(), EngineError> {
        self.set_running(name, false)
    }

    async fn restart_container(&self, name: &str, _grace_secs: i32) -> Result<(), EngineError> {
        self.set_running(name, true)
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        self.containers
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }
}

struct TestApp {
    _tmp: tempfile::TempDir,
    router: Router,
    workspace_root: std::path::PathBuf,
}

async fn test_app() -> TestApp {
    test_app_with_accounts(Value::Null).await
}

async fn test_app_with_accounts(accounts: Value) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("config.json");
    let document = json!({
        "accounts": accounts,
        "containers": null,
        "versions": ["1.12.2", "1.16.5"]
    });
    std::fs::write(&config_path, document.to_string()).unwrap();

    let config = ServerConfig {
        config_path: config_path.to_string_lossy().into_owned(),
        workspace_dir: tmp.path().join("workspace").to_string_lossy().into_owned(),
        assets_dir: tmp.path().join("assets").to_string_lossy().into_owned(),
        ..ServerConfig::default()
    };

    let store = Arc::new(ConfigStore::open(&config.config_path).await.unwrap());
    let workspace = Arc::new(WorkspaceManager::new(&config.workspace_dir).unwrap());
    let registry = Arc::new(ContainerRegistry::new(
        store.clone(),
        Arc::new(MemoryEngine::default()),
        workspace.clone(),
        config.image.clone(),
    ));

    TestApp {
        workspace_root: workspace.root().to_path_buf(),
        router: create_axum_router(Arc::new(AppState {
            store,
            registry,
            workspace,
            config: Arc::new(config),
        })),
        _tmp: tmp,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let (status, bytes) = send(router, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn create_body(name: &str) -> Value {
    json!({
        "name": name,
        "version": "1.12.2",
        "port": "25565",
        "difficulty": 2,
        "seed": "",
        "forgeVersion": ""
    })
}

#[tokio::test]
async fn test_health_and_versions() {
    let app = test_app().await;

    let (status, body) = send(
        &app.router,
        Request::get("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, body) = send_json(&app.router, "GET", "/api/versions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["values"], json!(["1.12.2", "1.16.5"]));
    assert_eq!(body["error"], Value::Null);
}

#[tokio::test]
async fn test_empty_container_list() {
    let app = test_app().await;
    let (status, body) = send_json(&app.router, "GET", "/api/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["values"], json!([]));
}

#[tokio::test]
async fn test_create_start_and_list() {
    let app = test_app().await;

    let (status, body) =
        send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"], json!(true));

    let (status, _) = send_json(&app.router, "PUT", "/api/containers/mc1/start", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app.router, "GET", "/api/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    let values = body["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["name"], "mc1");
    assert_eq!(values[0]["state"], "Running");
    assert_eq!(values[0]["version"], "1.12.2");

    let (status, body) = send_json(&app.router, "GET", "/api/containers/mc1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["Name"], "/mc1");
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let app = test_app().await;
    let (status, _) =
        send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["value"], Value::Null);
    assert!(body["error"].as_str().unwrap().contains("mc1"));
}

#[tokio::test]
async fn test_invalid_create_requests() {
    let app = test_app().await;

    let mut bad_port = create_body("mc1");
    bad_port["port"] = json!("99999");
    let (status, _) = send_json(&app.router, "POST", "/api/containers", Some(bad_port)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::post("/api/containers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(&app.router, "GET", "/api/containers", None).await;
    assert_eq!(body["values"], json!([]));
}

#[tokio::test]
async fn test_lifecycle_on_absent_container() {
    let app = test_app().await;
    let (status, _) = send_json(&app.router, "PUT", "/api/containers/ghost/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app.router, "DELETE", "/api/containers/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_workspace() {
    let app = test_app().await;
    send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;
    assert!(app.workspace_root.join("mc1").is_dir());

    let (status, _) = send_json(&app.router, "DELETE", "/api/containers/mc1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.workspace_root.join("mc1").exists());

    let (_, body) = send_json(&app.router, "GET", "/api/containers", None).await;
    assert_eq!(body["values"], json!([]));
}

#[tokio::test]
async fn test_workspace_mkdir_list_and_delete() {
    let app = test_app().await;
    send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/containers/mc1/workspace/mkdir",
        Some(json!({ "path": "", "name": "saves" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"]["path"], "saves");

    let (status, body) =
        send_json(&app.router, "GET", "/api/containers/mc1/workspace?path=", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["saves"]);
    assert_eq!(body["values"][0]["isDir"], json!(true));

    let (status, _) = send_json(
        &app.router,
        "DELETE",
        "/api/containers/mc1/workspace/file?path=saves",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.workspace_root.join("mc1/saves").exists());
}

#[tokio::test]
async fn test_workspace_escape_is_forbidden() {
    let app = test_app().await;
    send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;

    let (status, body) = send_json(
        &app.router,
        "GET",
        "/api/containers/mc1/workspace?path=..%2F..",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["value"], Value::Null);

    let (status, _) = send(
        &app.router,
        Request::get("/workspace/mc1/file?path=..%2Fconfig.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_then_download_file() {
    let app = test_app().await;
    send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;

    let boundary = "crafty-test-boundary";
    let multipart = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"path\"\r\n\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"whitelist\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         steve\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/api/containers/mc1/workspace/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    assert_eq!(
        std::fs::read(app.workspace_root.join("mc1/whitelist")).unwrap(),
        b"steve"
    );

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/workspace/mc1/file?path=whitelist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"whitelist\""
    );
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"steve");
}

#[tokio::test]
async fn test_download_directory_as_zip() {
    let app = test_app().await;
    send_json(&app.router, "POST", "/api/containers", Some(create_body("mc1"))).await;
    std::fs::create_dir_all(app.workspace_root.join("mc1/world/region")).unwrap();
    std::fs::write(app.workspace_root.join("mc1/world/level.dat"), b"level").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/workspace/mc1/file?path=world")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"world.zip\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn test_accounts_require_basic_auth() {
    let app = test_app_with_accounts(json!({ "admin": "secret" })).await;

    let (status, body) = send(
        &app.router,
        Request::get("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/versions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"Authorization Required\""
    );

    // admin:wrong
    let (status, _) = send(
        &app.router,
        Request::get("/api/containers")
            .header(header::AUTHORIZATION, "Basic YWRtaW46d3Jvbmc=")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        Request::get("/workspace/mc1/file?path=")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // admin:secret
    let (status, body) = send(
        &app.router,
        Request::get("/api/versions")
            .header(header::AUTHORIZATION, "Basic YWRtaW46c2VjcmV0")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["values"], json!(["1.12.2", "1.16.5"]));
}

#[tokio::test]
async fn test_no_accounts_means_open_access() {
    let app = test_app_with_accounts(json!({})).await;
    let (status, _) = send_json(&app.router, "GET", "/api/containers", None).await;
    assert_eq!(status, StatusCode::OK);
}
