//! Test harness for controller and agent integration tests.
//!
//! Provides in-process mock servers for the two collaborators the
//! controller talks to: the storage API and a build agent. Both bind to
//! port 0 and record every request they receive.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;

use forgeline::config::ControllerConfig;
use forgeline::controller::Controller;
use forgeline::protocol::{DispatchRequest, StatusOk};
use forgeline::storage::{FinishBuildInput, StartBuildInput, StorageBuild, StorageConf};

/// Mock storage service. Handlers honor offset/limit pagination so the
/// controller's paging logic terminates.
#[derive(Clone, Default)]
pub struct MockStorage {
    pub conf: Arc<Mutex<Option<StorageConf>>>,
    pub builds: Arc<Mutex<Vec<StorageBuild>>>,
    pub started: Arc<Mutex<Vec<StartBuildInput>>>,
    pub finished: Arc<Mutex<Vec<FinishBuildInput>>>,
}

impl MockStorage {
    pub async fn spawn() -> (Self, SocketAddr) {
        let storage = Self::default();

        let app = Router::new()
            .route("/conf", get(get_conf))
            .route("/build/list", get(build_list))
            .route("/build/start", post(build_start))
            .route("/build/finish", post(build_finish))
            .with_state(storage.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (storage, addr)
    }

    pub async fn set_conf(&self, repo_name: &str, build_command: &str) {
        *self.conf.lock().await = Some(StorageConf {
            repo_name: Some(repo_name.to_string()),
            build_command: Some(build_command.to_string()),
        });
    }

    pub async fn clear_conf(&self) {
        *self.conf.lock().await = None;
    }
}

async fn get_conf(State(storage): State<MockStorage>) -> Json<serde_json::Value> {
    let conf = storage.conf.lock().await.clone();
    Json(serde_json::json!({ "data": conf }))
}

async fn build_list(
    State(storage): State<MockStorage>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let offset: usize = params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(25);

    let builds = storage.builds.lock().await;
    let page: Vec<StorageBuild> = builds.iter().skip(offset).take(limit).cloned().collect();
    Json(serde_json::json!({ "data": page }))
}

async fn build_start(
    State(storage): State<MockStorage>,
    Json(input): Json<StartBuildInput>,
) -> StatusCode {
    storage.started.lock().await.push(input);
    StatusCode::OK
}

async fn build_finish(
    State(storage): State<MockStorage>,
    Json(input): Json<FinishBuildInput>,
) -> StatusCode {
    storage.finished.lock().await.push(input);
    StatusCode::OK
}

/// Mock build agent: always answers its health check; accepts or rejects
/// dispatched builds depending on `accept_builds`. Records every dispatch
/// attempt either way.
#[derive(Clone)]
pub struct MockAgent {
    pub dispatches: Arc<Mutex<Vec<DispatchRequest>>>,
    accept_builds: bool,
}

impl MockAgent {
    pub async fn spawn(accept_builds: bool) -> (Self, SocketAddr) {
        let agent = Self {
            dispatches: Arc::new(Mutex::new(Vec::new())),
            accept_builds,
        };

        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/build", post(accept_build))
            .with_state(agent.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (agent, addr)
    }
}

async fn accept_build(
    State(agent): State<MockAgent>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<StatusOk>, StatusCode> {
    agent.dispatches.lock().await.push(request);
    if agent.accept_builds {
        Ok(Json(StatusOk::ok()))
    } else {
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Controller wired to a mock storage address, with short timeouts and
/// retry delays so tests run fast.
pub fn test_controller(storage_addr: SocketAddr) -> Controller {
    let config = ControllerConfig {
        storage_url: format!("http://{}", storage_addr),
        api_token: "test-token".to_string(),
        request_timeout: Duration::from_secs(2),
        report_retry_delay: Duration::from_millis(50),
        ..ControllerConfig::default()
    };
    Controller::new(config).expect("test controller config is valid")
}

/// An address nothing is listening on: bind an ephemeral port, then drop
/// the listener. Connections to it are refused immediately.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll a condition until it holds or the timeout elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
