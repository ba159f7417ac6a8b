//! Agent runtime tests: the build endpoint acknowledges immediately and the
//! result callback (plus re-registration) reaches the controller even when
//! the build itself fails.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::Mutex;
use uuid::Uuid;

use forgeline::agent::{router, AgentRuntime};
use forgeline::config::AgentConfig;
use forgeline::controller::BuildStatus;
use forgeline::protocol::{BuildResultRequest, DispatchRequest, NotifyAgentRequest, StatusOk};

/// Mock controller that records agent check-ins and build results.
#[derive(Clone, Default)]
struct MockController {
    registrations: Arc<Mutex<Vec<NotifyAgentRequest>>>,
    results: Arc<Mutex<Vec<BuildResultRequest>>>,
}

impl MockController {
    async fn spawn() -> (Self, SocketAddr) {
        let controller = Self::default();

        let app = Router::new()
            .route("/notify-agent", post(notify_agent))
            .route("/notify-build-result", post(notify_build_result))
            .with_state(controller.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (controller, addr)
    }
}

async fn notify_agent(
    State(controller): State<MockController>,
    Json(request): Json<NotifyAgentRequest>,
) -> Json<StatusOk> {
    controller.registrations.lock().await.push(request);
    Json(StatusOk::ok())
}

async fn notify_build_result(
    State(controller): State<MockController>,
    Json(request): Json<BuildResultRequest>,
) -> Json<StatusOk> {
    controller.results.lock().await.push(request);
    Json(StatusOk::ok())
}

/// Serve an agent wired to the given controller, on an ephemeral port.
async fn spawn_agent(controller_addr: SocketAddr) -> SocketAddr {
    let workdir = std::env::temp_dir().join(format!("forgeline-agent-test-{}", Uuid::new_v4()));
    let config = AgentConfig {
        controller_url: format!("http://{}", controller_addr),
        workdir,
        retry_delay: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        ..AgentConfig::default()
    };
    let agent = AgentRuntime::new(config).unwrap();

    let app = router(agent);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let (_controller, controller_addr) = MockController::spawn().await;
    let agent_addr = spawn_agent(controller_addr).await;

    let response = reqwest::get(format!("http://{}/health", agent_addr))
        .await
        .unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn build_is_acknowledged_before_it_runs() {
    let (_controller, controller_addr) = MockController::spawn().await;
    let agent_addr = spawn_agent(controller_addr).await;

    let request = DispatchRequest {
        build_id: "b1".to_string(),
        repo_name: format!("forgeline-test/{}", Uuid::new_v4()),
        commit_hash: "deadbeef".to_string(),
        build_command: "true".to_string(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/build", agent_addr))
        .json(&request)
        .send()
        .await
        .unwrap();

    // The acknowledgment confirms receipt only; the build runs after it.
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn failed_build_still_delivers_a_result_and_reregisters() {
    let (controller, controller_addr) = MockController::spawn().await;
    let agent_addr = spawn_agent(controller_addr).await;

    // A repository that cannot exist: the clone step fails whether or not
    // the test environment has network access.
    let request = DispatchRequest {
        build_id: "b-doomed".to_string(),
        repo_name: format!("forgeline-test/{}", Uuid::new_v4()),
        commit_hash: "deadbeef".to_string(),
        build_command: "true".to_string(),
    };

    let client = reqwest::Client::new();
    client
        .post(format!("http://{}/build", agent_addr))
        .json(&request)
        .send()
        .await
        .unwrap();

    // The result callback is the only completion signal; wait for it.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        if !controller.results.lock().await.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "agent never delivered a build result"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let results = controller.results.lock().await;
    assert_eq!(results[0].build_id, "b-doomed");
    assert_eq!(results[0].status, BuildStatus::Fail);
    assert!(!results[0].log.is_empty());
    drop(results);

    // After delivering the result the agent announces itself as idle again.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if !controller.registrations.lock().await.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "agent never re-registered after the build"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
