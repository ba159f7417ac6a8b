//! Controller HTTP surface: agent check-ins, build result callbacks and an
//! operator status view.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::controller::registry::AgentStatus;
use crate::controller::Controller;
use crate::protocol::{BuildResultRequest, NotifyAgentRequest, StatusOk};

pub fn router(controller: Controller) -> Router {
    Router::new()
        .route("/notify-agent", post(notify_agent))
        .route("/notify-build-result", post(notify_build_result))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

async fn notify_agent(
    State(controller): State<Controller>,
    Json(request): Json<NotifyAgentRequest>,
) -> Json<StatusOk> {
    controller.register_agent(request.host, request.port).await;
    Json(StatusOk::ok())
}

async fn notify_build_result(
    State(controller): State<Controller>,
    Json(request): Json<BuildResultRequest>,
) -> Json<StatusOk> {
    controller
        .add_build_result(&request.build_id, request.status, request.log)
        .await;
    Json(StatusOk::ok())
}

#[derive(Serialize)]
struct QueuedBuildInfo {
    id: String,
    commit_hash: String,
}

#[derive(Serialize)]
struct AgentInfo {
    host: String,
    port: u16,
    status: AgentStatus,
    build_id: Option<String>,
}

#[derive(Serialize)]
struct SettingsInfo {
    repo_name: String,
    build_command: String,
}

#[derive(Serialize)]
struct StatusResponse {
    queued: Vec<QueuedBuildInfo>,
    agents: Vec<AgentInfo>,
    settings: Option<SettingsInfo>,
}

async fn status(State(controller): State<Controller>) -> Json<StatusResponse> {
    let queued = controller
        .queue()
        .read()
        .await
        .snapshot()
        .into_iter()
        .map(|build| QueuedBuildInfo {
            id: build.id,
            commit_hash: build.commit_hash,
        })
        .collect();

    let agents = controller
        .registry()
        .read()
        .await
        .snapshot()
        .into_iter()
        .map(|(addr, state)| AgentInfo {
            host: addr.host,
            port: addr.port,
            status: state.status,
            build_id: state.build.map(|build| build.id),
        })
        .collect();

    let settings = controller
        .settings()
        .last_known()
        .await
        .map(|settings| SettingsInfo {
            repo_name: settings.repo_name,
            build_command: settings.build_command,
        });

    Json(StatusResponse {
        queued,
        agents,
        settings,
    })
}
