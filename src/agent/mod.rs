//! The worker agent runtime.
//!
//! An agent registers with the controller, waits for a dispatched build,
//! executes it (clone, checkout, build command) and posts the result back.
//! Registration doubles as the idle signal: after delivering a result the
//! agent re-registers, which resets it to Waiting on the controller.

pub mod executor;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use executor::{BuildExecutor, BuildOutcome};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::protocol::{BuildResultRequest, DispatchRequest, NotifyAgentRequest, StatusOk};

#[derive(Clone)]
pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    executor: BuildExecutor,
    http: reqwest::Client,
}

impl AgentRuntime {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            executor: BuildExecutor::new(config.workdir.clone()),
            config: Arc::new(config),
            http,
        })
    }

    /// Run the agent: announce ourselves to the controller in the
    /// background, then serve the build/health endpoints until shutdown.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let announcer = self.clone();
        tokio::spawn(async move { announcer.register_with_controller().await });

        let app = router(self.clone());
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        tracing::info!(addr = %self.config.listen_addr, "agent listening");

        let shutdown = token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    /// Register with the controller, retrying on a fixed delay until the
    /// call is acknowledged. Also called after every delivered result to
    /// signal the agent is idle again.
    async fn register_with_controller(&self) {
        let request = NotifyAgentRequest {
            host: self.config.advertised_host.clone(),
            port: self.config.advertised_port,
        };
        let url = self.controller_endpoint("notify-agent");

        loop {
            let sent = self
                .http
                .post(&url)
                .json(&request)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match sent {
                Ok(_) => {
                    tracing::info!("registered with controller, waiting for work");
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        delay = ?self.config.retry_delay,
                        "controller not reachable, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Execute a dispatched build and deliver its result, then re-register.
    async fn run_build(&self, request: DispatchRequest) {
        let build_id = request.build_id.clone();
        let outcome = self.executor.execute(&request).await;
        self.send_build_result(&build_id, outcome).await;
        self.register_with_controller().await;
    }

    /// Post the build result to the controller, retrying on a fixed delay
    /// until delivered. The result is the only record of the run; dropping
    /// it would strand the build in storage.
    async fn send_build_result(&self, build_id: &str, outcome: BuildOutcome) {
        let request = BuildResultRequest {
            build_id: build_id.to_string(),
            status: outcome.status,
            log: outcome.log,
        };
        let url = self.controller_endpoint("notify-build-result");

        loop {
            let sent = self
                .http
                .post(&url)
                .json(&request)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match sent {
                Ok(_) => {
                    tracing::info!(build_id, "build result delivered");
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        build_id,
                        error = %err,
                        delay = ?self.config.retry_delay,
                        "failed to deliver build result, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    fn controller_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.controller_url.trim_end_matches('/'),
            path
        )
    }
}

pub fn router(agent: AgentRuntime) -> Router {
    Router::new()
        .route("/build", post(start_build))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}

/// Accept a build and acknowledge immediately; execution happens in a
/// spawned task and completion is delivered via the result callback.
async fn start_build(
    State(agent): State<AgentRuntime>,
    Json(request): Json<DispatchRequest>,
) -> Json<StatusOk> {
    tracing::info!(build_id = %request.build_id, "build accepted");
    tokio::spawn(async move { agent.run_build(request).await });
    Json(StatusOk::ok())
}

async fn health() -> StatusCode {
    StatusCode::OK
}
