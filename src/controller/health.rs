//! Agent liveness probing and the health-check loop.
//!
//! This loop is the sole mechanism for reclaiming work from agents that
//! disappear without calling back: a failed probe evicts the agent and, if
//! it was mid-build, returns the build to the queue.

use tokio_util::sync::CancellationToken;

use crate::controller::registry::AgentAddr;
use crate::controller::Controller;

/// Liveness probe: `GET /health` on the agent, bounded by the client's
/// request timeout. Any transport error or non-2xx status counts as dead.
pub(crate) async fn probe(http: &reqwest::Client, agent: &AgentAddr) -> bool {
    let url = format!("{}/health", agent.base_url());
    match http.get(&url).send().await {
        Ok(response) => response.error_for_status().is_ok(),
        Err(err) => {
            tracing::debug!(agent = %agent, error = %err, "health probe failed");
            false
        }
    }
}

impl Controller {
    /// Probe every registered agent once. Probe failure removes the agent;
    /// a build it was Working on is requeued. Agents the scheduler is
    /// mid-dispatching to (Trying) never yield a build here: the
    /// scheduler's own failure path requeues, so the build cannot be
    /// requeued twice.
    pub async fn health_check_pass(&self) {
        let agents = self.registry.read().await.addrs();
        for addr in agents {
            if probe(&self.http, &addr).await {
                continue;
            }

            tracing::warn!(agent = %addr, "agent failed health check, removing");
            let lost = self.registry.write().await.remove(&addr);
            if let Some(build) = lost {
                tracing::info!(
                    build_id = %build.id,
                    agent = %addr,
                    "requeueing build from lost agent"
                );
                self.queue.write().await.requeue(build);
            }
        }
    }
}

/// Periodic health-check task; runs concurrently with and independently of
/// the scheduler loop.
pub(crate) async fn run_health_check(controller: Controller, token: CancellationToken) {
    let mut interval = tokio::time::interval(controller.config.health_interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        controller.health_check_pass().await;
    }
    tracing::debug!("health-check loop stopped");
}
