//! The scheduler loop and dispatch path, plus the queue-refill loop that
//! pulls new waiting builds from storage.

use tokio_util::sync::CancellationToken;

use crate::controller::build::{Build, BuildStatus};
use crate::controller::health;
use crate::controller::registry::{AgentAddr, AgentStatus};
use crate::controller::settings::SettingsError;
use crate::controller::Controller;
use crate::error::Result;
use crate::protocol::DispatchRequest;

impl Controller {
    /// One scheduler pass: reserve an idle agent, confirm it is alive, pair
    /// it with the queue head and dispatch. Returns true iff a build was
    /// dispatched, so the loop can immediately drain a backlog.
    ///
    /// A build dequeued here is either handed to an agent or requeued
    /// before the pass returns; it is never dropped.
    pub async fn scheduler_pass(&self) -> bool {
        // Reservation (Waiting -> Trying) happens inside the lock, before
        // the probe can suspend; no other pass can pick the same agent.
        let Some(agent) = self.registry.write().await.reserve_idle() else {
            return false;
        };

        if !health::probe(&self.http, &agent).await {
            tracing::warn!(agent = %agent, "agent failed liveness probe, removing");
            if let Some(build) = self.registry.write().await.remove(&agent) {
                self.queue.write().await.requeue(build);
            }
            return false;
        }

        let build = self.queue.write().await.dequeue_front();
        let Some(build) = build else {
            // Nothing to do; release the reservation.
            self.registry
                .write()
                .await
                .set_status(&agent, AgentStatus::Waiting, None);
            return false;
        };

        self.dispatch(build, agent).await
    }

    /// Hand a build to a reserved agent. The agent ends this call either
    /// Working (with the build attached) or back at Waiting (build
    /// requeued); it is never left Trying.
    async fn dispatch(&self, build: Build, agent: AgentAddr) -> bool {
        tracing::info!(build_id = %build.id, agent = %agent, "dispatching build");

        let settings = match self.settings.fetch().await {
            Ok(settings) => settings,
            Err(SettingsError::NotConfigured) => {
                tracing::warn!(
                    build_id = %build.id,
                    "repository not configured, returning build to queue"
                );
                self.release(&agent, build).await;
                return false;
            }
            Err(SettingsError::Transport(err)) => {
                tracing::warn!(
                    build_id = %build.id,
                    error = %err,
                    "settings fetch failed, returning build to queue"
                );
                self.release(&agent, build).await;
                return false;
            }
        };

        let request = DispatchRequest {
            build_id: build.id.clone(),
            repo_name: settings.repo_name,
            commit_hash: build.commit_hash.clone(),
            build_command: settings.build_command,
        };

        match self.send_build(&agent, &request).await {
            Ok(()) => {
                let started_at = chrono::Utc::now();
                self.registry.write().await.set_status(
                    &agent,
                    AgentStatus::Working,
                    Some(build.clone()),
                );
                self.timers.write().await.start(&build.id, started_at);
                self.spawn_report_start(build.id.clone(), started_at);
                tracing::info!(build_id = %build.id, agent = %agent, "build started");
                true
            }
            Err(err) => {
                // The agent keeps its registry entry; only a failed
                // liveness probe evicts.
                tracing::warn!(
                    build_id = %build.id,
                    agent = %agent,
                    error = %err,
                    "dispatch failed, returning build to queue"
                );
                self.release(&agent, build).await;
                false
            }
        }
    }

    async fn send_build(&self, agent: &AgentAddr, request: &DispatchRequest) -> Result<()> {
        let url = format!("{}/build", agent.base_url());
        self.http
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Failed-dispatch cleanup: agent back to Waiting, build to the back of
    /// the queue. `set_status` is a no-op if a concurrent health sweep
    /// already evicted the agent.
    async fn release(&self, agent: &AgentAddr, build: Build) {
        self.registry
            .write()
            .await
            .set_status(agent, AgentStatus::Waiting, None);
        self.queue.write().await.requeue(build);
    }

    /// One refill pass: page through the storage build list and enqueue
    /// waiting builds that are not already queued. Returns how many were
    /// added.
    pub async fn refill_queue(&self) -> Result<usize> {
        let limit = self.config.page_size;
        let mut offset = 0;
        let mut added = 0;

        loop {
            let page = self.storage.build_list(offset, limit).await?;
            let page_len = page.len() as u32;

            {
                let mut queue = self.queue.write().await;
                for record in page {
                    if record.status != BuildStatus::Waiting {
                        continue;
                    }
                    let build = Build {
                        id: record.id,
                        commit_hash: record.commit_hash,
                        status: record.status,
                    };
                    if queue.enqueue(build) {
                        added += 1;
                    }
                }
            }

            if page_len < limit {
                break;
            }
            offset += limit;
        }

        Ok(added)
    }
}

/// The top-level scheduling task. Re-arms on a fixed interval regardless of
/// the previous outcome; after a successful dispatch it immediately runs
/// another pass so a backlog drains as fast as agents become available.
pub(crate) async fn run_scheduler(controller: Controller, token: CancellationToken) {
    let mut interval = tokio::time::interval(controller.config.scheduler_interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let queued = controller.queue.read().await.len();
        let idle_agents = controller.registry.read().await.waiting_count();
        tracing::debug!(queued, idle_agents, "scheduler pass");

        while controller.scheduler_pass().await {}
    }
    tracing::debug!("scheduler loop stopped");
}

/// Periodic storage poll that keeps the queue fed with new waiting builds.
pub(crate) async fn run_queue_refill(controller: Controller, token: CancellationToken) {
    let mut interval = tokio::time::interval(controller.config.poll_interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        match controller.refill_queue().await {
            Ok(added) => {
                if added > 0 {
                    tracing::info!(added, "found new waiting builds");
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    delay = ?controller.config.poll_interval,
                    "failed to fetch build list, retrying on next tick"
                );
            }
        }
    }
    tracing::debug!("queue-refill loop stopped");
}
