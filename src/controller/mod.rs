//! The build controller: queue, agent registry, dispatch, timing and the
//! periodic loops that tie them together.

pub mod api;
pub mod build;
pub mod health;
pub mod queue;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod settings;

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub use build::{Build, BuildStatus};
pub use queue::BuildQueue;
pub use registry::{AgentAddr, AgentRegistry, AgentState, AgentStatus};
pub use report::{BuildTimer, BuildTimers};
pub use settings::{Settings, SettingsError, SettingsProvider};

use crate::config::ControllerConfig;
use crate::error::{ForgelineError, Result};
use crate::storage::StorageClient;

/// Controller state: the queue, registry and timer records, plus the
/// clients used to reach agents and the storage service.
///
/// Constructed once per process and cloned into the loops and HTTP
/// handlers; all shared collections sit behind their own `RwLock`, and no
/// lock is ever held across an await.
#[derive(Clone)]
pub struct Controller {
    pub(crate) config: Arc<ControllerConfig>,
    pub(crate) registry: Arc<RwLock<AgentRegistry>>,
    pub(crate) queue: Arc<RwLock<BuildQueue>>,
    pub(crate) timers: Arc<RwLock<BuildTimers>>,
    pub(crate) storage: StorageClient,
    pub(crate) settings: SettingsProvider,
    pub(crate) http: reqwest::Client,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        if config.api_token.is_empty() {
            return Err(ForgelineError::Config(
                "storage API token must not be empty".into(),
            ));
        }

        let storage = StorageClient::new(
            &config.storage_url,
            &config.api_token,
            config.request_timeout,
            config.accept_invalid_certs,
        )?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(RwLock::new(AgentRegistry::new())),
            queue: Arc::new(RwLock::new(BuildQueue::new())),
            timers: Arc::new(RwLock::new(BuildTimers::new())),
            settings: SettingsProvider::new(storage.clone()),
            storage,
            http,
        })
    }

    /// Run the controller: spawn the scheduler, queue-refill and
    /// health-check loops, then serve the HTTP API until shutdown.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        tokio::spawn(scheduler::run_scheduler(self.clone(), token.clone()));
        tokio::spawn(scheduler::run_queue_refill(self.clone(), token.clone()));
        tokio::spawn(health::run_health_check(self.clone(), token.clone()));

        let app = api::router(self.clone());
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        tracing::info!(addr = %self.config.listen_addr, "controller listening");

        let shutdown = token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    /// Register a new agent or refresh a restarted one; idempotent.
    pub async fn register_agent(&self, host: String, port: u16) {
        let addr = AgentAddr::new(host, port);
        tracing::info!(agent = %addr, "agent registered");
        self.registry.write().await.register(addr);
    }

    /// Handle an agent's completion callback: stamp the finish time and
    /// report status, duration and log to storage. A result for a build
    /// with no timer record (never dispatched by this process) is logged
    /// and dropped, since there is no start time to compute a duration from.
    ///
    /// The agent stays Working in the registry until it re-registers.
    pub async fn add_build_result(&self, build_id: &str, status: BuildStatus, log: String) {
        tracing::info!(build_id, status = %status, "build result received");

        let finished_at = chrono::Utc::now();
        match self.timers.write().await.finish(build_id, finished_at) {
            Some(duration_ms) => {
                self.spawn_report_finish(build_id.to_string(), status, log, duration_ms)
            }
            None => {
                tracing::warn!(build_id, "result for unknown build, dropping");
            }
        }
    }

    pub fn registry(&self) -> &Arc<RwLock<AgentRegistry>> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<RwLock<BuildQueue>> {
        &self.queue
    }

    pub fn timers(&self) -> &Arc<RwLock<BuildTimers>> {
        &self.timers
    }

    pub fn settings(&self) -> &SettingsProvider {
        &self.settings
    }
}
