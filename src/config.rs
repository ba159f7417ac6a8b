use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the build controller process.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Address the controller HTTP API listens on
    pub listen_addr: SocketAddr,
    /// Base URL of the storage API, e.g. "http://storage.internal/api"
    pub storage_url: String,
    /// Bearer token presented to the storage API
    pub api_token: String,
    /// Accept invalid TLS certificates from the storage API
    pub accept_invalid_certs: bool,
    /// Delay between scheduler passes when no build was dispatched
    pub scheduler_interval: Duration,
    /// Delay between storage polls for new waiting builds
    pub poll_interval: Duration,
    /// Delay between agent health-check sweeps
    pub health_interval: Duration,
    /// Delay between retries of start/finish reports to the storage API
    pub report_retry_delay: Duration,
    /// Connect/response timeout applied to every outgoing HTTP call
    pub request_timeout: Duration,
    /// Page size used when listing builds from the storage API
    pub page_size: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8080"
                .parse()
                .expect("default listen address is valid"),
            storage_url: "http://127.0.0.1:9000/api".to_string(),
            api_token: String::new(),
            accept_invalid_certs: false,
            scheduler_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            health_interval: Duration::from_secs(10),
            report_retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            page_size: 25,
        }
    }
}

impl ControllerConfig {
    pub fn new(listen_addr: SocketAddr, storage_url: String, api_token: String) -> Self {
        Self {
            listen_addr,
            storage_url,
            api_token,
            ..Default::default()
        }
    }
}

/// Configuration for a build agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the agent HTTP server listens on
    pub listen_addr: SocketAddr,
    /// Host the controller should use to reach this agent
    pub advertised_host: String,
    /// Port the controller should use to reach this agent
    pub advertised_port: u16,
    /// Base URL of the controller, e.g. "http://127.0.0.1:8080"
    pub controller_url: String,
    /// Directory used for repository checkouts; wiped before every build
    pub workdir: PathBuf,
    /// Delay between retries when the controller is unreachable
    pub retry_delay: Duration,
    /// Connect/response timeout applied to every outgoing HTTP call
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8001"
                .parse()
                .expect("default listen address is valid"),
            advertised_host: "127.0.0.1".to_string(),
            advertised_port: 8001,
            controller_url: "http://127.0.0.1:8080".to_string(),
            workdir: PathBuf::from("agent-workspace"),
            retry_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    pub fn new(listen_addr: SocketAddr, advertised_host: String, controller_url: String) -> Self {
        Self {
            advertised_port: listen_addr.port(),
            listen_addr,
            advertised_host,
            controller_url,
            ..Default::default()
        }
    }
}
