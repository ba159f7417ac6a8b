use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use forgeline::agent::AgentRuntime;
use forgeline::config::{AgentConfig, ControllerConfig};
use forgeline::controller::Controller;
use forgeline::shutdown;

#[derive(Parser, Debug)]
#[command(name = "forgeline")]
#[command(version)]
#[command(about = "A lightweight distributed CI build coordinator")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the build controller
    Server(ServerArgs),

    /// Start a build agent
    Agent(AgentArgs),
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port the controller HTTP API listens on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Base URL of the storage API
    #[arg(long)]
    storage_url: String,

    /// Bearer token for the storage API
    #[arg(long)]
    api_token: String,

    /// Accept invalid TLS certificates from the storage API
    #[arg(long)]
    insecure: bool,

    /// Seconds between scheduler passes
    #[arg(long, default_value = "5")]
    scheduler_interval: u64,

    /// Seconds between storage polls for new builds
    #[arg(long, default_value = "10")]
    poll_interval: u64,

    /// Seconds between agent health checks
    #[arg(long, default_value = "10")]
    health_interval: u64,

    /// Seconds between retries of start/finish reports
    #[arg(long, default_value = "5")]
    report_retry_delay: u64,
}

#[derive(Parser, Debug)]
struct AgentArgs {
    /// Port the agent listens on
    #[arg(long, default_value = "8001")]
    port: u16,

    /// Host the controller should use to reach this agent
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Base URL of the controller
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    controller_url: String,

    /// Directory used for repository checkouts
    #[arg(long, default_value = "agent-workspace")]
    workdir: PathBuf,

    /// Seconds between retries when the controller is unreachable
    #[arg(long, default_value = "10")]
    retry_delay: u64,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = ControllerConfig {
        listen_addr,
        storage_url: args.storage_url,
        api_token: args.api_token,
        accept_invalid_certs: args.insecure,
        scheduler_interval: Duration::from_secs(args.scheduler_interval),
        poll_interval: Duration::from_secs(args.poll_interval),
        health_interval: Duration::from_secs(args.health_interval),
        report_retry_delay: Duration::from_secs(args.report_retry_delay),
        ..ControllerConfig::default()
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        storage_url = %config.storage_url,
        "starting forgeline controller"
    );

    let token = shutdown::install_shutdown_handler();
    Controller::new(config)?.run(token).await?;

    Ok(())
}

async fn run_agent(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = AgentConfig {
        listen_addr,
        advertised_host: args.host,
        advertised_port: args.port,
        controller_url: args.controller_url,
        workdir: args.workdir,
        retry_delay: Duration::from_secs(args.retry_delay),
        ..AgentConfig::default()
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        controller_url = %config.controller_url,
        "starting forgeline agent"
    );

    let token = shutdown::install_shutdown_handler();
    AgentRuntime::new(config)?.run(token).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Agent(agent_args) => run_agent(agent_args).await?,
    }

    Ok(())
}
