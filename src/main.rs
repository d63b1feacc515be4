//! fwsync - cloud firewall rule synchronizer
//!
//! Loads the provider tokens and the system allow-list, tracks every
//! firewall the account owns, and serves the control API until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Serve on the default port 6001, config files in the current directory
//! fwsync
//!
//! # Custom port and config directory, with an audit trail
//! fwsync 8080 --config-dir /etc/fwsync --audit-log /var/log/fwsync/audit.log
//!
//! # More verbose logging
//! RUST_LOG=fwsync=debug fwsync
//! ```

use clap::Parser;
use fwsync::audit::{self, AuditLog};
use fwsync::config;
use fwsync::core::gateway::{DEFAULT_API_URL, RemoteGateway};
use fwsync::server::{self, AppState};
use fwsync::{RuleStore, SyncOrchestrator};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fwsync", version)]
#[command(about = "Keeps cloud firewall rules in sync with a local desired state", long_about = None)]
struct Cli {
    /// Port of the control API
    #[arg(default_value_t = 6001)]
    port: u16,

    /// Address the control API binds to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Directory holding tokens.json, systemIPs.json and keys.json
    #[arg(long, value_name = "DIR", default_value_os_t = config::default_config_dir())]
    config_dir: PathBuf,

    /// Provider API root
    #[arg(long, value_name = "URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Delay between two checks of a firewall's pending changes
    #[arg(long, value_name = "MS", default_value_t = 2000,
          value_parser = clap::value_parser!(u64).range(100..))]
    poll_interval_ms: u64,

    /// Timeout of each provider request
    #[arg(long, value_name = "SECONDS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=300))]
    timeout: u64,

    /// Append an audit event per track, untrack and push to this file
    #[arg(long, value_name = "PATH")]
    audit_log: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let startup = config::load_startup_config(&cli.config_dir).await?;

    let gateway = RemoteGateway::new(
        cli.api_url,
        Duration::from_secs(cli.timeout),
        startup.credentials,
        startup.system,
    )?;

    let mut orchestrator = SyncOrchestrator::new(Arc::new(RuleStore::new()), Arc::new(gateway))
        .with_poll_interval(Duration::from_millis(cli.poll_interval_ms));
    if let Some(path) = cli.audit_log {
        info!(path = %path.display(), "Audit log enabled");
        let audit = AuditLog::new(path);
        audit::report_last_event(&audit).await;
        orchestrator = orchestrator.with_audit(audit);
    }
    let orchestrator = Arc::new(orchestrator);

    // Nothing is served until the inventory is mirrored
    orchestrator.bootstrap().await?;

    let listener = TcpListener::bind(SocketAddr::new(cli.bind, cli.port)).await?;
    let state = Arc::new(AppState::new(Arc::clone(&orchestrator), startup.api_keys));
    server::serve(listener, state, shutdown_signal()).await?;

    info!("Shutting down");
    orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
