//! # LOCKNET Coordinator Binary
//!
//! Tracks columns, reservations and pickup codes; relays commands to
//! columns over the local network.
//!
//! # Usage
//!
//! ```bash
//! locknet_coordinator --config config/coordinator.toml
//!
//! # Verbose logging
//! locknet_coordinator --config config/coordinator.toml -v
//! ```

use clap::Parser;
use locknet::config::ConfigLoader;
use locknet_coordinator::config::CoordinatorConfig;
use locknet_coordinator::coordinator::Coordinator;
use locknet_coordinator::relay::TcpColumnTransport;
use locknet_coordinator::server::InboundServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// LOCKNET coordinating service
#[derive(Parser, Debug)]
#[command(name = "locknet_coordinator")]
#[command(version)]
#[command(about = "Locker coordinator: column registry, reservations, command relay")]
struct Args {
    /// Path to the coordinator configuration file.
    #[arg(short, long, default_value = "/etc/locknet/coordinator.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("coordinator startup failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!(
        "LOCKNET coordinator v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = CoordinatorConfig::load(&args.config)?;
    config.validate()?;

    let mut coordinator = Coordinator::new(
        Box::new(TcpColumnTransport::new()),
        config.size_layouts(),
    );
    if let Some(staleness_s) = config.coordinator.staleness_s {
        coordinator = coordinator.with_staleness(Duration::from_secs(staleness_s));
    }

    let server = InboundServer::bind(&config.coordinator.listen_addr)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    server.run(&coordinator, &running);

    info!("LOCKNET coordinator shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
