//! # LOCKNET Column Controller Binary
//!
//! Drives one column of locker compartments and keeps the coordinator
//! synchronized.
//!
//! # Usage
//!
//! ```bash
//! # Run against simulated hardware
//! locknet_column --config config/column.toml --simulate
//!
//! # Verbose logging
//! locknet_column --config config/column.toml -s -v
//! ```

use clap::Parser;
use locknet::config::ConfigLoader;
use locknet::consts::CYCLE_TIME;
use locknet::hw::ColumnId;
use locknet_column::bus::{ShiftRegisterBus, SimBus};
use locknet_column::config::ColumnConfig;
use locknet_column::cycle::ControlLoop;
use locknet_column::motion::{Compartment, SafetyPolicy};
use locknet_column::server::CommandEndpoint;
use locknet_column::sync::{SyncClient, TcpCoordinatorLink};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// LOCKNET column controller
#[derive(Parser, Debug)]
#[command(name = "locknet_column")]
#[command(version)]
#[command(about = "Locker column controller: hardware control and coordinator synchronization")]
struct Args {
    /// Path to the column configuration file.
    #[arg(short, long, default_value = "/etc/locknet/column.toml")]
    config: PathBuf,

    /// Run against the simulated register chains instead of real GPIO.
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("column startup failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("LOCKNET column v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = ColumnConfig::load(&args.config)?;
    config.validate()?;

    if !args.simulate {
        // Real GPIO backends are board-specific builds; the stock
        // binary only ships the simulated chains.
        return Err("no hardware backend in this build; run with --simulate".into());
    }

    let count = config.column.compartments;
    let bus = ShiftRegisterBus::new(SimBus::new(count), count);

    let policy = SafetyPolicy::new(config.safety.interlock_bypass);
    let mut compartments = heapless::Vec::new();
    for index in 0..count {
        compartments
            .push(Compartment::new(index, policy))
            .map_err(|_| "compartment capacity exceeded")?;
    }

    let endpoint = CommandEndpoint::bind(&config.column.listen_addr)?;
    let sync = SyncClient::new(
        ColumnId::new(config.column.id.clone()),
        config.column.listen_addr.clone(),
        count,
        Instant::now(),
    );
    let link = TcpCoordinatorLink::new(config.column.coordinator_addr.clone());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let mut control = ControlLoop::new(bus, compartments, sync, link, Some(endpoint));

    // Simulated plant: advance the door physics once per cycle.
    while running.load(Ordering::SeqCst) {
        let start = Instant::now();
        control.run_cycle(start);
        control.bus_mut().io_mut().advance(CYCLE_TIME);
        if let Some(rest) = CYCLE_TIME.checked_sub(start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!(
        cycles = control.stats().cycle_count,
        overruns = control.stats().overruns,
        "LOCKNET column shutdown complete"
    );
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
