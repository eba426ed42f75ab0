//! grc-resilience command-line tool.
//!
//! # Architecture Overview
//!
//! ```text
//!   probe / monitor
//!        │
//!        ▼
//!  ┌──────────────┐    ┌──────────────┐    ┌────────────┐
//!  │   circuit    │───▶│    retry     │───▶│ HTTP probe │────▶ backend
//!  │   breaker    │    │   executor   │    └────────────┘
//!  └──────────────┘    └──────┬───────┘
//!                             │ exhausted
//!                             ▼
//!                     ┌──────────────┐    ┌──────────────┐
//!                     │ degradation  │───▶│  FileStore   │ (survives restarts)
//!                     │ controller   │    └──────────────┘
//!                     └──────────────┘
//! ```
//!
//! `status` and `clear` only touch the degradation controller.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use grc_resilience::config;
use grc_resilience::lifecycle::{signals, Services, Shutdown};
use grc_resilience::monitor;
use grc_resilience::observability::{logging, metrics};
use grc_resilience::probe::HttpProbe;
use grc_resilience::storage::FileStore;

const BACKEND_BREAKER: &str = "backend";

#[derive(Parser)]
#[command(name = "grc-resilience")]
#[command(about = "Probe a backend through the retry/circuit-breaker/degradation stack", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override `storage.path`.
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the backend once
    Probe {
        #[arg(short, long)]
        url: String,
    },
    /// Probe the backend repeatedly until interrupted
    Monitor {
        #[arg(short, long)]
        url: String,
    },
    /// Print the persisted degradation status
    Status,
    /// Leave emergency mode and clear stored error counters
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::load_or_default(cli.config.as_deref())?;
    if let Some(path) = cli.state_file {
        config.storage.path = path.display().to_string();
    }

    logging::init(&config.observability);
    tracing::info!(config = ?cli.config, state_file = %config.storage.path, "grc-resilience starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // A torn state file must not lock the operator out of `status` and `clear`.
    let store = FileStore::open_or_discard_corrupt(&config.storage.path)?;
    let services = Services::start(config, store);

    match cli.command {
        Commands::Probe { url } => {
            let probe = HttpProbe::new(url, &services.config().probe)?;
            let breaker = services.breaker(BACKEND_BREAKER);
            let outcome = monitor::probe_once(&services, &breaker, &probe).await;
            print_json(&outcome)?;
        }
        Commands::Monitor { url } => {
            let probe = HttpProbe::new(url, &services.config().probe)?;
            run_monitor(&services, &probe).await?;
        }
        Commands::Status => {
            print_json(&services.degradation().status())?;
        }
        Commands::Clear => {
            services.degradation().clear_emergency_mode();
            print_json(&services.degradation().status())?;
        }
    }

    Ok(())
}

async fn run_monitor(services: &Services, probe: &HttpProbe) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Arc::new(Shutdown::new());
    let stop = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal(&signal_shutdown).await;
    });

    let breaker = services.breaker(BACKEND_BREAKER);
    let mut print_error = None;
    monitor::run(services, &breaker, probe, stop, |outcome| {
        if let Err(e) = print_json(outcome) {
            print_error.get_or_insert(e);
            shutdown.trigger();
        }
    })
    .await;

    match print_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
