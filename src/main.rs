//! Epitrace: Unlinkable Proximity Tracing
//!
//! Main entry point: the beacon transmitter daemon.
//!
//! Rotates the advertised identifier every epoch and provisions each new
//! day's identities shortly before midnight. Stops on SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use epitrace::adapters::{DryRunRadio, SqliteClientStore, SystemClock};
use epitrace::application::{InterruptibleSleep, Transmitter};
use epitrace::config::DaemonConfig;
use epitrace::ports::Clock;
use epitrace::{ContactTracer, TracerRoles};

fn main() -> Result<()> {
    let _guard = epitrace::logging::init()?;
    let config = DaemonConfig::from_env_or_default();

    tracing::info!("Starting Epitrace transmitter...");

    if !config.dry_run {
        bail!("No radio backend is built in; run with EPITRACE_DRY_RUN=1");
    }

    let sleeper = Arc::new(InterruptibleSleep::new());
    let handler_sleeper = Arc::clone(&sleeper);
    ctrlc::set_handler(move || handler_sleeper.interrupt())
        .context("Failed to install signal handler")?;

    let store = Arc::new(
        SqliteClientStore::new(&config.client_db)
            .with_context(|| format!("Failed to open {}", config.client_db.display()))?,
    );
    let clock = SystemClock;
    let tracer = ContactTracer::starting_on(store, clock.now(), TracerRoles::TRANSMITTER)?;

    let mut transmitter = Transmitter::new(tracer, DryRunRadio::new(), config.poll_interval);
    transmitter.run(&clock, &sleeper)?;

    tracing::info!("Epitrace shutdown complete.");
    Ok(())
}
