//! Beacon receiver daemon.
//!
//! Records every overheard identifier in the client database and prunes
//! observations that left the retention window. Stops on SIGINT/SIGTERM
//! or when the beacon input ends.
//!
//! # Usage
//!
//! ```bash
//! scanner-feed | cargo run --bin receiver
//! ```
//!
//! Without a built-in scanner backend, beacons are read from stdin as
//! `<ephid-hex> <rssi>` lines.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use epitrace::adapters::{LineBeaconSource, SqliteClientStore, SystemClock};
use epitrace::application::{InterruptibleSleep, Receiver};
use epitrace::config::DaemonConfig;
use epitrace::ports::Clock;
use epitrace::{ContactTracer, TracerRoles};

fn main() -> Result<()> {
    let _guard = epitrace::logging::init()?;
    let config = DaemonConfig::from_env_or_default();

    tracing::info!("Starting Epitrace receiver...");

    if !config.dry_run {
        bail!("No scanner backend is built in; run with EPITRACE_DRY_RUN=1");
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
    let tracer = ContactTracer::starting_on(store, clock.now(), TracerRoles::RECEIVER)?;

    let mut source = LineBeaconSource::stdin();
    let mut receiver = Receiver::new(tracer);
    receiver.run(&mut source, &clock, &sleeper, config.poll_interval)?;

    tracing::info!("Epitrace receiver shutdown complete.");
    Ok(())
}
