//! Check the device's observations against a published tracing batch.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin check_infection_risk -- <filter_path> [--database <path>] [--observation <hex>]
//! ```
//!
//! Prints the number of matching observations, or `Found`/`Not found`
//! for a single `--observation` hash. Exits 1 on any match, 0 otherwise.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use epitrace::adapters::SqliteClientStore;
use epitrace::config::DaemonConfig;
use epitrace::{ContactTracer, ObservationHash, TracerRoles, TracingBatch};

struct Args {
    filter: PathBuf,
    database: PathBuf,
    observation: Option<String>,
}

fn usage() -> String {
    "Usage: check_infection_risk <filter_path> [--database <path>] [--observation <hex>]".to_string()
}

fn parse_args(config: &DaemonConfig) -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let mut filter: Option<PathBuf> = None;
    let mut database = config.client_db.clone();
    let mut observation: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-D" | "--database" => {
                database = PathBuf::from(args.next().ok_or_else(usage)?);
            }
            "-o" | "--observation" => {
                observation = Some(args.next().ok_or_else(usage)?);
            }
            "-h" | "--help" => return Err(usage()),
            _ => {
                if filter.is_none() {
                    filter = Some(PathBuf::from(arg));
                } else {
                    return Err(usage());
                }
            }
        }
    }

    Ok(Args {
        filter: filter.unwrap_or_else(|| config.filter_file.clone()),
        database,
        observation,
    })
}

/// Returns whether anything matched.
fn run(args: &Args) -> Result<bool> {
    let batch: TracingBatch = TracingBatch::load(&args.filter)
        .with_context(|| format!("Failed to load {}", args.filter.display()))?;

    if let Some(hex) = &args.observation {
        let hash = ObservationHash::from_hex(hex.trim()).context("Invalid observation hash")?;
        let found = batch.contains(&hash);
        println!("{}", if found { "Found" } else { "Not found" });
        return Ok(found);
    }

    let store = Arc::new(
        SqliteClientStore::new(&args.database)
            .with_context(|| format!("Failed to open {}", args.database.display()))?,
    );
    let tracer = ContactTracer::starting_on(store, Utc::now(), TracerRoles::NONE)?;
    let matches = tracer.evaluate_exposure(&batch)?;
    println!("{matches}");
    Ok(matches > 0)
}

fn main() -> Result<ExitCode> {
    let _guard = epitrace::logging::init()?;
    let config = DaemonConfig::from_env_or_default();
    let args = match parse_args(&config) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(ExitCode::from(2));
        }
    };

    Ok(if run(&args)? {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
