//! Build the tracing batch from reported seeds and publish it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin create_filter -- <filter_path> [--database <path>] [--seeds-file <path>]
//! ```
//!
//! Without `--seeds-file`, expired reports are pruned from the server
//! database and every remaining row goes into the batch. A seeds file
//! holds one `<epoch> <seed-hex>` pair per line. The filter file is
//! replaced atomically.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;

use epitrace::adapters::SqliteServerStore;
use epitrace::application::prune_expired_reports;
use epitrace::config::DaemonConfig;
use epitrace::{Epoch, Seed, TracingBatch};

struct Args {
    filter: PathBuf,
    database: PathBuf,
    seeds_file: Option<PathBuf>,
}

fn usage() -> String {
    "Usage: create_filter <filter_path> [--database <path>] [--seeds-file <path>]".to_string()
}

fn parse_args(config: &DaemonConfig) -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let mut filter: Option<PathBuf> = None;
    let mut database = config.server_db.clone();
    let mut seeds_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-D" | "--database" => {
                database = PathBuf::from(args.next().ok_or_else(usage)?);
            }
            "-s" | "--seeds-file" => {
                seeds_file = Some(PathBuf::from(args.next().ok_or_else(usage)?));
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
        seeds_file,
    })
}

fn read_seeds(path: &Path) -> Result<Vec<(Epoch, Seed)>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let mut fields = line.split_whitespace();
            let (Some(epoch), Some(seed), None) = (fields.next(), fields.next(), fields.next()) else {
                anyhow::bail!("{}:{}: expected `<epoch> <seed>`", path.display(), n + 1);
            };
            let epoch = epoch
                .parse::<Epoch>()
                .with_context(|| format!("{}:{}: invalid epoch", path.display(), n + 1))?;
            let seed = Seed::from_hex(seed)
                .with_context(|| format!("{}:{}: invalid seed", path.display(), n + 1))?;
            Ok((epoch, seed))
        })
        .collect()
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

    let batch: TracingBatch = match &args.seeds_file {
        Some(path) => {
            let pairs = read_seeds(path)?;
            TracingBatch::from_epoch_seeds(pairs.len() as u64, pairs.iter().map(|(e, s)| (*e, s)))?
        }
        None => {
            let store = SqliteServerStore::new(&args.database)
                .with_context(|| format!("Failed to open {}", args.database.display()))?;
            prune_expired_reports(&store, Utc::now())?;
            TracingBatch::from_server_store(&store)?
        }
    };

    batch.publish(&args.filter)?;
    Ok(ExitCode::SUCCESS)
}
