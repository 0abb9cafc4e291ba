//! Ingest a contagious report submission into the server database.
//!
//! # Usage
//!
//! ```bash
//! export_report ... | cargo run --bin add_contagious -- [--database <path>]
//! ```
//!
//! Reads one submission JSON document from stdin.

use std::env;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

use epitrace::adapters::SqliteServerStore;
use epitrace::application::ingest_submission;
use epitrace::config::DaemonConfig;
use epitrace::domain::ReportSubmission;

fn usage() -> String {
    "Usage: add_contagious [--database <path>] < submission.json".to_string()
}

fn parse_args(config: &DaemonConfig) -> Result<PathBuf, String> {
    let mut args = env::args().skip(1);
    let mut database = config.server_db.clone();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-D" | "--database" => {
                database = PathBuf::from(args.next().ok_or_else(usage)?);
            }
            _ => return Err(usage()),
        }
    }
    Ok(database)
}

fn main() -> Result<ExitCode> {
    let _guard = epitrace::logging::init()?;
    let config = DaemonConfig::from_env_or_default();
    let database = match parse_args(&config) {
        Ok(database) => database,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(ExitCode::from(2));
        }
    };

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read submission from stdin")?;
    let submission: ReportSubmission = serde_json::from_str(&body).context("Malformed submission")?;

    let store = SqliteServerStore::new(&database)
        .with_context(|| format!("Failed to open {}", database.display()))?;
    let stored = ingest_submission(&store, &submission)?;
    println!("{stored}");
    Ok(ExitCode::SUCCESS)
}
