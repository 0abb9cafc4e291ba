//! Export the seeds of a contagious period as a report submission.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin export_report -- <start_time> <end_time> [--database <path>] [--authorization <code>]
//! ```
//!
//! Times are RFC 3339 (`2020-04-25T22:10:00Z`). The submission JSON is
//! printed on stdout; delivering it to the health authority is up to the
//! caller.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use epitrace::adapters::SqliteClientStore;
use epitrace::config::DaemonConfig;
use epitrace::domain::ReportSubmission;
use epitrace::{ContactTracer, TracerRoles};

/// Authorization placeholder when none is supplied.
const NO_AUTHORIZATION: &str = ":NONE:";

struct Args {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    database: PathBuf,
    authorization: String,
}

fn usage() -> String {
    "Usage: export_report <start_time> <end_time> [--database <path>] [--authorization <code>]"
        .to_string()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Invalid time {value:?}: {e}"))
}

fn parse_args(config: &DaemonConfig) -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut database = config.client_db.clone();
    let mut authorization = NO_AUTHORIZATION.to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-D" | "--database" => {
                database = PathBuf::from(args.next().ok_or_else(usage)?);
            }
            "-a" | "--authorization" => {
                authorization = args.next().ok_or_else(usage)?;
            }
            "-h" | "--help" => return Err(usage()),
            _ if times.len() < 2 => times.push(parse_time(&arg)?),
            _ => return Err(usage()),
        }
    }

    let &[start, end] = times.as_slice() else {
        return Err(usage());
    };
    Ok(Args {
        start,
        end,
        database,
        authorization,
    })
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

    let now = Utc::now();
    if args.end > now {
        anyhow::bail!("End time {} lies in the future", args.end);
    }

    let store = Arc::new(
        SqliteClientStore::new(&args.database)
            .with_context(|| format!("Failed to open {}", args.database.display()))?,
    );
    let tracer = ContactTracer::starting_on(store, now, TracerRoles::NONE)?;
    let report = tracer.export_report(args.start, Some(args.end))?;

    let submission = ReportSubmission::from_report(&report, args.authorization);
    println!("{}", serde_json::to_string(&submission)?);
    Ok(ExitCode::SUCCESS)
}
