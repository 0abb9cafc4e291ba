//! Log setup shared by the binaries.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::sanitize::SanitizingMakeWriter;

/// Default log file for `file` mode.
const DEFAULT_LOG_FILE: &str = "/var/log/epitrace/epitrace.log";

/// Install the global subscriber.
///
/// `EPITRACE_LOG_MODE` selects the sink: `file`, `stdout`, or `auto`
/// (the default), which logs to stderr so tools that print results on
/// stdout stay pipeable. Every event passes through the sanitizer. Keep
/// the returned guard alive until exit or buffered lines are lost.
///
/// # Errors
/// Returns error if the log file cannot be opened.
pub fn init() -> std::io::Result<WorkerGuard> {
    let log_mode = std::env::var("EPITRACE_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let (writer, guard) = match log_mode.as_str() {
        "file" => {
            let log_file = std::env::var("EPITRACE_LOG_FILE")
                .unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?;
            tracing_appender::non_blocking(file)
        }
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        // auto
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}
