//! Process configuration for the daemons and tools.

use std::path::PathBuf;
use std::time::Duration;

/// Default client (device) database path.
pub const DEFAULT_CLIENT_DB: &str = "/var/lib/epitrace/client-database.db";

/// Default server (back-end) database path.
pub const DEFAULT_SERVER_DB: &str = "/var/lib/epitrace/server-database.db";

/// Default published filter path.
pub const DEFAULT_FILTER_FILE: &str = "/var/lib/epitrace/filter.bin";

/// Default transmitter poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration shared by the binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub client_db: PathBuf,
    pub server_db: PathBuf,
    pub filter_file: PathBuf,
    pub poll_interval: Duration,
    /// Log beacon changes instead of driving a radio.
    pub dry_run: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            client_db: PathBuf::from(DEFAULT_CLIENT_DB),
            server_db: PathBuf::from(DEFAULT_SERVER_DB),
            filter_file: PathBuf::from(DEFAULT_FILTER_FILE),
            poll_interval: DEFAULT_POLL_INTERVAL,
            dry_run: true,
        }
    }
}

impl DaemonConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - EPITRACE_CLIENT_DB
    /// - EPITRACE_SERVER_DB
    /// - EPITRACE_FILTER_FILE
    /// - EPITRACE_POLL_SECS (positive integer)
    /// - EPITRACE_DRY_RUN (1/0, true/false)
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        let path = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        if let Some(p) = path("EPITRACE_CLIENT_DB") {
            cfg.client_db = p;
        }
        if let Some(p) = path("EPITRACE_SERVER_DB") {
            cfg.server_db = p;
        }
        if let Some(p) = path("EPITRACE_FILTER_FILE") {
            cfg.filter_file = p;
        }

        if let Some(v) = lookup("EPITRACE_POLL_SECS") {
            match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.poll_interval = Duration::from_secs(secs),
                _ => tracing::warn!("Ignoring invalid EPITRACE_POLL_SECS={v:?}"),
            }
        }

        if let Some(v) = lookup("EPITRACE_DRY_RUN") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => cfg.dry_run = true,
                "0" | "false" | "no" => cfg.dry_run = false,
                _ => tracing::warn!("Ignoring invalid EPITRACE_DRY_RUN={v:?}"),
            }
        }

        cfg
    }
}
