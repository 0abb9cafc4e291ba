//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the device-side tracer and daemons, and the back-end report
//! ingestion and batch publication.

pub mod batch;
mod daemon;
mod ingest;
mod tracer;

pub use batch::TracingBatch;
pub use daemon::{InterruptibleSleep, Receiver, Transmitter, CLOSE_CONTACT_RSSI};
pub use ingest::{ingest_submission, prune_expired_reports};
pub use tracer::{ContactTracer, TracerRoles};
