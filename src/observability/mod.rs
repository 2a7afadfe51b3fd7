//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured diagnostic events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Connection handler, once per completed request:
//!     → access_log.rs (one line per request, append-only file)
//! ```
//!
//! # Design Decisions
//! - Diagnostic logs and the access log are separate streams
//! - Metrics are cheap (atomic increments) and exported only when enabled

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessLog, AccessRecord, FileAccessLog};
