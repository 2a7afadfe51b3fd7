//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics → resolver → access log → bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C / trigger → stop accepting → drain connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: collaborators first, listener last (traffic only when ready)
//! - Any startup error is fatal
//! - Shutdown has a deadline: connections still open after it are abandoned

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, StartupError};
