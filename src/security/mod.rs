//! Client admission control.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → rate_limit.rs (register IP, count connections, sliding window)
//!     → over per-client limit? close without reading
//!     → rate limited? every response on the connection is 429
//! ```

pub mod rate_limit;

pub use rate_limit::{ClientGuard, ClientRegistry};
