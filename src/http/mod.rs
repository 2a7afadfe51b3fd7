//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (keep-alive loop, per-client admission)
//!     → request.rs (parse head, decode body)
//!     → response.rs (status decision, headers, body, cache)
//!     → bytes written back, access log record
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ParseError, Payload, Request};
pub use response::{Response, ResponseGenerator, Status};
pub use server::{AppState, ConnectionError, HttpServer};
