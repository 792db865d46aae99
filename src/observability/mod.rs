//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (task, phase, connection_id, ...)
//!     → tower-http request spans (http.middleware.trace)
//!
//! Consumers:
//!     → logging.rs (stdout text/JSON, optional file under logs/)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows from the request-id middleware into access logs
//! - The binary owns subscriber installation; the library only emits events

pub mod logging;

pub use logging::{init, LoggingError};
