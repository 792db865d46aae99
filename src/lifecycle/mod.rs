//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Boot (startup.rs):
//!     resolve dirs/config → templates → models → http → socket → tasks
//!     → install signal handlers → `booted`
//!
//! Listen (application.rs):
//!     middleware → bind → serve → start tasks and sockets → `listening`
//!
//! Stop (application.rs, shutdown.rs):
//!     `stopping` → close models → close sockets → stop tasks
//!     → trigger shutdown → drain listener (bounded) → exit code
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop request → wait() runs stop
//! ```
//!
//! # Design Decisions
//! - Phases run in a fixed order; an empty directory skips its phase
//! - Boot is synchronous and fails fast; steady-state failures are logged
//! - Shutdown never blocks indefinitely

pub mod application;
pub mod error;
pub mod events;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use application::{AppState, Application, StopRequest};
pub use error::LifecycleError;
pub use events::{Events, LifecycleEvent, Listener, Phase};
pub use shutdown::Shutdown;
pub use startup::{BootedPhases, CATCHALL};
