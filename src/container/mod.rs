//! Service container subsystem.
//!
//! # Data Flow
//! ```text
//! kernel registrations + application registrations
//!     → registry.rs (key → entry, tag → ordered keys)
//!     → resolve(key): value, or factory(container) memoized once
//!     → tagged(tag): ordered bulk resolution (middleware, template globals)
//! ```
//!
//! # Design Decisions
//! - One container per process, built explicitly and passed by reference
//! - Singleton scope only; there is no per-call construction
//! - A per-key "resolving" marker turns re-entrant construction into an error
//! - Dotted keys fall back to a lookup inside a registered tree value

pub mod error;
pub mod registry;

pub use error::{BoxError, ContainerError};
pub use registry::{Container, Instance, Service, ServiceEntry, ServiceKind};
