//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! <config>/<app>.<env>.yml
//!     → loader.rs (read, `_import` merge)
//!     → params.rs (`${…}` interpolation)
//!     → Value tree, registered as the `config` service
//!     → schema.rs (typed AppSettings for the kernel)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All typed fields have defaults to allow minimal configs
//! - Application code reads its own sections through dotted lookups

pub mod loader;
pub mod params;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use params::Params;
pub use schema::{AppSettings, HttpConfig, LogConfig, SocketConfig, TasksConfig};
