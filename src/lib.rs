//! Application-runtime kernel.
//!
//! A service container with lazy singletons and tags, a YAML configuration
//! loader with imports and `${…}` parameters, a supervisor for worker
//! processes, and an orchestrator that boots convention directories in a
//! fixed order, serves them, and shuts everything down gracefully.

// Core subsystems
pub mod config;
pub mod container;
pub mod layout;
pub mod tasks;
pub mod tree;

// Collaborators driven by the boot phases
pub mod http;
pub mod models;
pub mod socket;
pub mod templates;

// Orchestration
pub mod kernel;
pub mod launch;
pub mod lifecycle;
pub mod observability;
pub mod scaffold;

pub use config::{AppSettings, ConfigError, ConfigLoader, Params};
pub use container::{BoxError, Container, ContainerError};
pub use lifecycle::{Application, LifecycleError, LifecycleEvent, Phase};
pub use tasks::{Task, TaskError, TaskSupervisor};
