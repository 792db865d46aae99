//! Background task subsystem.
//!
//! # Data Flow
//! ```text
//! tasks/ directory + `tasks.files` setting
//!     → supervisor.rs (ordered file list)
//!     → start(): one task.rs process per file
//!     → stdout lines / exits → TaskEvent channel → collector
//!     → stop(): SIGTERM each task, bounded wait on the running count
//! ```
//!
//! # Design Decisions
//! - A task is identified by its file stem
//! - Stop is a single termination request; there is no forced kill
//! - The running counter is incremented before spawning and decremented once per exit

pub mod supervisor;
pub mod task;

pub use supervisor::{StopPolicy, TaskSupervisor};
pub use task::{Launcher, Task, TaskError, TaskEvent, TaskState};
