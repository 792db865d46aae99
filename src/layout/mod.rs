//! Directory conventions.
//!
//! # Responsibilities
//! - Map logical roots (`http`, `tasks`, `config`, ...) to absolute paths
//! - Enumerate convention files in a stable order
//! - Bind registered code to convention files by file stem

pub mod directories;
pub mod modules;

pub use directories::{file_stem, Directories, Root, UnknownRoot};
pub use modules::{LoadOutcome, Module, Modules};
