use std::path::PathBuf;

use thiserror::Error;

use crate::container::{BoxError, ContainerError};

/// Error type for boot and listen.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Application: Boot already completed.")]
    BootAlreadyCompleted,

    #[error("Application: Not booted.")]
    NotBooted,

    #[error("Application: Already listening.")]
    AlreadyListening,

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Failed to load module {}: {}", .file.display(), .source)]
    Module {
        file: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
