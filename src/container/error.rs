//! Container error types.

use thiserror::Error;

/// Boxed error returned by factories and file modules.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for service registration and resolution.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Neither the key nor its dotted prefix is registered.
    #[error("Container: Service \"{0}\" not found.")]
    ServiceNotFound(String),

    /// A factory resolved its own key while being constructed.
    #[error("Container: circular dependency while resolving \"{key}\"")]
    CircularDependency { key: String },

    /// The stored instance is not of the requested type.
    #[error("Container: service \"{key}\" is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// The factory returned an error.
    #[error("Container: service \"{key}\" failed to construct: {source}")]
    Factory {
        key: String,
        #[source]
        source: BoxError,
    },
}

impl ContainerError {
    /// Key the error refers to.
    pub fn key(&self) -> &str {
        match self {
            ContainerError::ServiceNotFound(key) => key,
            ContainerError::CircularDependency { key }
            | ContainerError::TypeMismatch { key, .. }
            | ContainerError::Factory { key, .. } => key,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::ServiceNotFound(_))
    }
}
