//! Typed settings read from the configuration tree.
//!
//! The loaded tree stays the source of truth (it is what `config.<path>`
//! lookups see); these structs are the subset the kernel itself consumes.
//! Every field has a default so an empty configuration is valid.

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::tree::Value;

/// Kernel settings for one application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppSettings {
    /// HTTP listener settings.
    pub http: HttpConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Websocket acceptor settings.
    pub socket: SocketConfig,

    /// Task supervisor settings.
    pub tasks: TasksConfig,

    /// Opaque ORM section; its presence enables the models phase.
    pub orm: Option<Value>,
}

impl AppSettings {
    /// Deserialize settings from a loaded configuration tree.
    ///
    /// Unknown keys are ignored; they belong to application code.
    pub fn from_value(config: &Value) -> Result<Self, ConfigError> {
        match config {
            Value::Null => Ok(Self::default()),
            other => serde_yaml::from_value(other.clone()).map_err(ConfigError::Settings),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Grace period for in-flight requests on stop, in milliseconds.
    pub drain_ms: u64,

    /// Serve the application's `public/` directory as static files.
    pub serve_static: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            drain_ms: 500,
            serve_static: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// File name under the logs directory; stdout only when absent.
    pub file: Option<String>,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Route the websocket acceptor is mounted on.
    pub path: String,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: "/socket".to_string(),
        }
    }
}

/// Task supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Extra task files, relative to the tasks directory.
    pub files: Vec<String>,

    /// Program that runs each task file; files are executed directly when absent.
    pub interpreter: Option<String>,

    /// Extra arguments for the interpreter (before the file) or for the file itself.
    pub args: Vec<String>,

    /// Interval between stop barrier polls, in milliseconds.
    pub stop_poll_interval_ms: u64,

    /// Number of polls before the stop barrier gives up.
    pub stop_max_polls: u32,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            interpreter: None,
            args: Vec::new(),
            stop_poll_interval_ms: 100,
            stop_max_polls: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_uses_defaults() {
        let settings = AppSettings::from_value(&Value::Null).unwrap();
        assert_eq!(settings.http.bind_address, "0.0.0.0:3000");
        assert_eq!(settings.socket.path, "/socket");
        assert_eq!(settings.tasks.stop_max_polls, 10);
        assert!(settings.orm.is_none());
    }

    #[test]
    fn test_partial_sections_and_unknown_keys() {
        let tree: Value = serde_yaml::from_str(
            "http:\n  bind_address: 127.0.0.1:0\nlog:\n  level: debug\norm:\n  adapter: memory\nbilling:\n  enabled: true\n",
        )
        .unwrap();

        let settings = AppSettings::from_value(&tree).unwrap();
        assert_eq!(settings.http.bind_address, "127.0.0.1:0");
        assert_eq!(settings.http.drain_ms, 500);
        assert_eq!(settings.log.level, "debug");
        assert!(settings.orm.is_some());
    }

    #[test]
    fn test_wrong_type_is_a_settings_error() {
        let tree: Value = serde_yaml::from_str("tasks:\n  stop_max_polls: many\n").unwrap();
        let err = AppSettings::from_value(&tree).unwrap_err();
        assert!(matches!(err, ConfigError::Settings(_)));
    }
}
