//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hearth::container::Container;
use hearth::launch;
use hearth::lifecycle::Application;

pub const APP: &str = "main";
pub const ENV: &str = "test";

/// Configuration every fixture starts from: ephemeral port, short waits.
pub const BASE_CONFIG: &str = "\
http:
  bind_address: \"127.0.0.1:0\"
  drain_ms: 200
  request_timeout_secs: 5
tasks:
  interpreter: sh
  stop_poll_interval_ms: 50
  stop_max_polls: 40
";

/// A project root on disk with one application, `main`.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config("")
    }

    /// Fixture whose `config/main.test.yml` holds `extra` on top of
    /// [`BASE_CONFIG`].
    pub fn with_config(extra: &str) -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write("config/base.yml", BASE_CONFIG);
        fixture.write(
            &format!("config/{}.{}.yml", APP, ENV),
            &format!("@import: base.yml\n{}", extra),
        );
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `rel` inside `apps/main`.
    pub fn app_path(&self, rel: &str) -> PathBuf {
        self.root().join("apps").join(APP).join(rel)
    }

    /// Write `contents` at `rel` under the root, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Write `contents` at `rel` inside `apps/main`.
    pub fn write_app(&self, rel: &str, contents: &str) {
        self.write(&format!("apps/{}/{}", APP, rel), contents);
    }

    /// Application over the kernel container, without signal handlers.
    pub fn app<F>(&self, configure: F) -> Application
    where
        F: FnOnce(&Container),
    {
        launch::application(APP, self.root(), ENV, configure).handle_signals(false)
    }
}

/// Names of every lifecycle event the application emits, in order.
pub fn record_events(app: &Application) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    app.events().on_any(move |event| sink.lock().unwrap().push(event.name()));
    seen
}

/// Minimal HTTP/1.1 GET. Returns the status code, the lowercased head and the body.
pub async fn http_get(addr: SocketAddr, path: &str) -> (u16, String, String) {
    http_get_with(addr, path, &[]).await
}

/// [`http_get`] with extra request headers.
pub async fn http_get_with(
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
) -> (u16, String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let extra: String = headers
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\n{}Connection: close\r\n\r\n",
        path, extra
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8_lossy(&raw).into_owned();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    (status, head.to_lowercase(), body.to_string())
}
