//! A single supervised worker process.
//!
//! # State Machine
//! ```text
//! Idle ──run()──▶ Running ──stop()──▶ Stopping ──(exit)──▶ Exited
//!                    └──────────────(exit)───────────────────┘
//! Exited ──run()──▶ Running
//! ```
//!
//! The child's stdout carries one message per line (JSON when it parses,
//! a plain string otherwise); stderr lines are failures. Messages to the
//! child are written to its stdin as one JSON document per line.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use crate::layout::file_stem;

/// Error type for task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task \"{id}\" is already running.")]
    AlreadyRunning { id: String },

    #[error("Task \"{id}\" is not running.")]
    NotRunning { id: String },

    #[error("Task \"{id}\" failed to start: {source}")]
    Spawn {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send message to task \"{id}\": {source}")]
    Send {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode message for task \"{id}\": {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    /// Termination requested, process not yet reaped.
    Stopping,
    Exited,
}

/// Notifications emitted by running tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// One stdout line from the task.
    Message { id: String, message: serde_json::Value },

    /// The process exited; `code` is `None` when it was killed by a signal.
    Exited { id: String, code: Option<i32> },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Message { id, .. } | TaskEvent::Exited { id, .. } => id,
        }
    }
}

/// How a task file is turned into a process.
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    /// Program that runs the file; the file itself is executed when absent.
    pub interpreter: Option<String>,

    /// Extra arguments. With an interpreter they precede the file,
    /// otherwise they follow it.
    pub args: Vec<String>,

    /// Environment variables added to the inherited environment.
    pub envs: Vec<(String, String)>,
}

impl Launcher {
    pub fn interpreter(program: impl Into<String>) -> Self {
        Self {
            interpreter: Some(program.into()),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, file: &Path) -> Command {
        let mut command = match &self.interpreter {
            Some(program) => {
                let mut command = Command::new(program);
                command.args(&self.args).arg(file);
                command
            }
            None => {
                let mut command = Command::new(file);
                command.args(&self.args);
                command
            }
        };
        command
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

struct Handle {
    pid: Option<u32>,
    stdin: Option<Arc<tokio::sync::Mutex<ChildStdin>>>,
    terminate: Option<oneshot::Sender<()>>,
}

struct TaskInner {
    state: TaskState,
    handle: Option<Handle>,
}

/// A worker process identified by its file stem.
pub struct Task {
    id: String,
    file: PathBuf,
    launcher: Launcher,
    inner: Arc<Mutex<TaskInner>>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl Task {
    pub fn new(file: impl Into<PathBuf>, launcher: Launcher) -> Self {
        let file = file.into();
        Self {
            id: file_stem(&file),
            file,
            launcher,
            inner: Arc::new(Mutex::new(TaskInner {
                state: TaskState::Idle,
                handle: None,
            })),
            events: None,
        }
    }

    /// Report messages and exits to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    /// OS process id while the process is alive.
    pub fn pid(&self) -> Option<u32> {
        self.lock().handle.as_ref().and_then(|h| h.pid)
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Spawn the process. Must be called from within a tokio runtime.
    pub fn run(&self) -> Result<(), TaskError> {
        let mut inner = self.lock();
        if inner.handle.is_some() {
            return Err(TaskError::AlreadyRunning {
                id: self.id.clone(),
            });
        }

        let mut child = self
            .launcher
            .command(&self.file)
            .spawn()
            .map_err(|source| {
                tracing::error!(task = %self.id, file = %self.file.display(), error = %source, "Task failed to start");
                TaskError::Spawn {
                    id: self.id.clone(),
                    source,
                }
            })?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .map(|stdin| Arc::new(tokio::sync::Mutex::new(stdin)));
        if let Some(stdout) = child.stdout.take() {
            self.spawn_stdout_reader(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            let id = self.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::error!(task = %id, "{}", line);
                }
            });
        }

        let (terminate_tx, terminate_rx) = oneshot::channel();
        inner.state = TaskState::Running;
        inner.handle = Some(Handle {
            pid,
            stdin,
            terminate: Some(terminate_tx),
        });
        drop(inner);

        tracing::info!(task = %self.id, pid = ?pid, "Task running");
        self.spawn_monitor(child, terminate_rx);
        Ok(())
    }

    /// Write `message` to the task's stdin as one JSON line.
    pub async fn send(&self, message: &serde_json::Value) -> Result<(), TaskError> {
        let stdin = {
            let inner = self.lock();
            match (&inner.state, inner.handle.as_ref().and_then(|h| h.stdin.clone())) {
                (TaskState::Running, Some(stdin)) => stdin,
                _ => {
                    return Err(TaskError::NotRunning {
                        id: self.id.clone(),
                    })
                }
            }
        };

        let mut line = serde_json::to_vec(message).map_err(|source| TaskError::Encode {
            id: self.id.clone(),
            source,
        })?;
        line.push(b'\n');

        let send_error = |source: io::Error| TaskError::Send {
            id: self.id.clone(),
            source,
        };
        let mut stdin = stdin.lock().await;
        stdin.write_all(&line).await.map_err(send_error)?;
        stdin.flush().await.map_err(send_error)
    }

    /// Request termination once. Never escalates.
    pub fn stop(&self) -> Result<(), TaskError> {
        let mut inner = self.lock();
        let terminate = inner.handle.as_mut().and_then(|h| h.terminate.take());
        match terminate {
            Some(terminate) => {
                inner.state = TaskState::Stopping;
                drop(inner);
                tracing::debug!(task = %self.id, "Stopping task");
                let _ = terminate.send(());
                Ok(())
            }
            // Already stopping counts as a delivered request.
            None if inner.state == TaskState::Stopping => Ok(()),
            None => Err(TaskError::NotRunning {
                id: self.id.clone(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().expect("task state mutex poisoned")
    }

    fn spawn_stdout_reader(&self, stdout: tokio::process::ChildStdout) {
        let id = self.id.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message = serde_json::from_str(&line)
                    .unwrap_or_else(|_| serde_json::Value::String(line));
                tracing::info!(task = %id, message = %message, "Task message");
                if let Some(events) = &events {
                    let _ = events.send(TaskEvent::Message {
                        id: id.clone(),
                        message,
                    });
                }
            }
        });
    }

    fn spawn_monitor(&self, mut child: Child, mut terminate_rx: oneshot::Receiver<()>) {
        let id = self.id.clone();
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();

        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = &mut terminate_rx => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(e) = terminate(&mut child) {
                        tracing::warn!(task = %id, error = %e, "Failed to signal task");
                    }
                    child.wait().await
                }
            };

            let code = match &status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::error!(task = %id, error = %e, "Failed to wait for task");
                    None
                }
            };

            {
                let mut inner = inner.lock().expect("task state mutex poisoned");
                inner.handle = None;
                inner.state = TaskState::Exited;
            }
            tracing::info!(task = %id, code = ?code, "Task stopped");

            if let Some(events) = events {
                let _ = events.send(TaskEvent::Exited { id, code });
            }
        });
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
