//! Supervision of all task processes of an application.
//!
//! # Responsibilities
//! - Keep the ordered list of task files
//! - Start one [`Task`] per file and track the active ones
//! - Count running tasks; the count drops exactly once per exit
//! - Stop everything with a bounded wait
//!
//! Exits and messages from every task flow through one channel into a
//! collector that updates the active map and counter before re-broadcasting
//! the event to subscribers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::TasksConfig;
use crate::layout::file_stem;
use crate::tasks::task::{Launcher, Task, TaskError, TaskEvent};

/// Bounded wait used by [`TaskSupervisor::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_polls: 10,
        }
    }
}

impl From<&TasksConfig> for StopPolicy {
    fn from(config: &TasksConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.stop_poll_interval_ms),
            max_polls: config.stop_max_polls,
        }
    }
}

type ActiveTasks = Arc<Mutex<HashMap<String, Arc<Task>>>>;

/// Spawns, tracks and stops the task processes of one application.
pub struct TaskSupervisor {
    files: Mutex<Vec<PathBuf>>,
    launcher: Launcher,
    policy: StopPolicy,
    active: ActiveTasks,
    running: Arc<AtomicUsize>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskEvent>>>,
    broadcast: broadcast::Sender<TaskEvent>,
}

impl TaskSupervisor {
    pub fn new(launcher: Launcher, policy: StopPolicy) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (broadcast, _) = broadcast::channel(64);
        Self {
            files: Mutex::new(Vec::new()),
            launcher,
            policy,
            active: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicUsize::new(0)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            broadcast,
        }
    }

    /// Supervisor configured from the `tasks` settings section.
    pub fn from_config(config: &TasksConfig, envs: Vec<(String, String)>) -> Self {
        let launcher = Launcher {
            interpreter: config.interpreter.clone(),
            args: config.args.clone(),
            envs,
        };
        Self::new(launcher, StopPolicy::from(config))
    }

    /// Append a task file. Takes effect on the next [`start`](Self::start).
    pub fn add(&self, file: impl Into<PathBuf>) {
        self.files.lock().expect("task file list mutex poisoned").push(file.into());
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files.lock().expect("task file list mutex poisoned").clone()
    }

    /// Number of tasks that have started and not yet exited.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> StopPolicy {
        self.policy
    }

    /// Ids of tasks currently tracked as active.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active_map().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &str) -> Option<Arc<Task>> {
        self.active_map().get(id).cloned()
    }

    /// Receive task messages and exits. Subscribe before `start` to see every event.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.broadcast.subscribe()
    }

    /// Forward `message` to the active task `id`.
    pub async fn send(&self, id: &str, message: &serde_json::Value) -> Result<(), TaskError> {
        let task = self.get(id).ok_or_else(|| TaskError::NotRunning { id: id.to_string() })?;
        task.send(message).await
    }

    /// Run every registered task file. Returns how many processes started.
    ///
    /// A file that fails to spawn is logged and skipped.
    pub fn start(&self) -> usize {
        self.spawn_collector();

        let mut started = 0;
        for file in self.files() {
            match self.start_one(&file) {
                Ok(()) => started += 1,
                Err(e) => tracing::error!(file = %file.display(), error = %e, "Task not started"),
            }
        }

        tracing::info!(started, running = self.running(), "Task supervisor started");
        started
    }

    fn start_one(&self, file: &Path) -> Result<(), TaskError> {
        let id = file_stem(file);
        let mut active = self.active_map();
        if active.contains_key(&id) {
            return Err(TaskError::AlreadyRunning { id });
        }

        let task = Arc::new(
            Task::new(file, self.launcher.clone()).with_events(self.events_tx.clone()),
        );
        self.running.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = task.run() {
            self.running.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        active.insert(id, task);
        Ok(())
    }

    /// Request every active task to stop, then wait for the running count to
    /// reach zero. Returns `false` when the poll budget ran out first.
    pub async fn stop(&self) -> bool {
        let tasks: Vec<Arc<Task>> = self.active_map().values().cloned().collect();
        for task in &tasks {
            if let Err(e) = task.stop() {
                tracing::debug!(task = %task.id(), error = %e, "Stop request skipped");
            }
        }

        let stopped = self.wait_until_stopped().await;
        if stopped {
            tracing::info!("All tasks stopped");
        } else {
            tracing::warn!(
                running = self.running(),
                waited_ms = self.policy.poll_interval.as_millis() as u64 * self.policy.max_polls as u64,
                "Tasks still running after stop timeout"
            );
        }
        stopped
    }

    async fn wait_until_stopped(&self) -> bool {
        for _ in 0..self.policy.max_polls {
            if self.running() == 0 {
                return true;
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
        self.running() == 0
    }

    fn active_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Task>>> {
        self.active.lock().expect("active task map mutex poisoned")
    }

    fn spawn_collector(&self) {
        let Some(mut events_rx) = self
            .events_rx
            .lock()
            .expect("task event receiver mutex poisoned")
            .take()
        else {
            return;
        };

        let active = Arc::clone(&self.active);
        let running = Arc::clone(&self.running);
        let broadcast = self.broadcast.clone();

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let TaskEvent::Exited { id, .. } = &event {
                    let removed = active.lock().expect("active task map mutex poisoned").remove(id);
                    // Only exits of tasks this supervisor started are counted.
                    if removed.is_some() {
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                let _ = broadcast.send(event);
            }
        });
    }
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("files", &self.files())
            .field("running", &self.running())
            .field("policy", &self.policy)
            .finish()
    }
}
