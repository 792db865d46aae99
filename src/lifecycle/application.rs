//! The runtime orchestrator.
//!
//! # State Machine
//! ```text
//! Unbooted ──boot()──▶ Booted ──listen()──▶ Listening ──stop()──▶ Stopping ──▶ Terminated
//! ```
//!
//! Only the first `stop()` tears down; later or concurrent calls return
//! their exit code once they see `Stopping` or `Terminated`.
//!
//! Every collaborator is resolved from the container, so applications
//! replace kernel defaults by registering over their keys before `boot()`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AppSettings;
use crate::container::{BoxError, Container};
use crate::http::{self, HttpApp, Middleware, MIDDLEWARE_TAG};
use crate::layout::{Directories, Root};
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::events::{Events, LifecycleEvent};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::lifecycle::startup::{self, BootedPhases};
use crate::models::Models;
use crate::socket::SocketServer;
use crate::tasks::TaskSupervisor;

const DEFAULT_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Unbooted,
    Booted,
    Listening,
    Stopping,
    Terminated,
}

/// A request for the application to stop, optionally caused by an error.
#[derive(Debug, Default)]
pub struct StopRequest {
    pub error: Option<BoxError>,
}

impl StopRequest {
    pub fn error(error: impl Into<BoxError>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }
}

pub struct Application {
    container: Container,
    events: Events,
    state: Mutex<AppState>,
    boot_started: AtomicBool,
    phases: Mutex<BootedPhases>,
    shutdown: Shutdown,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    stop_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StopRequest>>,
    server: Mutex<Option<JoinHandle<()>>>,
    signals: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    handle_signals: bool,
}

impl Application {
    /// Orchestrator over `container`, sharing its `events` service.
    pub fn new(container: Container) -> Self {
        let events = match container.resolve::<Events>("events") {
            Ok(events) => (*events).clone(),
            Err(_) => {
                let events = Events::new();
                container.set("events", events.clone());
                events
            }
        };
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();

        Self {
            container,
            events,
            state: Mutex::new(AppState::Unbooted),
            boot_started: AtomicBool::new(false),
            phases: Mutex::new(BootedPhases::default()),
            shutdown: Shutdown::new(),
            stop_tx,
            stop_rx: tokio::sync::Mutex::new(stop_rx),
            server: Mutex::new(None),
            signals: Mutex::new(None),
            local_addr: Mutex::new(None),
            handle_signals: true,
        }
    }

    /// Whether `boot()` installs SIGTERM/SIGINT handlers. Defaults to `true`.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn state(&self) -> AppState {
        *lock(&self.state)
    }

    pub fn phases(&self) -> BootedPhases {
        *lock(&self.phases)
    }

    /// Address bound by `listen()`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// Run the boot phases. Must be called from within a tokio runtime.
    ///
    /// Boot runs at most once; a second call fails even if the first failed.
    pub fn boot(&self) -> Result<(), LifecycleError> {
        if self.boot_started.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::BootAlreadyCompleted);
        }

        let name = self.container.resolve::<String>("name")?;
        let env = self.container.resolve::<String>("env")?;
        tracing::info!(app = %name, env = %env, "Booting application");
        self.container.resolve::<AppSettings>("settings")?;

        let phases = startup::boot_phases(&self.container, &self.events)?;
        *lock(&self.phases) = phases;

        if self.handle_signals {
            *lock(&self.signals) = Some(signals::install(self.stop_tx.clone()));
        }

        *lock(&self.state) = AppState::Booted;
        tracing::info!(app = %name, "Application booted");
        self.events.emit(&LifecycleEvent::Booted);
        Ok(())
    }

    /// Attach middleware, bind, and start serving, tasks and sockets.
    pub async fn listen(&self) -> Result<SocketAddr, LifecycleError> {
        match self.state() {
            AppState::Booted => {}
            AppState::Unbooted => return Err(LifecycleError::NotBooted),
            AppState::Listening | AppState::Stopping | AppState::Terminated => {
                return Err(LifecycleError::AlreadyListening)
            }
        }

        let settings = self.container.resolve::<AppSettings>("settings")?;
        let dirs = self.container.resolve::<Directories>("dirs")?;
        let app = self.container.resolve::<HttpApp>("http")?;
        let public = (settings.http.serve_static && dirs.has_files(Root::Public)?)
            .then(|| dirs.get(Root::Public).to_path_buf());
        let middleware = self.container.tagged_as::<Middleware>(MIDDLEWARE_TAG)?;
        let tasks = self.container.resolve::<TaskSupervisor>("tasks")?;
        let socket = if self.phases().socket {
            Some(self.container.resolve::<SocketServer>("socket")?)
        } else {
            None
        };

        let bind_address = settings.http.bind_address.clone();
        let listener = TcpListener::bind(&bind_address)
            .await
            .map_err(|source| LifecycleError::Bind {
                addr: bind_address,
                source,
            })?;
        let addr = listener.local_addr()?;

        // Nothing below fails, so a retried listen never layers twice.
        app.apply_deferred();
        if let Some(public) = &public {
            app.serve_static(public);
        }
        for (key, middleware) in &middleware {
            tracing::debug!(middleware = %key, "Applying middleware");
            app.apply(middleware);
        }

        let router = app.router();
        let shutdown = self.shutdown.wait();
        let requests = self.stop_tx.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = http::serve(listener, router, shutdown).await {
                tracing::error!(error = %e, "HTTP server failed");
                let _ = requests.send(StopRequest::error(e));
            }
        });
        *lock(&self.server) = Some(server);
        *lock(&self.local_addr) = Some(addr);

        tasks.start();
        if let Some(socket) = &socket {
            socket.start();
        }

        *lock(&self.state) = AppState::Listening;
        tracing::info!(address = %addr, "Application listening");
        self.events.emit(&LifecycleEvent::Listening { addr });
        Ok(addr)
    }

    /// Ask a pending [`wait`](Self::wait) to stop the application.
    pub fn request_stop(&self, error: Option<BoxError>) {
        let _ = self.stop_tx.send(StopRequest { error });
    }

    /// Block until a stop is requested, then stop. Returns the exit code.
    pub async fn wait(&self) -> i32 {
        let request = self.stop_rx.lock().await.recv().await;
        self.stop(request.and_then(|r| r.error)).await
    }

    /// Tear down in order: models, sockets, tasks, then the listener.
    ///
    /// Returns `1` when stopping because of `error`, `0` otherwise.
    pub async fn stop(&self, error: Option<BoxError>) -> i32 {
        let code = if error.is_some() { 1 } else { 0 };
        if let Some(e) = &error {
            tracing::error!(error = %e, "Stopping after error");
        }
        {
            let mut state = lock(&self.state);
            if matches!(*state, AppState::Stopping | AppState::Terminated) {
                tracing::debug!(state = ?*state, "Application already stopping");
                return code;
            }
            *state = AppState::Stopping;
        }

        tracing::info!("Stopping application");
        self.events.emit(&LifecycleEvent::Stopping);

        if self.container.is_resolved("models") {
            if let Ok(models) = self.container.resolve::<Models>("models") {
                models.close();
            }
        }
        if self.container.is_resolved("socket") {
            if let Ok(socket) = self.container.resolve::<SocketServer>("socket") {
                socket.close();
            }
        }
        if self.container.is_resolved("tasks") {
            if let Ok(supervisor) = self.container.resolve::<TaskSupervisor>("tasks") {
                supervisor.stop().await;
            }
        }

        self.shutdown.trigger();
        let server = lock(&self.server).take();
        if let Some(server) = server {
            let abort = server.abort_handle();
            if tokio::time::timeout(self.drain_period(), server).await.is_err() {
                tracing::warn!("HTTP server did not drain in time");
                abort.abort();
            }
        }
        if let Some(signals) = lock(&self.signals).take() {
            signals.abort();
        }

        *lock(&self.state) = AppState::Terminated;
        tracing::info!(code, "Application stopped");
        code
    }

    fn drain_period(&self) -> Duration {
        self.container
            .resolve::<AppSettings>("settings")
            .map(|settings| Duration::from_millis(settings.http.drain_ms))
            .unwrap_or(DEFAULT_DRAIN)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.state())
            .field("phases", &self.phases())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("application state mutex poisoned")
}
