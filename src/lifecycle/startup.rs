//! Boot phases.
//!
//! # Order
//! ```text
//! templates (views/)  → publish `template.global` services, attach registry
//! models    (models/) → only with a `config.orm` section
//! http      (http/)   → route modules, `catchall` last
//! socket    (socket/) → mount acceptor, per-connection module loader
//! tasks     (tasks/)  → register task files with the supervisor
//! ```
//!
//! A phase whose directory has no files is skipped without an event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::container::Container;
use crate::http::HttpApp;
use crate::layout::{file_stem, Directories, Modules};
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::events::{Events, LifecycleEvent, Phase};
use crate::models::Models;
use crate::socket::{SocketConnection, SocketServer};
use crate::tasks::TaskSupervisor;
use crate::templates::{Templates, GLOBAL_TAG};

/// Stem of the route module loaded after every other one.
pub const CATCHALL: &str = "catchall";

/// Which phases ran during boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootedPhases {
    pub templates: bool,
    pub models: bool,
    pub http: bool,
    pub socket: bool,
    pub tasks: bool,
}

impl BootedPhases {
    pub fn contains(&self, phase: Phase) -> bool {
        match phase {
            Phase::Templates => self.templates,
            Phase::Models => self.models,
            Phase::Http => self.http,
            Phase::Socket => self.socket,
            Phase::Tasks => self.tasks,
        }
    }

    fn insert(&mut self, phase: Phase) {
        match phase {
            Phase::Templates => self.templates = true,
            Phase::Models => self.models = true,
            Phase::Http => self.http = true,
            Phase::Socket => self.socket = true,
            Phase::Tasks => self.tasks = true,
        }
    }
}

/// Run every boot phase in order, emitting `booted.<phase>` for each that ran.
pub fn boot_phases(container: &Container, events: &Events) -> Result<BootedPhases, LifecycleError> {
    let dirs = container.resolve::<Directories>("dirs")?;
    let http = container.resolve::<HttpApp>("http")?;
    let mut booted = BootedPhases::default();

    for phase in Phase::ALL {
        let files = dirs.files(phase.root())?;
        if files.is_empty() {
            tracing::debug!(phase = %phase, "Phase skipped, no files");
            continue;
        }

        let ran = match phase {
            Phase::Templates => boot_templates(container, &http)?,
            Phase::Models => boot_models(container, &files)?,
            Phase::Http => boot_http(container, &http, files.clone())?,
            Phase::Socket => boot_socket(container, &http, files.clone())?,
            Phase::Tasks => boot_tasks(container, &files)?,
        };
        if ran {
            booted.insert(phase);
            tracing::info!(phase = %phase, files = files.len(), "Phase booted");
            events.emit(&LifecycleEvent::PhaseBooted(phase));
        }
    }

    Ok(booted)
}

fn boot_templates(container: &Container, http: &HttpApp) -> Result<bool, LifecycleError> {
    let templates = container.resolve::<Templates>("templates")?;
    for (key, instance) in container.tagged(GLOBAL_TAG)? {
        templates.publish(&key, &instance);
    }
    templates.attach(http);
    Ok(true)
}

fn boot_models(container: &Container, files: &[PathBuf]) -> Result<bool, LifecycleError> {
    if container.resolve_path("config.orm")?.is_none() {
        tracing::info!("No orm configuration, models not loaded");
        return Ok(false);
    }

    let models = container.resolve::<Models>("models")?;
    let modules = container.resolve::<Modules<Models>>("models.modules")?;
    for file in files {
        load(&modules, file, &*models, container)?;
    }
    Ok(true)
}

fn boot_http(
    container: &Container,
    http: &HttpApp,
    files: Vec<PathBuf>,
) -> Result<bool, LifecycleError> {
    let modules = container.resolve::<Modules<HttpApp>>("http.modules")?;
    for file in catchall_last(files) {
        load(&modules, &file, http, container)?;
    }
    Ok(true)
}

fn boot_socket(
    container: &Container,
    http: &HttpApp,
    files: Vec<PathBuf>,
) -> Result<bool, LifecycleError> {
    let socket = container.resolve::<SocketServer>("socket")?;
    let modules = container.resolve::<Modules<SocketConnection>>("socket.modules")?;
    socket.mount(http);

    let container = container.clone();
    socket.set_loader(move |conn| {
        for file in &files {
            modules.load(file, conn, &container)?;
        }
        Ok(())
    });
    Ok(true)
}

fn boot_tasks(container: &Container, files: &[PathBuf]) -> Result<bool, LifecycleError> {
    let supervisor = container.resolve::<TaskSupervisor>("tasks")?;
    for file in files {
        supervisor.add(file);
    }
    Ok(true)
}

fn load<T>(
    modules: &Arc<Modules<T>>,
    file: &Path,
    target: &T,
    container: &Container,
) -> Result<(), LifecycleError> {
    modules
        .load(file, target, container)
        .map(|_| ())
        .map_err(|source| LifecycleError::Module {
            file: file.to_path_buf(),
            source,
        })
}

/// Directory order, with `catchall` moved to the end.
fn catchall_last(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let (mut ordered, catchall): (Vec<_>, Vec<_>) =
        files.into_iter().partition(|f| file_stem(f) != CATCHALL);
    ordered.extend(catchall);
    ordered
}
