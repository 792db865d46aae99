//! Process entry helpers shared by the `hearth` binary and embedders.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{AppSettings, LogConfig};
use crate::container::Container;
use crate::kernel;
use crate::layout::{Directories, Root};
use crate::lifecycle::Application;
use crate::observability::logging;

/// Kernel container plus an orchestrator over it, ready for `run`.
///
/// `configure` runs after the kernel registrations, so it can override any of
/// them and register the application's own modules.
pub fn application<F>(name: &str, root: impl Into<PathBuf>, env: &str, configure: F) -> Application
where
    F: FnOnce(&Container),
{
    let container = kernel::container(name, root, env);
    configure(&container);
    Application::new(container)
}

/// Boot, listen, then block until stopped. Returns the process exit code.
pub async fn run(app: &Application) -> i32 {
    if let Err(e) = app.boot() {
        tracing::error!(error = %e, "Boot failed");
        return 1;
    }
    if let Err(e) = app.listen().await {
        return app.stop(Some(e.into())).await;
    }
    app.wait().await
}

/// Install logging from the application's `log` settings.
///
/// Falls back to the defaults when the configuration cannot be loaded; the
/// load error then surfaces again from `boot()`.
pub fn init_logging(container: &Container) -> Option<WorkerGuard> {
    let (config, logs) = match (
        container.resolve::<AppSettings>("settings"),
        container.resolve::<Directories>("dirs"),
    ) {
        (Ok(settings), Ok(dirs)) => (settings.log.clone(), dirs.get(Root::Logs).to_path_buf()),
        _ => (LogConfig::default(), PathBuf::from(Root::Logs.as_str())),
    };

    match logging::init(&config, &logs) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("hearth: failed to initialize logging: {}", e);
            None
        }
    }
}
