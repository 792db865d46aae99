//! OS signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) are turned into a stop request;
//! the application's `wait()` picks it up and runs the ordered stop.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::application::StopRequest;

/// Spawn a listener that sends one [`StopRequest`] per received signal.
///
/// Must be called from within a tokio runtime. Abort the handle to uninstall.
pub fn install(requests: mpsc::UnboundedSender<StopRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match next_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "Received signal, stopping");
                    if requests.send(StopRequest::default()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Signal handler error");
                    break;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
