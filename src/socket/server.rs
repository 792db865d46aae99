//! Websocket acceptor mounted on the HTTP application.
//!
//! # Responsibilities
//! - Mount the upgrade route on the application router
//! - Refuse upgrades until started and after close (503)
//! - Run the per-connection loader, then pump frames in both directions
//! - Close every open connection on shutdown

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::container::BoxError;
use crate::http::HttpApp;
use crate::socket::connection::SocketConnection;

/// Runs once per accepted connection, before any frame is read.
pub type ConnectionLoader = Arc<dyn Fn(&SocketConnection) -> Result<(), BoxError> + Send + Sync>;

/// Accepts websocket clients on a single route.
pub struct SocketServer {
    path: String,
    accepting: AtomicBool,
    loader: RwLock<Option<ConnectionLoader>>,
    connections: Arc<AtomicUsize>,
    closed: watch::Sender<bool>,
}

impl SocketServer {
    pub fn new(path: impl Into<String>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            path: path.into(),
            accepting: AtomicBool::new(false),
            loader: RwLock::new(None),
            connections: Arc::new(AtomicUsize::new(0)),
            closed,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Set the code run for each new connection.
    pub fn set_loader<F>(&self, loader: F)
    where
        F: Fn(&SocketConnection) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        *self.loader.write().expect("socket loader lock poisoned") = Some(Arc::new(loader));
    }

    /// Add the upgrade route to `http`.
    pub fn mount(self: &Arc<Self>, http: &HttpApp) {
        let routes = Router::new()
            .route(&self.path, get(upgrade))
            .with_state(Arc::clone(self));
        http.mount(|router| router.merge(routes));
        tracing::debug!(path = %self.path, "Socket route mounted");
    }

    /// Begin accepting upgrades.
    pub fn start(&self) {
        self.closed.send_replace(false);
        self.accepting.store(true, Ordering::SeqCst);
        tracing::info!(path = %self.path, "Socket server accepting connections");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Number of open connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting and close every open connection.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
        tracing::info!(open = self.connections(), "Socket server closed");
    }

    async fn handle(self: Arc<Self>, socket: WebSocket) {
        let _guard = ConnectionGuard::new(Arc::clone(&self.connections));
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let conn = SocketConnection::new(outgoing_tx);
        let id = conn.id();
        tracing::info!(connection_id = %id, "Socket connection opened");

        let loader = self.loader.read().expect("socket loader lock poisoned").clone();
        if let Some(loader) = loader {
            if let Err(e) = loader(&conn) {
                tracing::error!(connection_id = %id, error = %e, "Socket modules failed to load");
            }
        }

        let (mut sink, mut stream) = socket.split();
        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        let mut closed = self.closed.subscribe();
        loop {
            tokio::select! {
                _ = closed.wait_for(|closed| *closed) => {
                    conn.close();
                    break;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => conn.dispatch(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %id, error = %e, "Socket read failed");
                        break;
                    }
                },
            }
        }

        drop(conn);
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            tracing::debug!(connection_id = %id, "Socket writer did not finish");
        }
        tracing::info!(connection_id = %id, "Socket connection closed");
    }
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("path", &self.path)
            .field("accepting", &self.is_accepting())
            .field("connections", &self.connections())
            .finish()
    }
}

async fn upgrade(
    State(server): State<Arc<SocketServer>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !server.is_accepting() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Socket server is not accepting connections")
            .into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| server.handle(socket)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Keeps the open-connection count; decrements on drop.
struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(connections: Arc<AtomicUsize>) -> Self {
        connections.fetch_add(1, Ordering::SeqCst);
        Self { connections }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_refuses_upgrade_until_started() {
        let server = Arc::new(SocketServer::new("/socket"));
        let http = HttpApp::new();
        server.mount(&http);
        assert!(!server.is_accepting());

        let request = Request::builder()
            .uri("/socket")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let response = http.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        server.start();
        assert!(server.is_accepting());
        server.close();
        assert!(!server.is_accepting());
    }
}
