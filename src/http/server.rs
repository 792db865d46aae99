//! HTTP application builder and server loop.
//!
//! # Responsibilities
//! - Accumulate routes mounted by `http/` modules during boot
//! - Apply tagged middleware in registration order on listen
//! - Optionally serve the public directory ahead of the routes
//! - Serve on a bound listener until shutdown is signalled

use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::http::middleware::Middleware;

/// Mutable router shared by boot phases and modules.
#[derive(Default)]
pub struct HttpApp {
    router: Mutex<Router>,
    deferred: Mutex<Vec<Middleware>>,
}

impl HttpApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the router with `f(router)`.
    ///
    /// Modules use this to add routes, nest routers or attach layers.
    pub fn mount<F>(&self, f: F)
    where
        F: FnOnce(Router) -> Router,
    {
        let mut router = self.lock();
        let current = std::mem::take(&mut *router);
        *router = f(current);
    }

    /// Add a single route.
    pub fn route(&self, path: &str, method_router: axum::routing::MethodRouter) {
        self.mount(|router| router.route(path, method_router));
    }

    /// Wrap every route mounted so far in `middleware`.
    pub fn apply(&self, middleware: &Middleware) {
        self.mount(|router| middleware.apply(router));
    }

    /// Queue `middleware` to wrap the complete route set, once every module
    /// has mounted its routes.
    pub fn defer(&self, middleware: Middleware) {
        self.deferred
            .lock()
            .expect("http deferred middleware mutex poisoned")
            .push(middleware);
    }

    /// Apply and clear the deferred middleware, in the order queued.
    pub fn apply_deferred(&self) {
        let deferred = std::mem::take(
            &mut *self
                .deferred
                .lock()
                .expect("http deferred middleware mutex poisoned"),
        );
        for middleware in &deferred {
            self.apply(middleware);
        }
    }

    /// Try files under `dir` first, falling through to the mounted routes.
    pub fn serve_static(&self, dir: &Path) {
        let dir = dir.to_path_buf();
        self.mount(|router| Router::new().fallback_service(ServeDir::new(dir).fallback(router)));
    }

    /// Snapshot of the router as it stands.
    pub fn router(&self) -> Router {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Router> {
        self.router.lock().expect("http router mutex poisoned")
    }
}

impl std::fmt::Debug for HttpApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApp").finish_non_exhaustive()
    }
}

/// Serve `router` on `listener` until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(address = %addr, "HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn body_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_routes_accumulate() {
        let app = HttpApp::new();
        app.route("/a", get(|| async { "a" }));
        app.mount(|router| router.route("/b", get(|| async { "b" })));

        assert_eq!(body_text(app.router(), "/a").await, (StatusCode::OK, "a".into()));
        assert_eq!(body_text(app.router(), "/b").await, (StatusCode::OK, "b".into()));
        assert_eq!(body_text(app.router(), "/c").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deferred_middleware_covers_later_routes() {
        let app = HttpApp::new();
        app.defer(Middleware::new(|router| {
            router.layer(axum::Extension(String::from("shared")))
        }));
        app.route(
            "/ext",
            get(|axum::Extension(value): axum::Extension<String>| async move { value }),
        );
        app.apply_deferred();

        assert_eq!(
            body_text(app.router(), "/ext").await,
            (StatusCode::OK, "shared".into())
        );
    }

    #[tokio::test]
    async fn test_static_files_take_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("robots.txt"), "static").unwrap();

        let app = HttpApp::new();
        app.route("/robots.txt", get(|| async { "route" }));
        app.route("/dynamic", get(|| async { "route" }));
        app.serve_static(tmp.path());

        assert_eq!(
            body_text(app.router(), "/robots.txt").await,
            (StatusCode::OK, "static".into())
        );
        assert_eq!(
            body_text(app.router(), "/dynamic").await,
            (StatusCode::OK, "route".into())
        );
    }
}
