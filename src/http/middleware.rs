//! Router-wide middleware registered in the container.
//!
//! Services tagged `http.middleware` resolve to [`Middleware`] and are applied
//! to the application router in registration order when it starts listening;
//! the last one registered ends up outermost.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Container tag collecting router middleware.
pub const MIDDLEWARE_TAG: &str = "http.middleware";

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body sent in place of a crashed handler's response.
pub const SYSTEM_ERROR: &str = "System Error";

/// A router transformation, usually one or more `.layer(...)` calls.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Router) -> Router + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, router: Router) -> Router {
        (self.0)(router)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Assign a UUID `x-request-id` to requests lacking one and echo it back.
pub fn request_id() -> Middleware {
    Middleware::new(|router| {
        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    })
}

/// Per-request tracing spans.
pub fn trace() -> Middleware {
    Middleware::new(|router| router.layer(TraceLayer::new_for_http()))
}

/// Fail requests that take longer than `timeout` with `408 Request Timeout`.
pub fn timeout(timeout: Duration) -> Middleware {
    Middleware::new(move |router| {
        router.layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
    })
}

/// Turn handler panics into `500` responses and log every `5xx`.
///
/// The `500` body is `{"error":"System Error"}` when the request was sent
/// as `application/json`, plain text otherwise.
pub fn errors() -> Middleware {
    Middleware::new(|router| {
        router
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(axum::middleware::from_fn(log_server_errors))
    })
}

/// Marks a response produced for a panicking handler.
#[derive(Debug, Clone, Copy)]
struct HandlerPanicked;

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %message, "Request handler panicked");

    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(HandlerPanicked);
    response
}

async fn log_server_errors(request: Request, next: Next) -> Response {
    let wants_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();
    if !status.is_server_error() {
        return response;
    }
    tracing::error!(method = %method, uri = %uri, status = status.as_u16(), "Request failed");

    if response.extensions().get::<HandlerPanicked>().is_none() {
        return response;
    }
    if wants_json {
        (status, Json(serde_json::json!({ "error": SYSTEM_ERROR }))).into_response()
    } else {
        (status, SYSTEM_ERROR).into_response()
    }
}
