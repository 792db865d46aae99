//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! boot: http/ modules → HttpApp::mount (routes, catchall last)
//! listen: tagged middleware → HttpApp::apply (registration order)
//!     → optional public/ static files
//!     → server.rs serve(listener) until shutdown
//! ```

pub mod middleware;
pub mod server;

pub use middleware::{Middleware, MIDDLEWARE_TAG, SYSTEM_ERROR, X_REQUEST_ID};
pub use server::{serve, HttpApp};
