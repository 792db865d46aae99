//! Template globals registry.
//!
//! Rendering is left to whichever engine the application brings; this
//! collaborator only knows where the views live and which values every
//! template should see. Once attached, handlers reach it through
//! `Extension<Arc<Templates>>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use axum::Extension;

use crate::container::Instance;
use crate::http::{HttpApp, Middleware};
use crate::tree::Value;

/// Container tag for values published as template globals.
pub const GLOBAL_TAG: &str = "template.global";

pub struct Templates {
    views: PathBuf,
    globals: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl Templates {
    pub fn new(views: impl Into<PathBuf>) -> Self {
        Self {
            views: views.into(),
            globals: RwLock::new(BTreeMap::new()),
        }
    }

    /// Directory holding the view files.
    pub fn views(&self) -> &Path {
        &self.views
    }

    pub fn set_global(&self, name: impl Into<String>, value: serde_json::Value) {
        self.globals
            .write()
            .expect("template globals lock poisoned")
            .insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<serde_json::Value> {
        self.globals
            .read()
            .expect("template globals lock poisoned")
            .get(name)
            .cloned()
    }

    /// All globals, ordered by name.
    pub fn globals(&self) -> BTreeMap<String, serde_json::Value> {
        self.globals.read().expect("template globals lock poisoned").clone()
    }

    /// Publish a container instance under `name`.
    ///
    /// Configuration trees, strings and JSON values are understood; anything
    /// else is skipped with a warning. Returns whether the value was published.
    pub fn publish(&self, name: &str, instance: &Instance) -> bool {
        let value = if let Some(tree) = instance.downcast_ref::<Value>() {
            serde_json::to_value(tree).ok()
        } else if let Some(text) = instance.downcast_ref::<String>() {
            Some(serde_json::Value::String(text.clone()))
        } else if let Some(json) = instance.downcast_ref::<serde_json::Value>() {
            Some(json.clone())
        } else {
            None
        };

        match value {
            Some(value) => {
                self.set_global(name, value);
                true
            }
            None => {
                tracing::warn!(global = %name, "Template global has an unsupported type");
                false
            }
        }
    }

    /// Make this registry available to every route of `http`.
    pub fn attach(self: &Arc<Self>, http: &HttpApp) {
        let templates = Arc::clone(self);
        http.defer(Middleware::new(move |router| {
            router.layer(Extension(Arc::clone(&templates)))
        }));
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("views", &self.views)
            .field("globals", &self.globals().keys().collect::<Vec<_>>())
            .finish()
    }
}
