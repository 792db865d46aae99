//! Model registry.
//!
//! Holds the opaque `orm` configuration section and the definitions that
//! `models/` modules register against it. Query building belongs to the
//! application's ORM; the kernel only needs to know the registry exists and
//! when to close it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::tree::Value;

pub struct Models {
    orm: Option<Value>,
    definitions: RwLock<BTreeMap<String, Value>>,
    closed: AtomicBool,
}

impl Models {
    pub fn new(orm: Option<Value>) -> Self {
        Self {
            orm,
            definitions: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The `orm` configuration section, when present.
    pub fn orm(&self) -> Option<&Value> {
        self.orm.as_ref()
    }

    /// Register (or replace) the definition of model `name`.
    pub fn define(&self, name: impl Into<String>, definition: Value) {
        let name = name.into();
        tracing::debug!(model = %name, "Model defined");
        self.definitions
            .write()
            .expect("model registry lock poisoned")
            .insert(name, definition);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.definitions
            .read()
            .expect("model registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions
            .read()
            .expect("model registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Release the registry. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(models = self.names().len(), "Models closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Models")
            .field("names", &self.names())
            .field("closed", &self.is_closed())
            .finish()
    }
}
