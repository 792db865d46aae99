//! Code registered against convention files.
//!
//! A convention directory (`http/`, `socket/`, `models/`) decides *which*
//! modules load and in *what order*; the code for each file is registered
//! ahead of time under the file's stem.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::container::{BoxError, Container};
use crate::layout::directories::file_stem;

/// Loader invoked for one convention file.
pub type Module<T> = Arc<dyn Fn(&T, &Container) -> Result<(), BoxError> + Send + Sync>;

/// Outcome of loading one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// No module is registered under the file's stem.
    Unregistered,
}

/// File-stem → module table.
pub struct Modules<T> {
    modules: HashMap<String, Module<T>>,
}

impl<T> Modules<T> {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Register `module` for files whose stem is `name`.
    pub fn with<F>(mut self, name: impl Into<String>, module: F) -> Self
    where
        F: Fn(&T, &Container) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Module<T>> {
        self.modules.get(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run the module registered for `file` against `target`.
    pub fn load(&self, file: &Path, target: &T, container: &Container) -> Result<LoadOutcome, BoxError> {
        let name = file_stem(file);
        match self.modules.get(&name) {
            Some(module) => {
                module(target, container)?;
                Ok(LoadOutcome::Loaded)
            }
            None => {
                tracing::warn!(file = %file.display(), module = %name, "No module registered for file");
                Ok(LoadOutcome::Unregistered)
            }
        }
    }
}

impl<T> Default for Modules<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Modules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.modules.keys().collect();
        names.sort();
        f.debug_struct("Modules").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_load_by_file_stem() {
        let modules = Modules::<Mutex<Vec<String>>>::new()
            .with("home", |log, _| {
                log.lock().unwrap().push("home".into());
                Ok(())
            })
            .with("broken", |_, _| Err("bad module".into()));
        let container = Container::new();
        let log = Mutex::new(Vec::new());

        let outcome = modules.load(Path::new("/app/http/home.rs"), &log, &container).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(*log.lock().unwrap(), vec!["home".to_string()]);

        let outcome = modules.load(Path::new("/app/http/other.rs"), &log, &container).unwrap();
        assert_eq!(outcome, LoadOutcome::Unregistered);

        let err = modules.load(Path::new("/app/http/broken.rs"), &log, &container).unwrap_err();
        assert_eq!(err.to_string(), "bad module");
    }
}
