//! Service registry and lazy resolver.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::container::error::{BoxError, ContainerError};
use crate::tree::{self, Value, PATH_SEPARATOR};

/// A constructed service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance, BoxError> + Send + Sync>;

type Hook = Box<dyn FnOnce(&Instance) + Send>;

/// How an entry produces its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Stored as given at registration.
    Value,
    /// Built on first resolution, then memoized.
    Factory,
}

/// A service definition passed to [`Container::register`].
pub enum Service {
    Value(Instance),
    Factory(FactoryFn),
}

impl Service {
    /// Wrap a ready-made value.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Service::Value(Arc::new(value))
    }

    /// Wrap a factory invoked with the container on first resolution.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Service::Factory(Arc::new(move |container| {
            factory(container).map(|service| Arc::new(service) as Instance)
        }))
    }

    pub fn kind(&self) -> ServiceKind {
        match self {
            Service::Value(_) => ServiceKind::Value,
            Service::Factory(_) => ServiceKind::Factory,
        }
    }
}

/// A registered service.
pub struct ServiceEntry {
    key: String,
    kind: ServiceKind,
    tags: Vec<String>,
    factory: Option<FactoryFn>,
    instance: Option<Instance>,
    /// Thread running the factory; re-entry from that thread is a cycle.
    resolving: Option<ThreadId>,
    /// Whether the first-resolution listeners have been handed the instance.
    announced: bool,
}

impl ServiceEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_resolved(&self) -> bool {
        self.instance.is_some()
    }
}

#[derive(Default)]
struct Inner {
    entries: DashMap<String, ServiceEntry>,
    /// Tag → keys in registration order.
    tags: RwLock<HashMap<String, Vec<String>>>,
    /// Listeners waiting for a key's first resolution.
    hooks: Mutex<HashMap<String, Vec<Hook>>>,
    /// Signalled whenever a factory finishes.
    resolved: (Mutex<()>, Condvar),
}

/// Named service registry with memoized lazy construction and tag groups.
///
/// Cloning is cheap and every clone shares the same registry, so the
/// container can be handed to request handlers and background tasks. A
/// factory is never invoked while any internal lock is held, which lets
/// factories resolve their own dependencies. A caller on another thread that
/// asks for a key whose factory is already running waits for that result.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `key`, replacing any previous entry.
    ///
    /// A replaced entry loses its tag memberships; the key is appended to
    /// each of the new `tags` as the most recent registration.
    pub fn register(&self, key: impl Into<String>, service: Service, tags: &[&str]) -> &Self {
        let key = key.into();
        let kind = service.kind();
        let mut entry_tags: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !entry_tags.iter().any(|t| t == tag) {
                entry_tags.push(tag.to_string());
            }
        }

        let (factory, instance) = match service {
            Service::Value(instance) => (None, Some(instance)),
            Service::Factory(factory) => (Some(factory), None),
        };
        let entry = ServiceEntry {
            key: key.clone(),
            kind,
            tags: entry_tags.clone(),
            factory,
            instance,
            resolving: None,
            announced: false,
        };

        let previous = self.inner.entries.insert(key.clone(), entry);

        let mut index = self.tag_index();
        if let Some(previous) = previous {
            tracing::debug!(key = %key, "Service re-registered, previous entry replaced");
            for tag in previous.tags {
                if let Some(keys) = index.get_mut(&tag) {
                    keys.retain(|k| k != &key);
                }
            }
        }
        for tag in entry_tags {
            index.entry(tag).or_default().push(key.clone());
        }

        tracing::trace!(key = %key, kind = ?kind, "Service registered");
        self
    }

    /// Register a value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> &Self {
        self.register(key, Service::value(value), &[])
    }

    /// Register a value under one or more tags.
    pub fn set_tagged<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        tags: &[&str],
        value: T,
    ) -> &Self {
        self.register(key, Service::value(value), tags)
    }

    /// Register a lazily constructed singleton.
    pub fn factory<T, F>(&self, key: impl Into<String>, factory: F) -> &Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(key, Service::factory(factory), &[])
    }

    /// Register a lazily constructed singleton under one or more tags.
    pub fn factory_tagged<T, F>(&self, key: impl Into<String>, tags: &[&str], factory: F) -> &Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(key, Service::factory(factory), tags)
    }

    /// Resolve `key` as a `T`.
    ///
    /// An unregistered dotted key (`config.http.port`) resolves the prefix
    /// before the first separator and looks the remainder up inside it; the
    /// prefix must hold a [`Value`] tree and `T` must then be [`Value`].
    pub fn resolve<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ContainerError> {
        let instance = if self.contains(key) {
            self.instance(key)?
        } else {
            match self.lookup_nested(key)? {
                Some(value) => Arc::new(value) as Instance,
                None => return Err(ContainerError::ServiceNotFound(key.to_string())),
            }
        };

        instance.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Resolve a tree value, allowing the path to be absent.
    ///
    /// Returns `Ok(None)` when the prefix exists but the nested path does
    /// not; `ServiceNotFound` when the prefix itself is unregistered.
    pub fn resolve_path(&self, key: &str) -> Result<Option<Value>, ContainerError> {
        if self.contains(key) {
            let instance = self.instance(key)?;
            return instance
                .downcast_ref::<Value>()
                .cloned()
                .map(Some)
                .ok_or_else(|| ContainerError::TypeMismatch {
                    key: key.to_string(),
                    expected: type_name::<Value>(),
                });
        }
        self.lookup_nested(key)
    }

    /// Resolve the untyped instance registered under `key`.
    pub fn instance(&self, key: &str) -> Result<Instance, ContainerError> {
        let current = thread::current().id();
        let factory = loop {
            let mut entry = self
                .inner
                .entries
                .get_mut(key)
                .ok_or_else(|| ContainerError::ServiceNotFound(key.to_string()))?;

            if let Some(instance) = entry.instance.clone() {
                let first = !std::mem::replace(&mut entry.announced, true);
                drop(entry);
                if first {
                    self.announce(key, &instance);
                }
                return Ok(instance);
            }

            let owner = entry.resolving;
            match owner {
                Some(owner) if owner == current => {
                    tracing::error!(key = %key, "Circular dependency detected");
                    return Err(ContainerError::CircularDependency {
                        key: key.to_string(),
                    });
                }
                Some(_) => {
                    drop(entry);
                    self.wait_for(key);
                }
                None => {
                    let Some(factory) = entry.factory.clone() else {
                        return Err(ContainerError::ServiceNotFound(key.to_string()));
                    };
                    entry.resolving = Some(current);
                    break factory;
                }
            }
        };

        let result = factory(self);

        let stored = match self.inner.entries.get_mut(key) {
            Some(mut entry) => {
                entry.resolving = None;
                match &result {
                    Ok(instance) if entry.instance.is_none() => {
                        entry.instance = Some(instance.clone());
                        entry.announced = true;
                        true
                    }
                    _ => false,
                }
            }
            None => false,
        };
        self.notify_resolved();

        match result {
            Ok(instance) => {
                tracing::trace!(key = %key, "Service constructed");
                if stored {
                    self.announce(key, &instance);
                }
                Ok(instance)
            }
            Err(source) => Err(factory_error(key, source)),
        }
    }

    /// Call `listener` with the instance the first time `key` resolves.
    ///
    /// Fires for values and factories alike, outside every internal lock.
    /// Listeners added after that first resolution are never called.
    pub fn on<T, F>(&self, key: impl Into<String>, listener: F) -> &Self
    where
        T: Any + Send + Sync,
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        let key = key.into();
        let name = key.clone();
        let hook: Hook = Box::new(move |instance: &Instance| {
            match instance.clone().downcast::<T>() {
                Ok(service) => listener(service),
                Err(_) => tracing::warn!(
                    key = %name,
                    expected = type_name::<T>(),
                    "Resolution listener skipped, type mismatch"
                ),
            }
        });
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(hook);
        self
    }

    /// Resolve every service tagged `tag`, in registration order.
    pub fn tagged(&self, tag: &str) -> Result<Vec<(String, Instance)>, ContainerError> {
        self.keys_by_tag(tag)
            .into_iter()
            .map(|key| self.instance(&key).map(|instance| (key, instance)))
            .collect()
    }

    /// Resolve every service tagged `tag` as a `T`, in registration order.
    pub fn tagged_as<T: Any + Send + Sync>(
        &self,
        tag: &str,
    ) -> Result<Vec<(String, Arc<T>)>, ContainerError> {
        self.keys_by_tag(tag)
            .into_iter()
            .map(|key| self.resolve::<T>(&key).map(|service| (key, service)))
            .collect()
    }

    /// Visit every service tagged `tag` as `(instance, key)`, in registration order.
    pub fn each_tagged<T, F>(&self, tag: &str, mut visitor: F) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
        F: FnMut(Arc<T>, &str),
    {
        for key in self.keys_by_tag(tag) {
            let service = self.resolve::<T>(&key)?;
            visitor(service, &key);
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Whether `key` has an instance (values always do).
    pub fn is_resolved(&self, key: &str) -> bool {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.is_resolved())
            .unwrap_or(false)
    }

    pub fn kind(&self, key: &str) -> Option<ServiceKind> {
        self.inner.entries.get(key).map(|entry| entry.kind())
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Keys registered under `tag`, in registration order.
    pub fn keys_by_tag(&self, tag: &str) -> Vec<String> {
        self.inner
            .tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    fn lookup_nested(&self, key: &str) -> Result<Option<Value>, ContainerError> {
        let Some((prefix, rest)) = key.split_once(PATH_SEPARATOR) else {
            return Err(ContainerError::ServiceNotFound(key.to_string()));
        };
        if !self.contains(prefix) {
            return Err(ContainerError::ServiceNotFound(key.to_string()));
        }

        let root = self.instance(prefix)?;
        let tree = root
            .downcast_ref::<Value>()
            .ok_or_else(|| ContainerError::TypeMismatch {
                key: prefix.to_string(),
                expected: type_name::<Value>(),
            })?;
        Ok(tree::get_path(tree, rest).cloned())
    }

    fn announce(&self, key: &str, instance: &Instance) {
        let hooks = self
            .inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        for hook in hooks.into_iter().flatten() {
            hook(instance);
        }
    }

    /// Block until no factory is running for `key`.
    fn wait_for(&self, key: &str) {
        let (lock, signal) = &self.inner.resolved;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.is_resolving(key) {
            guard = signal.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn notify_resolved(&self) {
        let (lock, signal) = &self.inner.resolved;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        signal.notify_all();
    }

    fn is_resolving(&self, key: &str) -> bool {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.resolving.is_some())
            .unwrap_or(false)
    }

    fn tag_index(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<String>>> {
        self.inner.tags.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container").field("keys", &self.keys()).finish()
    }
}

/// Cycles propagate as-is so the offending key stays visible at the top.
fn factory_error(key: &str, source: BoxError) -> ContainerError {
    match source.downcast::<ContainerError>() {
        Ok(inner) => match *inner {
            err @ ContainerError::CircularDependency { .. } => err,
            other => ContainerError::Factory {
                key: key.to_string(),
                source: Box::new(other),
            },
        },
        Err(source) => ContainerError::Factory {
            key: key.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Mailer {
        id: usize,
    }

    #[test]
    fn test_factory_is_memoized() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        container.factory("mailer", move |_| {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Mailer { id })
        });

        assert!(!container.is_resolved("mailer"));
        let first = container.resolve::<Mailer>("mailer").unwrap();
        let second = container.resolve::<Mailer>("mailer").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(container.is_resolved("mailer"));
    }

    #[test]
    fn test_value_is_returned_as_stored() {
        let container = Container::new();
        container.set("name", "demo".to_string());

        assert_eq!(container.kind("name"), Some(ServiceKind::Value));
        assert_eq!(*container.resolve::<String>("name").unwrap(), "demo");
    }

    #[test]
    fn test_factory_receives_container() {
        let container = Container::new();
        container.set("port", 8080u16);
        container.factory("address", |c| {
            let port = c.resolve::<u16>("port")?;
            Ok(format!("127.0.0.1:{}", port))
        });

        assert_eq!(*container.resolve::<String>("address").unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_service_not_found() {
        let container = Container::new();
        let err = container.resolve::<String>("missing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Container: Service \"missing\" not found.");
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.set("port", 8080u16);
        let err = container.resolve::<String>("port").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_tagged_in_registration_order() {
        let container = Container::new();
        container.set_tagged("c", &["mw"], 3u32);
        container.factory_tagged("a", &["mw", "other"], |_| Ok(1u32));
        container.set("untagged", 9u32);
        container.set_tagged("b", &["mw"], 2u32);

        assert_eq!(container.keys_by_tag("mw"), vec!["c", "a", "b"]);
        let values: Vec<u32> = container
            .tagged_as::<u32>("mw")
            .unwrap()
            .into_iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(values, vec![3, 1, 2]);
        assert!(container.is_resolved("a"));

        let mut visited = Vec::new();
        container
            .each_tagged::<u32, _>("mw", |value, key| visited.push(format!("{}={}", key, value)))
            .unwrap();
        assert_eq!(visited, vec!["c=3", "a=1", "b=2"]);

        assert!(container.tagged("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_reregistration_overwrites_entry_and_tags() {
        let container = Container::new();
        container.set_tagged("a", &["mw"], 1u32);
        container.set_tagged("b", &["mw"], 2u32);
        container.set_tagged("a", &["mw"], 10u32);

        assert_eq!(*container.resolve::<u32>("a").unwrap(), 10);
        assert_eq!(container.keys_by_tag("mw"), vec!["b", "a"]);

        container.set("b", 20u32);
        assert_eq!(container.keys_by_tag("mw"), vec!["a"]);
    }

    #[test]
    fn test_circular_dependency_fails_fast() {
        let container = Container::new();
        container.factory("a", |c| {
            let b = c.resolve::<u32>("b")?;
            Ok(*b + 1)
        });
        container.factory("b", |c| {
            let a = c.resolve::<u32>("a")?;
            Ok(*a + 1)
        });

        let err = container.resolve::<u32>("a").unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { ref key } if key == "a"));
        assert!(!container.is_resolved("a"));

        // The marker is cleared, so a fixed graph resolves afterwards.
        container.set("b", 1u32);
        assert_eq!(*container.resolve::<u32>("a").unwrap(), 2);
    }

    #[test]
    fn test_factory_error_is_wrapped() {
        let container = Container::new();
        container.factory::<u32, _>("broken", |_| Err("boom".into()));

        let err = container.resolve::<u32>("broken").unwrap_err();
        assert!(matches!(err, ContainerError::Factory { ref key, .. } if key == "broken"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_dotted_key_falls_back_to_nested_lookup() {
        let container = Container::new();
        let config: Value = serde_yaml::from_str("http:\n  port: 3000\norm: ~\n").unwrap();
        container.set("config", config);
        container.set("http.port", 1u32);

        let port = container.resolve::<Value>("config.http.port").unwrap();
        assert_eq!(*port, Value::from(3000));
        // A registered dotted key wins over the fallback.
        assert_eq!(*container.resolve::<u32>("http.port").unwrap(), 1);

        assert!(container.resolve::<Value>("config.missing").unwrap_err().is_not_found());
        assert_eq!(container.resolve_path("config.missing").unwrap(), None);
        assert_eq!(container.resolve_path("config.orm").unwrap(), Some(Value::Null));
        assert!(container.resolve_path("nothing.here").unwrap_err().is_not_found());
    }

    #[test]
    fn test_dotted_lookup_requires_tree_prefix() {
        let container = Container::new();
        container.set("port", 8080u16);
        let err = container.resolve::<Value>("port.inner").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { ref key, .. } if key == "port"));
    }

    #[test]
    fn test_trailing_separator_is_not_found() {
        let container = Container::new();
        let config: Value = serde_yaml::from_str("http:\n  port: 80\n").unwrap();
        container.set("config", config);

        assert!(container.resolve::<Value>("config.").unwrap_err().is_not_found());
    }

    #[test]
    fn test_concurrent_resolution_waits_for_running_factory() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        container.factory("slow", move |_| {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(Mailer { id })
        });

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || container.resolve::<Mailer>("slow"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_fires_once_on_first_resolution() {
        let container = Container::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        container.factory("mailer", |_| Ok(Mailer { id: 7 }));
        container.set("name", "demo".to_string());

        let log = seen.clone();
        container.on::<Mailer, _>("mailer", move |mailer| {
            log.lock().unwrap().push(format!("mailer={}", mailer.id));
        });
        let log = seen.clone();
        container.on::<String, _>("name", move |name| {
            log.lock().unwrap().push(format!("name={}", name));
        });

        assert!(seen.lock().unwrap().is_empty());
        container.resolve::<Mailer>("mailer").unwrap();
        container.resolve::<Mailer>("mailer").unwrap();
        container.resolve::<String>("name").unwrap();
        container.resolve::<String>("name").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["mailer=7", "name=demo"]);
    }

    #[test]
    fn test_listener_may_resolve_other_services() {
        let container = Container::new();
        container.set("port", 8080u16);
        container.factory("address", |_| Ok("127.0.0.1".to_string()));

        let observer = container.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let port = seen.clone();
        container.on::<String, _>("address", move |_| {
            let value = observer.resolve::<u16>("port").unwrap();
            port.store(*value as usize, Ordering::SeqCst);
        });

        container.resolve::<String>("address").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 8080);
    }
}
