//! Lifecycle notifications.
//!
//! Event names: `booted`, `booted.<phase>`, `listening`, `stopping`.
//! Listeners run synchronously, in registration order, on the emitting task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use crate::layout::Root;

/// Boot phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Templates,
    Models,
    Http,
    Socket,
    Tasks,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Templates,
        Phase::Models,
        Phase::Http,
        Phase::Socket,
        Phase::Tasks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Templates => "templates",
            Phase::Models => "models",
            Phase::Http => "http",
            Phase::Socket => "socket",
            Phase::Tasks => "tasks",
        }
    }

    /// Directory whose files drive this phase.
    pub fn root(&self) -> Root {
        match self {
            Phase::Templates => Root::Views,
            Phase::Models => Root::Models,
            Phase::Http => Root::Http,
            Phase::Socket => Root::Socket,
            Phase::Tasks => Root::Tasks,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Booted,
    PhaseBooted(Phase),
    Listening { addr: SocketAddr },
    Stopping,
}

impl LifecycleEvent {
    pub fn name(&self) -> String {
        match self {
            LifecycleEvent::Booted => "booted".to_string(),
            LifecycleEvent::PhaseBooted(phase) => format!("booted.{}", phase),
            LifecycleEvent::Listening { .. } => "listening".to_string(),
            LifecycleEvent::Stopping => "stopping".to_string(),
        }
    }
}

pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Ordered listener list. Clones share the same list.
#[derive(Clone, Default)]
pub struct Events {
    listeners: Arc<RwLock<Vec<(Option<String>, Listener)>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for events named `name`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.push(Some(name.into()), Arc::new(listener));
    }

    /// Listen for every event.
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.push(None, Arc::new(listener));
    }

    pub fn emit(&self, event: &LifecycleEvent) {
        let name = event.name();
        tracing::debug!(event = %name, "Lifecycle event");

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .expect("lifecycle listener lock poisoned")
            .iter()
            .filter(|(filter, _)| filter.as_deref().map_or(true, |f| f == name))
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().expect("lifecycle listener lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, filter: Option<String>, listener: Listener) {
        self.listeners
            .write()
            .expect("lifecycle listener lock poisoned")
            .push((filter, listener));
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events").field("listeners", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::Booted.name(), "booted");
        assert_eq!(LifecycleEvent::PhaseBooted(Phase::Socket).name(), "booted.socket");
        assert_eq!(
            LifecycleEvent::Listening {
                addr: "127.0.0.1:80".parse().unwrap()
            }
            .name(),
            "listening"
        );
        assert_eq!(LifecycleEvent::Stopping.name(), "stopping");
    }

    #[test]
    fn test_listeners_run_in_order_and_filter_by_name() {
        let events = Events::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        events.on_any(move |e| log.lock().unwrap().push(format!("any:{}", e.name())));
        let log = Arc::clone(&seen);
        events.on("booted", move |_| log.lock().unwrap().push("booted".to_string()));

        events.emit(&LifecycleEvent::PhaseBooted(Phase::Http));
        events.clone().emit(&LifecycleEvent::Booted);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["any:booted.http", "any:booted", "booted"]
        );
    }
}
