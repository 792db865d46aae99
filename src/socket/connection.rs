//! One accepted websocket connection, as seen by `socket/` modules.

use std::sync::{Arc, RwLock};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Callback for inbound text frames.
pub type MessageHandler = Arc<dyn Fn(&SocketConnection, &str) + Send + Sync>;

/// Handle given to socket modules for a single client.
pub struct SocketConnection {
    id: Uuid,
    outgoing: mpsc::UnboundedSender<Message>,
    handlers: RwLock<Vec<MessageHandler>>,
}

impl SocketConnection {
    pub fn new(outgoing: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outgoing,
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text frame. Returns `false` once the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Message::Text(text.into().into())).is_ok()
    }

    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Queue a close frame.
    pub fn close(&self) -> bool {
        self.outgoing.send(Message::Close(None)).is_ok()
    }

    /// Register a handler for inbound text frames.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&SocketConnection, &str) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("socket handler lock poisoned")
            .push(Arc::new(handler));
    }

    /// Deliver `text` to every handler in registration order.
    pub fn dispatch(&self, text: &str) {
        let handlers = self
            .handlers
            .read()
            .expect("socket handler lock poisoned")
            .clone();
        for handler in handlers {
            handler(self, text);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().expect("socket handler lock poisoned").len()
    }
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("id", &self.id)
            .field("handlers", &self.handler_count())
            .finish()
    }
}
