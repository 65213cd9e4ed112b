//! Tracks outstanding one-shot reply waiters (spec.md §4.9's
//! `ResponseManager` child service, §4.10 step 3, §5 response overlay).
//!
//! [`crate::requests`] builds the public `RequestBuilder` surface on top of
//! this; this module only owns the waiter table and the transient-route
//! bookkeeping the kernel consults while routing.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain_types::MessageId;

/// One registered one-shot reply route: `<subsystem>://reply/<messageId>`,
/// resolved exactly once by its matching response.
struct Waiter {
    sender: Option<oneshot::Sender<Value>>,
}

/// Registers and resolves transient reply waiters.
#[derive(Default)]
pub struct ResponseManager {
    waiters: HashMap<MessageId, Waiter>,
}

impl ResponseManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot reply route for `message_id`, returning the
    /// receiver half the caller awaits.
    pub fn register(&mut self, message_id: MessageId) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(message_id, Waiter { sender: Some(tx) });
        rx
    }

    /// Whether `message_id` has a registered, not-yet-resolved waiter
    /// (spec.md §4.10 step 3: "the path is a registered one-shot reply
    /// path").
    #[must_use]
    pub fn is_registered(&self, message_id: &MessageId) -> bool {
        self.waiters.contains_key(message_id)
    }

    /// Resolves the waiter for `message_id` with `value`, consuming the
    /// registration. Returns `false` if no waiter was registered (the
    /// reply arrived after a timeout already unregistered it).
    pub fn resolve(&mut self, message_id: &MessageId, value: Value) -> bool {
        match self.waiters.remove(message_id) {
            Some(Waiter { sender: Some(tx) }) => tx.send(value).is_ok(),
            _ => false,
        }
    }

    /// Unregisters a waiter without resolving it (timeout path).
    pub fn unregister(&mut self, message_id: &MessageId) {
        self.waiters.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_value_to_receiver() {
        let mut manager = ResponseManager::new();
        let id = MessageId::generate();
        let rx = manager.register(id);
        assert!(manager.is_registered(&id));
        assert!(manager.resolve(&id, serde_json::json!({"ok": true})));
        assert_eq!(rx.await.unwrap(), serde_json::json!({"ok": true}));
        assert!(!manager.is_registered(&id));
    }

    #[test]
    fn resolve_on_unknown_id_returns_false() {
        let mut manager = ResponseManager::new();
        assert!(!manager.resolve(&MessageId::generate(), serde_json::json!(null)));
    }

    #[test]
    fn unregister_drops_waiter_without_resolving() {
        let mut manager = ResponseManager::new();
        let id = MessageId::generate();
        manager.register(id);
        manager.unregister(&id);
        assert!(!manager.is_registered(&id));
    }
}
