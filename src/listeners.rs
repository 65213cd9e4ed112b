//! Per-subsystem pub/sub (spec.md §4.5). Off by default; `enable()` must
//! be called before `emit` does anything.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::message::Message;

/// The outcome tag an emission carries, selecting which member of a
/// handler group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler for this path completed successfully.
    Success,
    /// The handler for this path failed.
    Failure,
    /// A request/response wait for this path timed out.
    Timeout,
}

/// A typed event delivered to a listener: the path it was emitted on and
/// the message (or classified error payload) that triggered it.
#[derive(Debug, Clone)]
pub struct Event {
    /// The path the event was emitted on (usually the derived event path).
    pub path: String,
    /// The message associated with the event.
    pub message: Message,
    /// Extra structured data (e.g. a classified error record as JSON) for
    /// `Failure`/`Timeout` outcomes.
    pub data: Option<Value>,
}

/// A single listener callback.
pub type ListenerFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// A registered listener: either a plain handler (fires on `Success`
/// only) or a handler group distinguishing success/failure/timeout
/// (spec.md §4.5).
#[derive(Clone)]
pub enum Listener {
    /// Fires only for [`Outcome::Success`] emissions.
    Plain(ListenerFn),
    /// Fires the member matching the emission's outcome, if present.
    Group {
        /// Runs on [`Outcome::Success`].
        on_success: Option<ListenerFn>,
        /// Runs on [`Outcome::Failure`].
        on_failure: Option<ListenerFn>,
        /// Runs on [`Outcome::Timeout`].
        on_timeout: Option<ListenerFn>,
    },
}

impl Listener {
    fn invoke(&self, outcome: Outcome, event: &Event) {
        let handler = match (self, outcome) {
            (Self::Plain(handler), Outcome::Success) => Some(handler),
            (Self::Plain(_), Outcome::Failure | Outcome::Timeout) => None,
            (Self::Group { on_success, .. }, Outcome::Success) => on_success.as_ref(),
            (Self::Group { on_failure, .. }, Outcome::Failure) => on_failure.as_ref(),
            (Self::Group { on_timeout, .. }, Outcome::Timeout) => on_timeout.as_ref(),
        };
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

/// The per-subsystem pub/sub table: `path -> [Listener]`, off by default.
#[derive(Default)]
pub struct Listeners {
    enabled: bool,
    by_path: HashMap<String, Vec<Listener>>,
}

impl Listeners {
    /// Creates an empty, disabled listener table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the enabled flag on. Until this is called, [`Self::emit`] is
    /// a no-op regardless of registered listeners.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Whether listeners are currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registers a listener on `path`, auto-enabling listeners if this is
    /// the first registration (spec.md §4.5: `listenerOn` auto-enables).
    /// Does not replay any event emitted before this call (spec.md §9
    /// open question, resolved: no replay).
    pub fn on(&mut self, path: impl Into<String>, listener: Listener) {
        self.enabled = true;
        self.by_path.entry(path.into()).or_default().push(listener);
    }

    /// Removes every listener registered on `path`. Returns `true` if any
    /// were present.
    pub fn off(&mut self, path: &str) -> bool {
        self.by_path.remove(path).is_some()
    }

    /// Invokes every listener registered on `event.path` whose outcome
    /// handler is present. No-op if listeners are disabled.
    pub fn emit(&self, outcome: Outcome, event: &Event) {
        if !self.enabled {
            return;
        }
        if let Some(listeners) = self.by_path.get(&event.path) {
            for listener in listeners {
                listener.invoke(outcome, event);
            }
        }
    }
}
