//! A subsystem: facets, a local router, a bounded queue, and the
//! accept/process pipeline that drives them (spec.md §4.6, component L7).

use std::collections::HashMap;

use serde_json::Value;

use crate::domain_types::{MaxRetries, QueueCapacity, SubsystemName, TimeSliceMs};
use crate::error::SubsystemError;
use crate::error_manager::{ErrorInput, ErrorType};
use crate::facet::FacetManager;
use crate::listeners::{Event, Listener, Listeners, Outcome};
use crate::message::Message;
use crate::queue::{BoundedQueue, OverflowPolicy};
use crate::router::Router;
use crate::time_provider::TimeProvider;

/// Per-call options threaded through `accept`/`process`. The kernel
/// overwrites `caller_id`/`caller_id_set_by` on every `sendProtected` call
/// (spec.md §4.10 step 2); ordinary `coordinator.send` calls leave them
/// unset.
#[derive(Debug, Clone, Default)]
pub struct AcceptOptions {
    /// The authenticated caller's PKR, set only by the kernel.
    pub caller_id: Option<String>,
    /// Always the kernel's own PKR when `caller_id` is set, proving the
    /// identity was attached by `sendProtected` and not forged by a caller.
    pub caller_id_set_by: Option<String>,
    /// Arbitrary additional per-call options.
    pub extra: HashMap<String, Value>,
}

/// Which scheduling discipline a subsystem follows (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// `accept` enqueues non-matching-query messages; a scheduler later
    /// calls `process` to drain the queue.
    Canonical,
    /// `accept` always processes immediately; the queue exists only to
    /// preserve ordering across re-entrant calls (used by the kernel).
    Synchronous,
}

/// The subsystem's lifecycle state (spec.md §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    /// Constructed but facets not yet built.
    Initial,
    /// Facets built and initialised.
    Built,
    /// Actively processed by the scheduler (or, for a synchronous
    /// subsystem, has accepted at least one message).
    Running,
    /// Still accepts enqueues but skipped by the scheduler.
    Paused,
    /// Terminal; facets disposed, no further operations permitted.
    Disposed,
}

impl SubsystemState {
    fn label(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Built => "built",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Disposed => "disposed",
        }
    }
}

/// The outcome of a single `accept` call.
pub enum AcceptOutcome {
    /// The message was queued for later processing. `true` if accepted,
    /// `false` if silently rejected under `DropNewest`.
    Enqueued(bool),
    /// The message (a matched query, or any message on a synchronous
    /// subsystem) was processed immediately, carrying the handler's result.
    Processed(Value),
}

/// What happened to one message drained by `process`.
enum MessageOutcome {
    Success,
    /// The message failed but was re-enqueued for another attempt.
    Retried(ErrorInput),
    /// The message failed and will not be retried.
    Failed(ErrorInput),
}

/// Everything `process` learned while draining the queue for one time
/// slice: how many messages were handled, and the classified errors that
/// must be forwarded to the kernel's error manager (spec.md §4.6,
/// "Cyclic references" design note in spec.md §9 — the subsystem never
/// holds a kernel reference itself).
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Number of messages drained and handled (successfully or not).
    pub processed: usize,
    /// Classified errors to forward to the kernel's error manager.
    pub errors: Vec<ErrorInput>,
}

/// A composable processing unit: name, facets, local router, bounded
/// queue, and lifecycle state (spec.md §3 `Subsystem`).
pub struct Subsystem {
    name: SubsystemName,
    disposition: Disposition,
    state: SubsystemState,
    facets: Option<FacetManager>,
    router: Router,
    queue: BoundedQueue<(Message, AcceptOptions)>,
    listeners: Listeners,
    identity: Option<crate::kernel::principal::Pkr>,
}

impl Subsystem {
    /// Creates a subsystem in the `Initial` state with an empty router and
    /// no facets yet built.
    #[must_use]
    pub fn new(
        name: SubsystemName,
        disposition: Disposition,
        queue_capacity: QueueCapacity,
        overflow_policy: OverflowPolicy,
    ) -> Self {
        Self {
            name,
            disposition,
            state: SubsystemState::Initial,
            facets: None,
            router: Router::new(),
            queue: BoundedQueue::new(queue_capacity, overflow_policy),
            listeners: Listeners::new(),
            identity: None,
        }
    }

    /// This subsystem's registered name.
    #[must_use]
    pub fn name(&self) -> &SubsystemName {
        &self.name
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubsystemState {
        self.state
    }

    /// The scheduling disposition.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Installs the built facet manager and transitions `Initial -> Built`
    /// (the kernel/coordinator calls this immediately after
    /// `FacetManager::build`/`init_all` succeed).
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError::InvalidState`] if called outside the
    /// `Initial` state.
    pub fn attach_facets(&mut self, facets: FacetManager) -> Result<(), SubsystemError> {
        self.expect_state(SubsystemState::Initial, "attach facets")?;
        self.facets = Some(facets);
        self.state = SubsystemState::Built;
        Ok(())
    }

    /// Attaches the kernel-issued identity (principal + PKR) to this
    /// subsystem (spec.md §4.9 `registerSubsystem`).
    pub fn attach_identity(&mut self, pkr: crate::kernel::principal::Pkr) {
        self.identity = Some(pkr);
    }

    /// This subsystem's kernel-issued identity, if attached.
    #[must_use]
    pub fn identity(&self) -> Option<&crate::kernel::principal::Pkr> {
        self.identity.as_ref()
    }

    /// A reference to this subsystem's facet manager, once built.
    #[must_use]
    pub fn facets(&self) -> Option<&FacetManager> {
        self.facets.as_ref()
    }

    /// A mutable reference to this subsystem's local router, for route
    /// registration during or after build.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// The listener table, for direct inspection (the coordinator's
    /// `listenerOn`/`listenerOff` delegate here).
    pub fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }

    /// Pauses the subsystem: still accepts enqueues, but the scheduler
    /// must skip it.
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError::InvalidState`] unless currently `Running`.
    pub fn pause(&mut self) -> Result<(), SubsystemError> {
        self.expect_state(SubsystemState::Running, "pause")?;
        self.state = SubsystemState::Paused;
        Ok(())
    }

    /// Resumes a paused subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError::InvalidState`] unless currently `Paused`.
    pub fn resume(&mut self) -> Result<(), SubsystemError> {
        self.expect_state(SubsystemState::Paused, "resume")?;
        self.state = SubsystemState::Running;
        Ok(())
    }

    /// Terminal disposal: disposes facets in reverse build order and
    /// marks this subsystem `Disposed`. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == SubsystemState::Disposed {
            return;
        }
        if let Some(facets) = &mut self.facets {
            facets.dispose_all();
        }
        self.state = SubsystemState::Disposed;
    }

    /// The number of messages currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The queue's configured capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// How many times the queue's overflow policy has fired.
    #[must_use]
    pub fn queue_full_event_count(&self) -> u64 {
        self.queue.queue_full_event_count()
    }

    fn expect_state(
        &self,
        expected: SubsystemState,
        action: &'static str,
    ) -> Result<(), SubsystemError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SubsystemError::InvalidState {
                subsystem: self.name.to_string(),
                state: self.state.label(),
                action,
            })
        }
    }

    /// Accepts a message: processes it immediately if it is a matching
    /// query (or this subsystem is `Synchronous`), otherwise enqueues it
    /// (spec.md §4.6).
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError::Queue`] if the `Error` overflow policy
    /// rejects the enqueue, or whatever error immediate processing raises.
    pub fn accept(
        &mut self,
        msg: Message,
        opts: AcceptOptions,
    ) -> Result<AcceptOutcome, SubsystemError> {
        if self.state == SubsystemState::Initial || self.state == SubsystemState::Disposed {
            return Err(SubsystemError::InvalidState {
                subsystem: self.name.to_string(),
                state: self.state.label(),
                action: "accept",
            });
        }
        if self.state == SubsystemState::Built {
            self.state = SubsystemState::Running;
        }

        let is_matching_query = msg.fixed().is_query()
            && self
                .router
                .matches(self.name.as_ref(), &msg.path().segments())
                .is_some();

        if self.disposition == Disposition::Synchronous || is_matching_query {
            return self.process_message_now(msg, opts).map(AcceptOutcome::Processed);
        }

        let accepted = self.queue.enqueue((msg, opts))?;
        Ok(AcceptOutcome::Enqueued(accepted))
    }

    /// Drains the queue for up to `time_slice`, processing each message in
    /// FIFO order, collecting errors to forward to the kernel's error
    /// manager (spec.md §4.6, §4.8).
    pub fn process(&mut self, time_slice: TimeSliceMs, time_provider: &dyn TimeProvider) -> ProcessReport {
        if self.state != SubsystemState::Running {
            return ProcessReport::default();
        }

        let start = time_provider.instant();
        let mut report = ProcessReport::default();

        while start.elapsed() < time_slice.as_duration() {
            let Some((msg, opts)) = self.queue.dequeue() else {
                break;
            };
            match self.process_message(msg, opts) {
                MessageOutcome::Success => {}
                MessageOutcome::Retried(err) => report.errors.push(err),
                MessageOutcome::Failed(err) => report.errors.push(err),
            }
            report.processed += 1;
        }

        report
    }

    fn process_message_now(
        &mut self,
        msg: Message,
        opts: AcceptOptions,
    ) -> Result<Value, SubsystemError> {
        let path = msg.path().clone();
        let segments = path.segments();
        let Some(route) = self.router.matches(self.name.as_ref(), &segments) else {
            return Err(SubsystemError::Unroutable {
                path: path.as_str().to_string(),
            });
        };
        let params = route.params.clone();
        let handler = route.handler.clone();

        let mut msg = msg;
        let _ = &opts;
        match handler(&msg, &params) {
            Ok(result) => {
                if msg.fixed().is_query() {
                    msg.set_query_result(result.clone());
                }
                self.emit_success(&msg);
                Ok(result)
            }
            Err(source) => Err(SubsystemError::HandlerFailed {
                path: path.as_str().to_string(),
                source,
            }),
        }
    }

    fn process_message(&mut self, mut msg: Message, opts: AcceptOptions) -> MessageOutcome {
        let path = msg.path().clone();
        let segments = path.segments();
        let Some(route) = self.router.matches(self.name.as_ref(), &segments) else {
            let err = self.classify_failure(&msg, "no route matched", None);
            self.emit_failure(&msg, &err);
            return MessageOutcome::Failed(err);
        };
        let params = route.params.clone();
        let handler = route.handler.clone();
        let _ = &opts;

        match handler(&msg, &params) {
            Ok(result) => {
                if msg.fixed().is_query() {
                    msg.set_query_result(result);
                }
                self.emit_success(&msg);
                MessageOutcome::Success
            }
            Err(source) => {
                let err = self.classify_failure(&msg, &source.to_string(), Some(source.to_string()));
                let max_retries = msg.fixed().max_retries().as_u32();
                if max_retries > 0 && msg.increment_retry() {
                    let _ = self.queue.enqueue((msg, opts));
                    MessageOutcome::Retried(err)
                } else {
                    self.emit_failure(&msg, &err);
                    MessageOutcome::Failed(err)
                }
            }
        }
    }

    fn classify_failure(&self, msg: &Message, message: &str, cause: Option<String>) -> ErrorInput {
        ErrorInput::Raw {
            subsystem: self.name.clone(),
            error_type: Some(ErrorType::HandlerError),
            timestamp: crate::message::current_timestamp_millis(),
            message: message.to_string(),
            code: None,
            path: Some(msg.path().as_str().to_string()),
            cause,
            data: None,
        }
    }

    fn emit_success(&self, msg: &Message) {
        let event_path = msg.path().derived_event_path();
        self.listeners.emit(
            Outcome::Success,
            &Event {
                path: event_path.as_str().to_string(),
                message: msg.clone(),
                data: None,
            },
        );
    }

    fn emit_failure(&self, msg: &Message, err: &ErrorInput) {
        let event_path = msg.path().derived_event_path();
        let data = match err {
            ErrorInput::Raw { message, .. } => Some(Value::String(message.clone())),
            ErrorInput::Record(record) => Some(Value::String(record.metadata.message.clone())),
        };
        self.listeners.emit(
            Outcome::Failure,
            &Event {
                path: event_path.as_str().to_string(),
                message: msg.clone(),
                data,
            },
        );
    }

    /// Registers a listener on `path`, delegating to the listener table.
    pub fn listener_on(&mut self, path: impl Into<String>, listener: Listener) {
        self.listeners.on(path, listener);
    }

    /// Removes every listener registered on `path`.
    pub fn listener_off(&mut self, path: &str) -> bool {
        self.listeners.off(path)
    }
}
