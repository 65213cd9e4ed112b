//! Crate-wide error types.
//!
//! Each component gets its own `thiserror`-derived enum, the way this
//! crate's message routing layer splits `RouterError`/`DeliveryError`/
//! `ConversationError`/`RegistryError` instead of one catch-all. A single
//! [`CoordinatorError`] aggregates them at the surface the coordinator
//! exposes to external callers (spec.md §6 result envelope).

use thiserror::Error;

use crate::domain_types::{MessageId, SubsystemName};

/// Errors from parsing or validating a [`crate::message::MessagePath`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path string does not conform to the grammar in spec.md §6.
    #[error("malformed path {path:?}: {reason}")]
    Malformed {
        /// The offending path string.
        path: String,
        /// Human-readable reason the path was rejected.
        reason: String,
    },
}

/// Errors raised while constructing or mutating a [`crate::message::Message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The path failed to parse.
    #[error(transparent)]
    Path(#[from] PathError),

    /// An attempt was made to mutate a fixed (frozen) metadata field.
    #[error("cannot mutate fixed metadata field {field}")]
    FixedFieldMutation {
        /// Name of the field the caller attempted to write.
        field: String,
    },

    /// A command message requires a `sender_id` but none was supplied or
    /// auto-generated.
    #[error("command messages require a sender id")]
    MissingSenderId,

    /// Deserialization input was missing the `fixed` or `mutable` half.
    #[error("message JSON missing required field {field}")]
    IncompleteSerialization {
        /// The missing top-level field (`"fixed"` or `"mutable"`).
        field: String,
    },
}

/// Errors from the bounded queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity and the overflow policy is `Error`.
    #[error("queue full at capacity {capacity}")]
    QueueFull {
        /// The queue's configured capacity.
        capacity: usize,
    },
}

/// Errors from facet build/init/dispose (spec.md §4.3).
#[derive(Debug, Error)]
pub enum FacetError {
    /// A hook's declared kind is already installed and `overwrite` was not set.
    #[error("facet kind {kind} already installed")]
    DuplicateKind {
        /// The conflicting facet kind.
        kind: String,
    },

    /// A hook declared a dependency on a kind that was never installed.
    #[error("facet {kind} depends on missing facet {dependency}")]
    MissingDependency {
        /// The dependent facet's kind.
        kind: String,
        /// The missing dependency's kind.
        dependency: String,
    },

    /// The dependency graph among installed hooks contains a cycle.
    #[error("facet dependency cycle detected among: {}", .kinds.join(", "))]
    DependencyCycle {
        /// The kinds participating in the cycle.
        kinds: Vec<String>,
    },

    /// A facet's `init` callback failed.
    #[error("facet {kind} failed to initialize: {source}")]
    InitFailed {
        /// The facet whose init callback failed.
        kind: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The facet failed contract validation against the named contract's
    /// required method table.
    #[error("facet {kind} does not satisfy contract {contract}: missing {missing:?}")]
    ContractViolation {
        /// The facet's kind.
        kind: String,
        /// The contract name it was checked against.
        contract: String,
        /// The method names required by the contract but not present.
        missing: Vec<String>,
    },
}

/// Errors from local route registration/matching (spec.md §4.4).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// A route with an identical pattern is already registered.
    #[error("duplicate route pattern {pattern}")]
    DuplicatePattern {
        /// The conflicting pattern string.
        pattern: String,
    },

    /// The pattern string itself is invalid (e.g. unbalanced `{`/`}`).
    #[error("invalid route pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors surfaced by a subsystem's accept/process pipeline (spec.md §4.6).
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// No route matched the message's path.
    #[error("no route matches path {path}")]
    Unroutable {
        /// The unmatched path.
        path: String,
    },

    /// The queue rejected the enqueue under its overflow policy.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The handler invoked for a matched route returned an error.
    #[error("handler for {path} failed: {source}")]
    HandlerFailed {
        /// The path whose handler failed.
        path: String,
        /// The handler's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The subsystem is not in a state that permits the requested operation
    /// (e.g. `process` called on a disposed subsystem).
    #[error("subsystem {subsystem} is {state}, cannot {action}")]
    InvalidState {
        /// The subsystem's name.
        subsystem: String,
        /// Its current lifecycle state.
        state: &'static str,
        /// The operation that was attempted.
        action: &'static str,
    },
}

/// Errors from the kernel's principal/resource/channel/profile registries
/// and `sendProtected` (spec.md §4.9–4.10).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The caller's PKR is not registered, or is registered but expired.
    #[error("access denied")]
    AccessDenied,

    /// No subsystem is registered under the given name.
    #[error("unknown subsystem {name}")]
    UnknownSubsystem {
        /// The requested subsystem name.
        name: SubsystemName,
    },

    /// No principal exists with the given identity.
    #[error("unknown principal")]
    UnknownPrincipal,

    /// A resource with this name already exists for its owner.
    #[error("resource {name} already exists for this owner")]
    DuplicateResource {
        /// The conflicting resource name.
        name: String,
    },

    /// No resource is registered under the given name.
    #[error("unknown resource {name}")]
    UnknownResource {
        /// The requested resource name.
        name: String,
    },

    /// No channel is registered under the given route.
    #[error("unknown channel {route}")]
    UnknownChannel {
        /// The requested channel route.
        route: String,
    },
}

/// Errors from the request/response overlay (spec.md §4.10, §5).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No reply arrived within the caller's timeout.
    #[error("request {message_id} timed out")]
    Timeout {
        /// The id of the message whose reply never arrived.
        message_id: MessageId,
    },

    /// The reply path or channel named in the request was never registered.
    #[error("no waiter registered for {message_id}")]
    NoWaiter {
        /// The id of the message with no outstanding waiter.
        message_id: MessageId,
    },
}

/// Errors from building or validating a [`crate::config::RuntimeConfig`]
/// (SPEC_FULL.md §1.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field named a scheduling strategy this runtime doesn't recognise.
    #[error("unknown scheduling strategy {name:?}")]
    UnknownSchedulingStrategy {
        /// The offending value.
        name: String,
    },

    /// A field named an overflow policy this runtime doesn't recognise.
    /// In particular, a documented-but-never-implemented `block` policy
    /// (spec.md §9 open question) is rejected here rather than silently
    /// accepted (DESIGN.md's recorded decision).
    #[error("unknown overflow policy {name:?}")]
    UnknownOverflowPolicy {
        /// The offending value.
        name: String,
    },

    /// A numeric config field fell outside its domain type's valid range.
    #[error("invalid value for {field}: {reason}")]
    ValidationError {
        /// The config field that failed validation.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors from a [`crate::storage::StorageBackend`] implementation
/// (SPEC_FULL.md §1.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be reached (e.g. connection refused, disk full).
    #[error("storage backend unavailable: {reason}")]
    Unavailable {
        /// Why the backend could not be reached.
        reason: String,
    },

    /// The stored value could not be decoded back into the requested shape.
    #[error("failed to deserialize value at key {key:?}: {reason}")]
    Corrupt {
        /// The key whose stored value failed to decode.
        key: String,
        /// The underlying deserialization error.
        reason: String,
    },
}

/// Top-level error returned at the coordinator's public surface
/// (spec.md §6: `{success, ..., error: {code, message, details?}}`).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// See [`PathError`].
    #[error(transparent)]
    Path(#[from] PathError),

    /// See [`MessageError`].
    #[error(transparent)]
    Message(#[from] MessageError),

    /// See [`SubsystemError`].
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    /// See [`KernelError`].
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// See [`RequestError`].
    #[error(transparent)]
    Request(#[from] RequestError),

    /// See [`FacetError`].
    #[error(transparent)]
    Facet(#[from] FacetError),

    /// See [`RouteError`].
    #[error(transparent)]
    Route(#[from] RouteError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// See [`StorageError`].
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The stable error code taxonomy surfaced at the coordinator boundary
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    /// No subsystem or route matched the message path.
    Unroutable,
    /// The target queue is at capacity under the `Error` overflow policy.
    QueueFull,
    /// ACL or channel/resource rights check failed.
    AccessDenied,
    /// Caller identity (PKR) is unknown or expired.
    AuthFailed,
    /// A request/response overlay timeout elapsed.
    RequestTimeout,
    /// Message construction or mutation violated a domain invariant.
    ValidationError,
    /// A user handler raised an error while processing a message.
    HandlerError,
    /// An invariant violation not attributable to routing, capacity,
    /// security, or handler logic (e.g. a facet build-time cycle).
    Internal,
}

impl CoordinatorError {
    /// Maps this error onto the stable [`ErrorCode`] taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Subsystem(SubsystemError::Unroutable { .. }) => ErrorCode::Unroutable,
            Self::Kernel(KernelError::UnknownSubsystem { .. }) => ErrorCode::Unroutable,
            Self::Subsystem(SubsystemError::Queue(QueueError::QueueFull { .. })) => {
                ErrorCode::QueueFull
            }
            Self::Kernel(
                KernelError::AccessDenied
                | KernelError::UnknownChannel { .. }
                | KernelError::UnknownPrincipal,
            ) => ErrorCode::AccessDenied,
            Self::Request(RequestError::Timeout { .. }) => ErrorCode::RequestTimeout,
            Self::Message(_) | Self::Route(_) => ErrorCode::ValidationError,
            Self::Subsystem(SubsystemError::HandlerFailed { .. }) => ErrorCode::HandlerError,
            Self::Path(_)
            | Self::Kernel(
                KernelError::DuplicateResource { .. } | KernelError::UnknownResource { .. },
            )
            | Self::Request(RequestError::NoWaiter { .. })
            | Self::Facet(_)
            | Self::Config(_)
            | Self::Storage(_)
            | Self::Subsystem(SubsystemError::InvalidState { .. }) => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_maps_to_access_denied_code() {
        let err = CoordinatorError::Kernel(KernelError::AccessDenied);
        assert_eq!(err.code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn timeout_maps_to_request_timeout_code() {
        let err = CoordinatorError::Request(RequestError::Timeout {
            message_id: MessageId::generate(),
        });
        assert_eq!(err.code(), ErrorCode::RequestTimeout);
    }
}
