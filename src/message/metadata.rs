//! Message metadata: the fixed (frozen) and mutable halves of a `Message`.
//!
//! spec.md §3: fixed meta is "frozen at creation"; mutable meta is
//! "writable only via defined mutators". We model that split literally as
//! two structs, `FixedMeta` (no `pub` mutating methods, only getters) and
//! `MutableMeta` (private fields, mutated only through
//! [`Message`](super::Message)'s mutator methods).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::{MaxRetries, SubsystemName, TransactionId};

/// Message type tag, classifying how the runtime should treat a message
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// An ordinary fire-and-forget message.
    Simple,
    /// A message that must be processed as an indivisible unit.
    Atomic,
    /// One message among a [`super::factory::TransactionBatch`].
    Batch,
    /// A query message, processed synchronously (never enqueued).
    Query,
    /// A message that may be retried on handler failure.
    Retry,
    /// One message participating in a multi-step transaction.
    Transaction,
    /// A command message, which requires a `sender_id`.
    Command,
    /// An error record forwarded as a message (used by listener `onFailure`
    /// groups and the kernel's classified error path).
    Error,
}

/// Options accepted by [`super::factory::MessageFactory::create`] when
/// building a message's fixed metadata.
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    /// Overrides the message type inferred from the path (used for
    /// explicit `retry`/`command`/`transaction`/etc. construction).
    pub message_type: Option<MessageType>,
    /// Maximum retry attempts, default 0 (no retries).
    pub max_retries: Option<MaxRetries>,
    /// Transaction id, set on every message of a transaction batch.
    pub transaction: Option<TransactionId>,
    /// Monotonic sequence number within a transaction batch.
    pub seq: Option<u64>,
    /// Explicit sender id; auto-generated for commands if omitted.
    pub sender_id: Option<String>,
    /// The subsystem that issued the `sendProtected` call, if any.
    pub caller: Option<SubsystemName>,
    /// Arbitrary named custom fixed fields.
    pub custom: HashMap<String, Value>,
}

/// The immutable half of a message's metadata, frozen at construction
/// (spec.md §3, §4.1 invariant I1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedMeta {
    pub(super) timestamp: u128,
    pub(super) message_type: MessageType,
    pub(super) max_retries: MaxRetries,
    pub(super) is_atomic: bool,
    pub(super) is_batch: bool,
    pub(super) is_query: bool,
    pub(super) is_command: bool,
    pub(super) is_error: bool,
    pub(super) transaction: Option<TransactionId>,
    pub(super) seq: Option<u64>,
    pub(super) sender_id: Option<String>,
    pub(super) caller: Option<SubsystemName>,
    pub(super) custom: HashMap<String, Value>,
}

impl FixedMeta {
    /// Milliseconds since the Unix epoch at the time this message was created.
    #[must_use]
    pub fn timestamp(&self) -> u128 {
        self.timestamp
    }

    /// The message's type tag.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Maximum retry attempts allowed.
    #[must_use]
    pub fn max_retries(&self) -> MaxRetries {
        self.max_retries
    }

    /// Whether this message must be processed atomically.
    #[must_use]
    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }

    /// Whether this message is one of a batch.
    #[must_use]
    pub fn is_batch(&self) -> bool {
        self.is_batch
    }

    /// Whether this message's path matched the query auto-detection regex.
    #[must_use]
    pub fn is_query(&self) -> bool {
        self.is_query
    }

    /// Whether this message is a command (requires `sender_id`).
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.is_command
    }

    /// Whether this message represents a classified error record.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// The transaction id shared by every message of a batch, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// The monotonic sequence number within a transaction batch, if any.
    #[must_use]
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    /// The sender id, required (and auto-generated if absent) for commands.
    #[must_use]
    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    /// The subsystem name that authenticated this call via `sendProtected`,
    /// if it arrived through the kernel.
    #[must_use]
    pub fn caller(&self) -> Option<&SubsystemName> {
        self.caller.as_ref()
    }

    /// Looks up a named custom fixed field.
    #[must_use]
    pub fn custom_field(&self, name: &str) -> Option<&Value> {
        self.custom.get(name)
    }

    pub(super) fn current_timestamp() -> u128 {
        current_timestamp_millis()
    }
}

/// Milliseconds since the Unix epoch, shared by [`FixedMeta::current_timestamp`]
/// and anything outside this module that needs to stamp a record the same
/// way (e.g. [`crate::error_manager::ErrorRecord`]).
#[must_use]
pub fn current_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis()
}

/// The mutable half of a message's metadata. Fields are private; mutation
/// is only possible through [`Message`](super::Message)'s mutator methods,
/// per spec.md §4.1's mutator contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutableMeta {
    pub(super) retries: u32,
    pub(super) query_result: Option<Value>,
    pub(super) custom: HashMap<String, Value>,
}

impl MutableMeta {
    /// The current retry counter.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The result slot written by a query handler, if any.
    #[must_use]
    pub fn query_result(&self) -> Option<&Value> {
        self.query_result.as_ref()
    }

    /// Looks up a named custom mutable field (e.g. `replyPath`).
    #[must_use]
    pub fn custom_field(&self, name: &str) -> Option<&Value> {
        self.custom.get(name)
    }
}
