//! Centralised message construction (spec.md §4.1, §9: "inject a Factory
//! value into the coordinator; every subsystem receives it through ctx").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use uuid::Uuid;

use crate::domain_types::MessageId;
use crate::error::MessageError;

use super::envelope::Message;
use super::metadata::{FixedMeta, MessageOptions, MessageType, MutableMeta};
use super::path::MessagePath;

/// Builds [`Message`] values with consistent id generation and fixed-meta
/// derivation. A single instance is owned by the coordinator and shared
/// (via `ctx`) with every subsystem, so ids are monotonic process-wide.
#[derive(Debug)]
pub struct MessageFactory {
    counter: AtomicU64,
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFactory {
    /// Creates a new factory with its monotonic counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Generates an id of the form `msg_<monotonic>_<rand>`, sufficient for
    /// collision avoidance within a single process (spec.md §4.1a).
    fn next_id(&self) -> MessageId {
        // The textual form isn't part of MessageId's public contract (it's a
        // Uuid newtype), but we fold the monotonic counter into the UUID's
        // random bits so collisions are even less likely than plain v4.
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut bytes = *Uuid::new_v4().as_bytes();
        bytes[0..8].copy_from_slice(&seq.to_be_bytes());
        MessageId::new(Uuid::from_bytes(bytes))
    }

    /// Creates a simple message with default options, inferring `is_query`
    /// from the path per spec.md §6.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Path`] if `path` fails to parse.
    pub fn create(&self, path: impl Into<String>, body: Value) -> Result<Message, MessageError> {
        self.create_with_options(path, body, MessageOptions::default())
    }

    /// Creates a message with explicit options (type override, retry bound,
    /// transaction linkage, sender id, caller, custom fields).
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Path`] if `path` fails to parse, or
    /// [`MessageError::MissingSenderId`] if the resolved message type is
    /// `Command` and no `sender_id` was supplied (one is auto-generated
    /// instead, so this only occurs if id generation is ever disabled).
    pub fn create_with_options(
        &self,
        path: impl Into<String>,
        body: Value,
        options: MessageOptions,
    ) -> Result<Message, MessageError> {
        let path = MessagePath::parse(path)?;
        let is_query = path.is_query();

        let message_type = options.message_type.unwrap_or(if is_query {
            MessageType::Query
        } else {
            MessageType::Simple
        });

        let is_command = matches!(message_type, MessageType::Command);
        let sender_id = if is_command {
            Some(options.sender_id.unwrap_or_else(|| Uuid::new_v4().to_string()))
        } else {
            options.sender_id
        };

        if is_command && sender_id.is_none() {
            return Err(MessageError::MissingSenderId);
        }

        let fixed = FixedMeta {
            timestamp: FixedMeta::current_timestamp(),
            message_type,
            max_retries: options.max_retries.unwrap_or_default(),
            is_atomic: matches!(message_type, MessageType::Atomic),
            is_batch: matches!(message_type, MessageType::Batch),
            is_query,
            is_command,
            is_error: matches!(message_type, MessageType::Error),
            transaction: options.transaction,
            seq: options.seq,
            sender_id,
            caller: options.caller,
            custom: options.custom,
        };

        Ok(Message::new(
            self.next_id(),
            path,
            body,
            fixed,
            MutableMeta::default(),
        ))
    }

    /// Creates a batch of messages sharing one transaction id, with
    /// monotonically increasing `seq` starting at 1 (spec.md §4.1e).
    ///
    /// `specs` pairs a path/body with optional per-message options; any
    /// `transaction`/`seq` set in those options is overwritten, since the
    /// batch owns both.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Path`] if any path fails to parse.
    pub fn create_transaction_batch(
        &self,
        specs: Vec<(String, Value, MessageOptions)>,
        global_options: MessageOptions,
    ) -> Result<Vec<Message>, MessageError> {
        let transaction = crate::domain_types::TransactionId::generate();

        specs
            .into_iter()
            .enumerate()
            .map(|(idx, (path, body, mut options))| {
                options.transaction = Some(transaction);
                options.seq = Some(idx as u64 + 1);
                options.message_type = options
                    .message_type
                    .or(global_options.message_type)
                    .or(Some(MessageType::Transaction));
                options.max_retries = options.max_retries.or(global_options.max_retries);
                options.caller = options.caller.clone().or_else(|| global_options.caller.clone());
                let mut custom = global_options.custom.clone();
                custom.extend(options.custom.clone());
                options.custom = custom;
                self.create_with_options(path, body, options)
            })
            .collect()
    }
}

/// Convenience alias used when building transaction batch specs inline.
pub type TransactionSpec = (String, Value, MessageOptions);

/// Builds a [`HashMap`]-backed [`MessageOptions::custom`] from pairs.
#[must_use]
pub fn custom_fields(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
