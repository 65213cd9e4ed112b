//! The message envelope: an immutable `id`/`path`/`body` plus its split
//! fixed/mutable metadata, with mutation restricted to the defined
//! mutators (spec.md §3, §4.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::MessageId;
use crate::error::MessageError;

use super::metadata::{FixedMeta, MutableMeta};
use super::path::MessagePath;

/// An immutable message envelope.
///
/// `id`, `path`, `body`, and `meta.fixed` never change after construction.
/// Only `meta.mutable` can change, and only through the mutator methods
/// below — there is no public field access that allows writing fixed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    path: MessagePath,
    body: Value,
    fixed: FixedMeta,
    mutable: MutableMeta,
}

impl Message {
    pub(super) fn new(
        id: MessageId,
        path: MessagePath,
        body: Value,
        fixed: FixedMeta,
        mutable: MutableMeta,
    ) -> Self {
        Self {
            id,
            path,
            body,
            fixed,
            mutable,
        }
    }

    /// This message's globally-unique id.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// This message's path.
    #[must_use]
    pub fn path(&self) -> &MessagePath {
        &self.path
    }

    /// This message's payload.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// A copy of the frozen metadata half.
    #[must_use]
    pub fn fixed(&self) -> &FixedMeta {
        &self.fixed
    }

    /// A reference to the currently-mutable metadata half.
    #[must_use]
    pub fn mutable(&self) -> &MutableMeta {
        &self.mutable
    }

    /// Sets the retry counter to an explicit value.
    ///
    /// # Errors
    ///
    /// None today — retained as `Result` to match the mutator contract in
    /// spec.md §4.1, which reserves the right to reject values later (e.g.
    /// a future bound check); currently any `u32` is accepted.
    pub fn set_retries(&mut self, n: u32) -> Result<(), MessageError> {
        self.mutable.retries = n;
        Ok(())
    }

    /// Increments the retry counter and reports whether another retry is
    /// still permitted, per spec.md §3: `retries <= maxRetries + 1`.
    ///
    /// Returns `true` (and performs the increment) if the new retry count
    /// does not exceed `max_retries`; returns `false` without mutating the
    /// counter if the bound would be exceeded.
    pub fn increment_retry(&mut self) -> bool {
        let max = self.fixed.max_retries.as_u32();
        if self.mutable.retries >= max {
            return false;
        }
        self.mutable.retries += 1;
        true
    }

    /// Resets the retry counter to zero.
    pub fn reset_retries(&mut self) {
        self.mutable.retries = 0;
    }

    /// Writes the query result slot (set by a query handler's return value).
    pub fn set_query_result(&mut self, value: Value) {
        self.mutable.query_result = Some(value);
    }

    /// Merges a partial update into the mutable custom-field map (e.g.
    /// setting `replyPath`).
    pub fn update_mutable(&mut self, partial: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in partial {
            self.mutable.custom.insert(key, value);
        }
    }

    /// Serializes both metadata halves and the envelope to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] only via [`serde_json::Error`] conversion
    /// paths in callers; this method itself is infallible given a valid
    /// `Message`, but returns `Result` to match the round-trip contract in
    /// spec.md §4.1 (I5).
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "path": self.path.as_str(),
            "body": self.body,
            "fixed": self.fixed,
            "mutable": self.mutable,
        })
    }

    /// Deserializes a message from the JSON shape produced by [`Self::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::IncompleteSerialization`] if `fixed` or
    /// `mutable` is missing, or [`MessageError::Path`] if `path` fails to
    /// parse.
    pub fn from_json(value: &Value) -> Result<Self, MessageError> {
        let id: MessageId = serde_json::from_value(
            value
                .get("id")
                .cloned()
                .ok_or_else(|| MessageError::IncompleteSerialization {
                    field: "id".to_string(),
                })?,
        )
        .map_err(|_| MessageError::IncompleteSerialization {
            field: "id".to_string(),
        })?;

        let path_str = value
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| MessageError::IncompleteSerialization {
                field: "path".to_string(),
            })?;
        let path = MessagePath::parse(path_str)?;

        let body = value.get("body").cloned().unwrap_or(Value::Null);

        let fixed: FixedMeta = serde_json::from_value(
            value
                .get("fixed")
                .cloned()
                .ok_or_else(|| MessageError::IncompleteSerialization {
                    field: "fixed".to_string(),
                })?,
        )
        .map_err(|_| MessageError::IncompleteSerialization {
            field: "fixed".to_string(),
        })?;

        let mutable: MutableMeta = serde_json::from_value(
            value
                .get("mutable")
                .cloned()
                .ok_or_else(|| MessageError::IncompleteSerialization {
                    field: "mutable".to_string(),
                })?,
        )
        .map_err(|_| MessageError::IncompleteSerialization {
            field: "mutable".to_string(),
        })?;

        Ok(Self {
            id,
            path,
            body,
            fixed,
            mutable,
        })
    }
}
