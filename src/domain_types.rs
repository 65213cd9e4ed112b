//! Strongly-typed domain values shared across the runtime.
//!
//! Mirrors the newtype-per-concept style used throughout this crate's
//! message routing layer: every identifier, capacity, and timeout gets its
//! own validated type instead of a bare `String`/`usize`/`u64`, so illegal
//! values (a zero-capacity queue, an empty subsystem name) are rejected at
//! construction rather than deep inside the pipeline.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a message, globally unique per process.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random message id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Unique identifier for a transaction batch (spec.md §4.1 `createTransactionBatch`).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh random transaction id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// A subsystem's registered name, the scheme of a message path.
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct SubsystemName(String);

/// A named capability kind installed on a subsystem (facet kind, when not
/// one of the closed [`crate::facet::FacetKind`] variants).
#[nutype(
    validate(len_char_min = 1, len_char_max = 100),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct FacetKindName(String);

/// Bounded queue capacity. `BoundedQueue` rejects zero, which would make
/// every enqueue overflow immediately.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct QueueCapacity(usize);

impl QueueCapacity {
    /// Returns the capacity as a plain `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum retry attempts before a message is considered undeliverable
/// (spec.md §3: `retries <= maxRetries + 1`).
#[nutype(
    validate(less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 0
)]
pub struct MaxRetries(u32);

impl MaxRetries {
    /// Returns the value as `u32`.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.into_inner()
    }
}

/// Duration of one scheduler time slice, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 60_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 50
)]
pub struct TimeSliceMs(u64);

impl TimeSliceMs {
    /// Converts to a [`Duration`].
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Request timeout in milliseconds (spec.md §5: default 5000 for one-shot,
/// 30000 for transactions).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TimeoutMs(u64);

impl TimeoutMs {
    /// Converts to a [`Duration`].
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }

    /// Default one-shot reply timeout (5 seconds).
    #[must_use]
    pub fn default_one_shot() -> Self {
        Self::try_new(5_000).expect("5000 is within the valid range")
    }

    /// Default transaction timeout (30 seconds).
    #[must_use]
    pub fn default_transaction() -> Self {
        Self::try_new(30_000).expect("30000 is within the valid range")
    }
}

/// Maximum size of the error manager's bounded history (spec.md §4.11,
/// default 1000).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct ErrorHistorySize(usize);

impl ErrorHistorySize {
    /// Returns the value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_name_rejects_leading_digit() {
        assert!(SubsystemName::try_new("1bad").is_err());
    }

    #[test]
    fn subsystem_name_accepts_hyphen_and_underscore() {
        assert!(SubsystemName::try_new("my-sub_1").is_ok());
    }

    #[test]
    fn queue_capacity_rejects_zero() {
        assert!(QueueCapacity::try_new(0).is_err());
    }

    #[test]
    fn message_id_generate_is_unique() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
    }
}
