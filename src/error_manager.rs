//! Classified error records in a bounded, non-blocking FIFO history
//! (spec.md §4.11, component L14).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::{ErrorHistorySize, SubsystemName};
use crate::queue::{BoundedQueue, OverflowPolicy};

/// Mirrors [`crate::error::ErrorCode`] plus the `simple` fallback used
/// when an input carries no recognisable type tag (spec.md §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    /// No type tag was present on the input; the generic fallback.
    Simple,
    /// See [`crate::error::ErrorCode::Unroutable`].
    Unroutable,
    /// See [`crate::error::ErrorCode::QueueFull`].
    QueueFull,
    /// See [`crate::error::ErrorCode::AccessDenied`].
    AccessDenied,
    /// See [`crate::error::ErrorCode::AuthFailed`].
    AuthFailed,
    /// See [`crate::error::ErrorCode::RequestTimeout`].
    RequestTimeout,
    /// See [`crate::error::ErrorCode::ValidationError`].
    ValidationError,
    /// See [`crate::error::ErrorCode::HandlerError`].
    HandlerError,
    /// See [`crate::error::ErrorCode::Internal`].
    Internal,
}

/// Severity assigned to a classified error (spec.md §4.11: `warn` for
/// `AUTH_FAILED`, `error` otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Notable but not treated as a failure surfaced to the caller.
    Warn,
    /// A failure surfaced to the caller and recorded.
    Error,
}

/// Free-form detail carried alongside a classified error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorMetadata {
    /// Human-readable error message.
    pub message: String,
    /// A stable short code, if the source attached one.
    pub code: Option<String>,
    /// The message path involved, if any.
    pub path: Option<String>,
    /// A textual description of the underlying cause, if any.
    pub cause: Option<String>,
    /// Arbitrary structured data attached by the source.
    pub data: Option<Value>,
}

/// A classified error, ready for storage in the bounded history
/// (spec.md §3 `ErrorRecord`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    /// The inferred or supplied error type.
    pub error_type: ErrorType,
    /// The inferred or supplied severity.
    pub severity: Severity,
    /// The subsystem the error originated in.
    pub subsystem: SubsystemName,
    /// Milliseconds since the Unix epoch, supplied by the caller (the
    /// error manager does not read the system clock itself, so
    /// `#[cfg(test)]` and production code share one code path).
    pub timestamp: u128,
    /// The error's detail payload.
    pub metadata: ErrorMetadata,
}

/// Unclassified input accepted by [`ErrorManager::record`]: either an
/// already-classified record (passed through unchanged) or raw fields to
/// be classified (spec.md §4.11's classifier).
pub enum ErrorInput {
    /// Already classified; stored as-is.
    Record(ErrorRecord),
    /// Raw fields the classifier normalises into an [`ErrorRecord`].
    Raw {
        /// The subsystem the error originated in.
        subsystem: SubsystemName,
        /// An explicit type tag, if the source provided one.
        error_type: Option<ErrorType>,
        /// Timestamp in milliseconds since epoch.
        timestamp: u128,
        /// Human-readable message.
        message: String,
        /// A stable short code, if any.
        code: Option<String>,
        /// The message path involved, if any.
        path: Option<String>,
        /// A textual cause description, if any.
        cause: Option<String>,
        /// Arbitrary structured data, if any.
        data: Option<Value>,
    },
}

fn classify(input: ErrorInput) -> ErrorRecord {
    match input {
        ErrorInput::Record(record) => record,
        ErrorInput::Raw {
            subsystem,
            error_type,
            timestamp,
            message,
            code,
            path,
            cause,
            data,
        } => {
            let error_type = error_type.unwrap_or(ErrorType::Simple);
            let severity = if matches!(error_type, ErrorType::AuthFailed) {
                Severity::Warn
            } else {
                Severity::Error
            };
            ErrorRecord {
                error_type,
                severity,
                subsystem,
                timestamp,
                metadata: ErrorMetadata {
                    message,
                    code,
                    path,
                    cause,
                    data,
                },
            }
        }
    }
}

/// A filter for [`ErrorManager::query`]: every `Some` field must match.
#[derive(Debug, Clone, Default)]
pub struct ErrorQuery {
    /// Restrict to this error type.
    pub error_type: Option<ErrorType>,
    /// Restrict to this subsystem.
    pub subsystem: Option<SubsystemName>,
    /// Restrict to records with `timestamp >= since`.
    pub since: Option<u128>,
}

impl ErrorQuery {
    fn matches(&self, record: &ErrorRecord) -> bool {
        self.error_type.is_none_or(|t| t == record.error_type)
            && self
                .subsystem
                .as_ref()
                .is_none_or(|s| *s == record.subsystem)
            && self.since.is_none_or(|since| record.timestamp >= since)
    }
}

/// Stores classified errors in a bounded FIFO; recording is non-blocking
/// and overflow silently drops the oldest record (spec.md §4.11).
pub struct ErrorManager {
    records: BoundedQueue<ErrorRecord>,
}

impl ErrorManager {
    /// Creates an error manager with the given history capacity.
    #[must_use]
    pub fn new(capacity: ErrorHistorySize) -> Self {
        Self {
            records: BoundedQueue::new(
                crate::domain_types::QueueCapacity::try_new(capacity.as_usize())
                    .expect("ErrorHistorySize and QueueCapacity share the same valid range"),
                OverflowPolicy::DropOldest,
            ),
        }
    }

    /// Classifies (if needed) and stores `input`, returning the resulting
    /// record. Never blocks; if the history is at capacity the oldest
    /// record is evicted.
    pub fn record(&mut self, input: ErrorInput) -> ErrorRecord {
        let record = classify(input);
        let _ = self.records.enqueue(record.clone());
        record
    }

    /// Returns every stored record matching `query`, oldest first.
    #[must_use]
    pub fn query(&self, query: &ErrorQuery) -> Vec<ErrorRecord> {
        self.records.iter().filter(|r| query.matches(r)).cloned().collect()
    }

    /// The number of records currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsystem(name: &str) -> SubsystemName {
        SubsystemName::try_new(name).unwrap()
    }

    #[test]
    fn raw_input_without_type_falls_back_to_simple() {
        let mut manager = ErrorManager::new(ErrorHistorySize::try_new(10).unwrap());
        let record = manager.record(ErrorInput::Raw {
            subsystem: subsystem("a"),
            error_type: None,
            timestamp: 0,
            message: "boom".to_string(),
            code: None,
            path: None,
            cause: None,
            data: None,
        });
        assert_eq!(record.error_type, ErrorType::Simple);
        assert_eq!(record.severity, Severity::Error);
    }

    #[test]
    fn auth_failed_defaults_to_warn_severity() {
        let mut manager = ErrorManager::new(ErrorHistorySize::try_new(10).unwrap());
        let record = manager.record(ErrorInput::Raw {
            subsystem: subsystem("a"),
            error_type: Some(ErrorType::AuthFailed),
            timestamp: 0,
            message: "bad pkr".to_string(),
            code: None,
            path: None,
            cause: None,
            data: None,
        });
        assert_eq!(record.severity, Severity::Warn);
    }

    #[test]
    fn overflow_drops_oldest_record() {
        let mut manager = ErrorManager::new(ErrorHistorySize::try_new(2).unwrap());
        for i in 0..3u128 {
            manager.record(ErrorInput::Raw {
                subsystem: subsystem("a"),
                error_type: None,
                timestamp: i,
                message: format!("err{i}"),
                code: None,
                path: None,
                cause: None,
                data: None,
            });
        }
        assert_eq!(manager.len(), 2);
        let all = manager.query(&ErrorQuery::default());
        assert_eq!(all[0].timestamp, 1);
        assert_eq!(all[1].timestamp, 2);
    }

    #[test]
    fn query_filters_by_subsystem_and_window() {
        let mut manager = ErrorManager::new(ErrorHistorySize::try_new(10).unwrap());
        manager.record(ErrorInput::Raw {
            subsystem: subsystem("a"),
            error_type: Some(ErrorType::HandlerError),
            timestamp: 10,
            message: "m".to_string(),
            code: None,
            path: None,
            cause: None,
            data: None,
        });
        manager.record(ErrorInput::Raw {
            subsystem: subsystem("b"),
            error_type: Some(ErrorType::HandlerError),
            timestamp: 20,
            message: "m".to_string(),
            code: None,
            path: None,
            cause: None,
            data: None,
        });

        let results = manager.query(&ErrorQuery {
            subsystem: Some(subsystem("a")),
            since: Some(5),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subsystem, subsystem("a"));
    }
}
