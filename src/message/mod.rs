//! The message data model: immutable envelope, fixed/mutable metadata, and
//! the factory that constructs both (spec.md §4.1).

mod envelope;
mod factory;
mod metadata;
mod path;

pub use envelope::Message;
pub use factory::{MessageFactory, TransactionSpec, custom_fields};
pub use metadata::{FixedMeta, MessageOptions, MessageType, MutableMeta, current_timestamp_millis};
pub use path::MessagePath;
