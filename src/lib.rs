//! # Junction
//!
//! An in-process, message-driven runtime for composing isolated
//! subsystems over typed, path-routed messages. A [`coordinator::Coordinator`]
//! owns a [`registry::Registry`] of [`subsystem::Subsystem`]s, a privileged
//! [`kernel::Kernel`] that mediates every ACL-checked call, and a
//! [`scheduler::GlobalScheduler`] that drains each subsystem's bounded
//! queue in turn.
//!
//! ## Routing
//!
//! Every message carries a URI-like path (`subsystem://segment/segment`,
//! see [`message::MessagePath`]). [`root_router::RootRouter`] extracts the
//! subsystem prefix, special-cases the kernel, and otherwise delegates to
//! that subsystem's own [`router::Router`] for segment matching.
//!
//! ## Capabilities
//!
//! A subsystem attaches [`facet::Facet`]s — storage, networking,
//! observability, or custom capabilities — built from [`facet::Hook`]s in
//! topological dependency order.
//!
//! ## Request/response
//!
//! [`requests::RequestBuilder`] layers a one-shot await atop the routing
//! primitives: send a message, register a reply waiter, and time out if
//! nothing answers.
//!
//! ```rust
//! use junction::config::RuntimeConfig;
//! use junction::coordinator::Coordinator;
//! use junction::time_provider::test_time_provider;
//!
//! # async fn example() {
//! let coordinator = Coordinator::bootstrap(RuntimeConfig::development(), test_time_provider());
//! let names = coordinator.subsystem_names().await;
//! assert!(names.is_empty());
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod domain_types;
pub mod error;
pub mod error_manager;
pub mod facet;
pub mod kernel;
pub mod listeners;
pub mod message;
pub mod observability;
pub mod queue;
pub mod registry;
pub mod requests;
pub mod root_router;
pub mod router;
pub mod scheduler;
pub mod storage;
pub mod subsystem;
pub mod time_provider;

pub use coordinator::{Coordinator, RegisterOptions, SendResult};
pub use error::{CoordinatorError, ErrorCode};
