//! The kernel: the privileged, always-synchronous subsystem that mediates
//! every ACL-checked call via `sendProtected` (spec.md §4.9–§4.10,
//! components L12–L13).
//!
//! The kernel never holds a reference to the registry or root router —
//! routing a validated call onward is the caller's job, supplied as a
//! `dispatch` closure, the same way [`crate::subsystem::Subsystem`] hands
//! classified errors back instead of reaching for the kernel directly
//! (spec.md §9's cyclic-reference note).

pub mod access_control;
pub mod channel;
pub mod principal;
pub mod profile;
pub mod resource;
pub mod response_manager;

use serde_json::Value;

use crate::domain_types::{MessageId, SubsystemName};
use crate::error::KernelError;
use crate::error_manager::ErrorManager;
use crate::message::Message;
use crate::subsystem::AcceptOptions;

pub use access_control::AccessControl;
pub use channel::{Channel, ChannelManager};
pub use principal::{Friend, Pkr, Principal, PrincipalKind, PrincipalRegistry};
pub use profile::{Profile, ProfileRegistry};
pub use resource::{ReaderWriterSet, Resource, ResourceRegistry, Right};
pub use response_manager::ResponseManager;

/// Composes the kernel's child services: `AccessControl`, `ErrorManager`,
/// `ResponseManager`, `ChannelManager`, `ProfileRegistry` (spec.md §4.9).
pub struct Kernel {
    pkr: Pkr,
    access_control: AccessControl,
    error_manager: ErrorManager,
    response_manager: ResponseManager,
    channels: ChannelManager,
    profiles: ProfileRegistry,
}

/// The identity handed back to a newly registered subsystem
/// (spec.md §4.9 `registerSubsystem`: `identity = {principal, pkr}`).
#[derive(Debug, Clone, Copy)]
pub struct SubsystemIdentity {
    /// The minted subsystem principal's PKR, attached to the subsystem.
    pub pkr: Pkr,
}

impl Kernel {
    /// Bootstraps the kernel, minting its own `Kernel`-kind principal
    /// first (spec.md §3: "Coordinator bootstrap builds the kernel before
    /// any user subsystem").
    #[must_use]
    pub fn bootstrap(error_history_capacity: crate::domain_types::ErrorHistorySize, now_millis: u128) -> Self {
        let mut access_control = AccessControl::new();
        let (_, pkr) = access_control.register_principal(PrincipalKind::Kernel, None, now_millis);
        Self {
            pkr,
            access_control,
            error_manager: ErrorManager::new(error_history_capacity),
            response_manager: ResponseManager::new(),
            channels: ChannelManager::new(),
            profiles: ProfileRegistry::new(),
        }
    }

    /// The kernel's own PKR.
    #[must_use]
    pub fn pkr(&self) -> Pkr {
        self.pkr
    }

    /// Mints a subsystem principal and returns its identity
    /// (spec.md §4.9 `registerSubsystem`, the principal-minting half; the
    /// coordinator performs the facet build and wrapper narrowing).
    pub fn register_subsystem(&mut self, now_millis: u128) -> SubsystemIdentity {
        let (_, pkr) = self
            .access_control
            .register_principal(PrincipalKind::Subsystem, None, now_millis);
        SubsystemIdentity { pkr }
    }

    /// Mints a standalone friend principal (spec.md §4.12).
    pub fn create_friend(&mut self, ttl_millis: Option<u128>, now_millis: u128) -> Friend {
        self.access_control.create_friend(ttl_millis, now_millis)
    }

    /// Creates a resource owned by `owner` (spec.md §4.9 `createResource`).
    ///
    /// # Errors
    ///
    /// See [`access_control::AccessControl::create_resource`].
    pub fn create_resource(
        &mut self,
        owner: Pkr,
        name: impl Into<String>,
        instance: Value,
        metadata: std::collections::HashMap<String, Value>,
    ) -> Result<(), KernelError> {
        self.access_control.create_resource(owner, name, instance, metadata)
    }

    /// Registers a channel (profile/channel CRUD mirrors, spec.md §4.9).
    ///
    /// # Errors
    ///
    /// See [`ChannelManager::create`].
    pub fn create_channel(
        &mut self,
        route: impl Into<String>,
        owner: Pkr,
        participants: std::collections::HashSet<uuid::Uuid>,
        metadata: std::collections::HashMap<String, Value>,
    ) -> Result<(), KernelError> {
        self.channels.create(route, owner, participants, metadata)
    }

    /// Inserts or replaces a named profile.
    pub fn upsert_profile(&mut self, profile: Profile) {
        self.profiles.upsert(profile);
    }

    /// This kernel's error manager, for recording and querying classified
    /// errors forwarded by subsystem `process` calls.
    pub fn error_manager_mut(&mut self) -> &mut ErrorManager {
        &mut self.error_manager
    }

    /// Read-only access to the error manager.
    #[must_use]
    pub fn error_manager(&self) -> &ErrorManager {
        &self.error_manager
    }

    /// Registers a one-shot reply waiter, returning the receiver half the
    /// caller awaits (spec.md §5 response overlay).
    pub fn register_reply_waiter(&mut self, message_id: MessageId) -> tokio::sync::oneshot::Receiver<Value> {
        self.response_manager.register(message_id)
    }

    /// Drops a reply waiter without resolving it, used by
    /// [`crate::requests::RequestBuilder`] once its timeout elapses so a
    /// later, stale reply doesn't resolve a receiver nobody is awaiting.
    pub fn unregister_reply_waiter(&mut self, message_id: &MessageId) {
        self.response_manager.unregister(message_id);
    }

    /// The ACL subsystem's access to its channel manager, for the
    /// coordinator's direct CRUD surface.
    pub fn channels_mut(&mut self) -> &mut ChannelManager {
        &mut self.channels
    }

    /// Executes the `sendProtected` algorithm (spec.md §4.10):
    ///
    /// 1. Validate `caller` is registered and unexpired.
    /// 2. Strip any caller-supplied `callerId`, stamping `opts.caller_id`
    ///    and `opts.caller_id_set_by` with the kernel's own identity.
    /// 3. If the path is a one-shot reply route, resolve it directly
    ///    instead of dispatching further.
    /// 4. If the path names a registered channel, require owner or
    ///    participant membership.
    /// 5. If the path names a registered resource, require sufficient
    ///    rights (read for queries, write otherwise).
    /// 6. Dispatch the call onward via `dispatch` and return its result.
    ///
    /// `dispatch` receives `self` reborrowed, so it can route onward
    /// through [`crate::root_router::RootRouter::route`] (which itself
    /// needs `&mut Kernel` for error recording) without the caller having
    /// to juggle a second kernel borrow.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::AccessDenied`] if the caller is unauthorised
    /// at any checked step, or whatever `dispatch` itself returns.
    pub fn send_protected(
        &mut self,
        caller: Pkr,
        mut msg: Message,
        mut opts: AcceptOptions,
        now_millis: u128,
        dispatch: impl FnOnce(Message, AcceptOptions, &mut Kernel) -> Result<Value, KernelError>,
    ) -> Result<Value, KernelError> {
        self.access_control.validate_caller(&caller, now_millis)?;

        opts.caller_id = Some(caller.uuid().to_string());
        opts.caller_id_set_by = Some(self.pkr.uuid().to_string());

        if msg.path().is_reply() {
            if let Some(message_id) = reply_message_id(&msg) {
                if self.response_manager.is_registered(&message_id) {
                    let body = msg.body().clone();
                    self.response_manager.resolve(&message_id, body.clone());
                    return Ok(body);
                }
            }
        }

        let path = msg.path().as_str().to_string();
        if self.channels.recognises(&path) {
            self.channels.check_access(&path, &caller)?;
        } else if let Some(resource_name) = msg
            .path()
            .segments()
            .into_iter()
            .find(|segment| self.access_control.resources().find_by_name(segment).is_some())
        {
            let required = if msg.fixed().is_query() {
                [Right::Read].to_vec()
            } else {
                [Right::Write].to_vec()
            };
            self.access_control
                .check_resource_rights(resource_name, &caller, &required)?;
        }

        dispatch(msg, opts, self)
    }

    /// Whether `name` is the kernel's own reserved subsystem name
    /// (spec.md §4.7 step 2: `kernel://*` is special-cased out of the
    /// generic registry).
    #[must_use]
    pub fn is_kernel_route(name: &str) -> bool {
        name == "kernel"
    }
}

fn reply_message_id(msg: &Message) -> Option<MessageId> {
    let segments = msg.path().segments();
    let raw = *segments.get(1)?;
    uuid::Uuid::parse_str(raw).ok().map(MessageId::from)
}

/// Marker so `registry.rs` can recognise [`SubsystemName`]s without
/// importing kernel internals beyond this one check.
#[must_use]
pub fn reserved_name() -> SubsystemName {
    SubsystemName::try_new("kernel").expect("\"kernel\" satisfies the subsystem name grammar")
}
