//! Principals and their PKRs (spec.md §3, §4.9).

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KernelError;

/// The kind of identity a [`Principal`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrincipalKind {
    /// The kernel itself; always the first principal registered.
    Kernel,
    /// A user subsystem registered via `registerSubsystem`.
    Subsystem,
    /// An out-of-band caller minted via `createFriend`, not attached to
    /// any subsystem (spec.md §4.12).
    Friend,
    /// A resource's owning identity, when a resource itself needs to act
    /// as a caller.
    Resource,
}

/// A kernel-tracked identity (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    uuid: Uuid,
    kind: PrincipalKind,
    connected: bool,
}

impl Principal {
    fn new(uuid: Uuid, kind: PrincipalKind) -> Self {
        Self {
            uuid,
            kind,
            connected: false,
        }
    }

    /// This principal's unique identity.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// What kind of principal this is.
    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Whether a friend principal is currently connected. Always `false`
    /// for non-friend kinds.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// An immutable handle identifying a [`Principal`], issued by the kernel
/// (spec.md §3 PKR). Equality and hashing are by `uuid` alone, per spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pkr {
    uuid: Uuid,
    kind: PrincipalKind,
    expires_at: Option<u128>,
}

impl Pkr {
    /// This PKR's underlying principal uuid.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The kind of principal this PKR identifies.
    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Whether this PKR has expired as of `now_millis`.
    #[must_use]
    pub fn is_expired(&self, now_millis: u128) -> bool {
        self.expires_at.is_some_and(|expires| now_millis >= expires)
    }
}

impl PartialEq for Pkr {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}
impl Eq for Pkr {}
impl Hash for Pkr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

/// A friend principal minted by `createFriend`: a principal not attached
/// to any subsystem, handed back to the caller for out-of-band use
/// (spec.md §4.12).
#[derive(Debug, Clone)]
pub struct Friend {
    /// The friend's principal record.
    pub principal: Principal,
    /// The friend's PKR, for use in subsequent `sendProtected` calls.
    pub pkr: Pkr,
}

/// Registers principals and their PKRs, and validates callers
/// (spec.md §4.9's `AccessControl` child service, principal half).
#[derive(Debug, Default)]
pub struct PrincipalRegistry {
    principals: HashMap<Uuid, Principal>,
    pkrs: HashMap<Uuid, Pkr>,
}

impl PrincipalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a new principal of `kind`, optionally expiring `ttl_millis`
    /// after `now_millis`. Returns the principal and its PKR.
    pub fn register(
        &mut self,
        kind: PrincipalKind,
        ttl_millis: Option<u128>,
        now_millis: u128,
    ) -> (Principal, Pkr) {
        let uuid = Uuid::new_v4();
        let principal = Principal::new(uuid, kind);
        let expires_at = ttl_millis.map(|ttl| now_millis + ttl);
        let pkr = Pkr {
            uuid,
            kind,
            expires_at,
        };
        self.principals.insert(uuid, principal.clone());
        self.pkrs.insert(uuid, pkr);
        (principal, pkr)
    }

    /// Marks a friend principal connected/disconnected.
    pub fn set_connected(&mut self, uuid: Uuid, connected: bool) {
        if let Some(principal) = self.principals.get_mut(&uuid) {
            principal.connected = connected;
        }
    }

    /// Validates that `pkr` is registered and unexpired
    /// (spec.md §4.10 step 1).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownPrincipal`] if no principal is
    /// registered under `pkr.uuid`, or [`KernelError::AccessDenied`] if it
    /// is registered but expired.
    pub fn validate(&self, pkr: &Pkr, now_millis: u128) -> Result<(), KernelError> {
        let stored = self
            .pkrs
            .get(&pkr.uuid)
            .ok_or(KernelError::UnknownPrincipal)?;
        if stored.is_expired(now_millis) {
            return Err(KernelError::AccessDenied);
        }
        Ok(())
    }

    /// Looks up a principal by uuid.
    #[must_use]
    pub fn principal(&self, uuid: Uuid) -> Option<&Principal> {
        self.principals.get(&uuid)
    }
}
