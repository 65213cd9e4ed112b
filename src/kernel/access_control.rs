//! Composes the principal and resource registries into the caller
//! validation and rights-check steps of `sendProtected` (spec.md §4.9's
//! `AccessControl` child service, §4.10 steps 1 and 5).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::KernelError;

use super::principal::{Friend, Pkr, Principal, PrincipalKind, PrincipalRegistry};
use super::resource::{ResourceRegistry, Right};

/// Owns the principal and resource registries, and exposes the caller
/// validation / rights-check steps `sendProtected` needs.
#[derive(Default)]
pub struct AccessControl {
    principals: PrincipalRegistry,
    resources: ResourceRegistry,
}

impl AccessControl {
    /// Creates empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a principal + PKR of `kind` (spec.md §4.9 `registerSubsystem`,
    /// `createResource`'s owner, `createFriend`).
    pub fn register_principal(
        &mut self,
        kind: PrincipalKind,
        ttl_millis: Option<u128>,
        now_millis: u128,
    ) -> (Principal, Pkr) {
        self.principals.register(kind, ttl_millis, now_millis)
    }

    /// Mints a standalone friend principal, not attached to any subsystem
    /// (spec.md §4.12).
    pub fn create_friend(&mut self, ttl_millis: Option<u128>, now_millis: u128) -> Friend {
        let (principal, pkr) = self.register_principal(PrincipalKind::Friend, ttl_millis, now_millis);
        Friend { principal, pkr }
    }

    /// Creates a resource owned by `owner`.
    ///
    /// # Errors
    ///
    /// See [`ResourceRegistry::create`].
    pub fn create_resource(
        &mut self,
        owner: Pkr,
        name: impl Into<String>,
        instance: Value,
        metadata: HashMap<String, Value>,
    ) -> Result<(), KernelError> {
        self.resources.create(owner, name, instance, metadata)
    }

    /// Exposes the resource registry for lookups outside the
    /// `sendProtected` path (grants, CRUD).
    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Mutable access to the resource registry, for ACL edits.
    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// spec.md §4.10 step 1: validate `callerPkr` is registered and
    /// unexpired.
    ///
    /// # Errors
    ///
    /// See [`PrincipalRegistry::validate`].
    pub fn validate_caller(&self, caller: &Pkr, now_millis: u128) -> Result<(), KernelError> {
        self.principals.validate(caller, now_millis)
    }

    /// spec.md §4.10 step 5: if the path names a resource, its ACL must
    /// grant `required` rights to `caller` (owner is always permitted by
    /// [`super::resource::ReaderWriterSet::permits`]).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownResource`] if no such resource
    /// exists, or [`KernelError::AccessDenied`] if rights are insufficient.
    pub fn check_resource_rights(
        &self,
        resource_name: &str,
        caller: &Pkr,
        required: &[Right],
    ) -> Result<(), KernelError> {
        self.resources.check_rights(resource_name, caller, required)
    }

    /// Looks up a principal by uuid.
    #[must_use]
    pub fn principal(&self, uuid: uuid::Uuid) -> Option<&Principal> {
        self.principals.principal(uuid)
    }
}
