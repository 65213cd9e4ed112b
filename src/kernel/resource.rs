//! Resources and their ACLs (spec.md §3, §4.10 step 5).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelError;

use super::principal::Pkr;

/// A single access right over a resource (spec.md §3 `ReaderWriterSet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Right {
    /// Permission to read/query the resource.
    Read,
    /// Permission to write/mutate the resource.
    Write,
    /// Permission to edit the resource's own ACL.
    Grant,
}

/// `{PKR -> rights subset of {r,w,g}}`, with the owner implicitly holding
/// all three (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct ReaderWriterSet {
    owner: Option<Pkr>,
    grants: HashMap<uuid::Uuid, HashSet<Right>>,
}

impl ReaderWriterSet {
    /// Creates an ACL with the given owner, who implicitly holds every
    /// right.
    #[must_use]
    pub fn with_owner(owner: Pkr) -> Self {
        Self {
            owner: Some(owner),
            grants: HashMap::new(),
        }
    }

    /// Grants `rights` to `pkr`, replacing any previous grant.
    pub fn grant(&mut self, pkr: Pkr, rights: HashSet<Right>) {
        self.grants.insert(pkr.uuid(), rights);
    }

    /// The rights `pkr` holds: every right if it is the owner, otherwise
    /// whatever was explicitly granted (empty if never granted).
    #[must_use]
    pub fn rights_for(&self, pkr: &Pkr) -> HashSet<Right> {
        if self.owner.as_ref() == Some(pkr) {
            return [Right::Read, Right::Write, Right::Grant].into_iter().collect();
        }
        self.grants.get(&pkr.uuid()).cloned().unwrap_or_default()
    }

    /// Whether `pkr` holds every right in `required`.
    #[must_use]
    pub fn permits(&self, pkr: &Pkr, required: &[Right]) -> bool {
        let held = self.rights_for(pkr);
        required.iter().all(|right| held.contains(right))
    }
}

/// A named object owned by a principal, with its own ACL (spec.md §3).
pub struct Resource {
    name: String,
    owner: Pkr,
    instance: Value,
    metadata: HashMap<String, Value>,
    acl: ReaderWriterSet,
}

impl Resource {
    /// This resource's name (unique per owner).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning principal's PKR.
    #[must_use]
    pub fn owner(&self) -> Pkr {
        self.owner
    }

    /// The resource's opaque payload.
    #[must_use]
    pub fn instance(&self) -> &Value {
        &self.instance
    }

    /// Arbitrary metadata attached at creation.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// This resource's access control list.
    #[must_use]
    pub fn acl(&self) -> &ReaderWriterSet {
        &self.acl
    }

    /// Grants `rights` to `pkr` on this resource's ACL.
    pub fn grant(&mut self, pkr: Pkr, rights: HashSet<Right>) {
        self.acl.grant(pkr, rights);
    }
}

/// Creates and looks up resources, keyed by `(owner, name)` since a name
/// is only required to be unique per owner (spec.md §3).
#[derive(Default)]
pub struct ResourceRegistry {
    resources: HashMap<(uuid::Uuid, String), Resource>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resource owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateResource`] if `owner` already owns
    /// a resource named `name`.
    pub fn create(
        &mut self,
        owner: Pkr,
        name: impl Into<String>,
        instance: Value,
        metadata: HashMap<String, Value>,
    ) -> Result<(), KernelError> {
        let name = name.into();
        let key = (owner.uuid(), name.clone());
        if self.resources.contains_key(&key) {
            return Err(KernelError::DuplicateResource { name });
        }
        self.resources.insert(
            key,
            Resource {
                name,
                owner,
                instance,
                metadata,
                acl: ReaderWriterSet::with_owner(owner),
            },
        );
        Ok(())
    }

    /// Looks up a resource by owner and name.
    #[must_use]
    pub fn get(&self, owner: &Pkr, name: &str) -> Option<&Resource> {
        self.resources.get(&(owner.uuid(), name.to_string()))
    }

    /// Looks up a resource by name regardless of owner, for the common
    /// case where callers address a resource purely by name (spec.md
    /// §4.10 step 5 doesn't require knowing the owner up front).
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Resource> {
        self.resources.values().find(|r| r.name == name)
    }

    /// Mutable lookup, for ACL edits.
    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.values_mut().find(|r| r.name == name)
    }

    /// Checks whether `pkr` holds every right in `required` on the
    /// resource named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownResource`] if no such resource
    /// exists, or [`KernelError::AccessDenied`] if the rights check fails.
    pub fn check_rights(&self, name: &str, pkr: &Pkr, required: &[Right]) -> Result<(), KernelError> {
        let resource = self
            .find_by_name(name)
            .ok_or_else(|| KernelError::UnknownResource {
                name: name.to_string(),
            })?;
        if resource.acl.permits(pkr, required) {
            Ok(())
        } else {
            Err(KernelError::AccessDenied)
        }
    }
}
