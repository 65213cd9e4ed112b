//! Profiles: named `scope -> rights` maps (spec.md §3).

use std::collections::HashMap;

use super::resource::Right;

/// A named bundle of per-scope rights, attachable to a principal
/// independently of any single resource's ACL (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct Profile {
    name: String,
    scopes: HashMap<String, Vec<Right>>,
}

impl Profile {
    /// Creates an empty profile named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scopes: HashMap::new(),
        }
    }

    /// This profile's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the rights held for `scope`, replacing any previous entry.
    pub fn set_scope(&mut self, scope: impl Into<String>, rights: Vec<Right>) {
        self.scopes.insert(scope.into(), rights);
    }

    /// The rights held for `scope`, if any were set.
    #[must_use]
    pub fn rights_for(&self, scope: &str) -> Option<&[Right]> {
        self.scopes.get(scope).map(Vec::as_slice)
    }

    /// Whether this profile grants every right in `required` for `scope`.
    #[must_use]
    pub fn permits(&self, scope: &str, required: &[Right]) -> bool {
        match self.rights_for(scope) {
            Some(held) => required.iter().all(|r| held.contains(r)),
            None => false,
        }
    }
}

/// Registers named [`Profile`]s (spec.md §4.9's `ProfileRegistry` child
/// service).
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, Profile>,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a profile.
    pub fn upsert(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Looks up a profile by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Removes a profile by name.
    pub fn remove(&mut self, name: &str) -> Option<Profile> {
        self.profiles.remove(name)
    }
}
