//! Name -> subsystem map, with the kernel hidden from generic enumeration
//! (spec.md §4.7, component L9).

use std::collections::HashMap;

use crate::domain_types::SubsystemName;
use crate::subsystem::Subsystem;

/// Owns every registered user subsystem, keyed by name. The kernel is
/// never stored here — [`crate::root_router::RootRouter`] special-cases
/// `kernel://*` before consulting this registry (spec.md §4.7 step 2).
#[derive(Default)]
pub struct Registry {
    subsystems: HashMap<SubsystemName, Subsystem>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subsystem under its own name.
    ///
    /// # Panics
    ///
    /// Never panics; silently replaces an existing entry with the same
    /// name (names are validated unique by the coordinator before this is
    /// called, which owns the kernel-minted identity for the old entry).
    pub fn insert(&mut self, subsystem: Subsystem) {
        self.subsystems.insert(subsystem.name().clone(), subsystem);
    }

    /// Whether `name` is already registered.
    #[must_use]
    pub fn contains(&self, name: &SubsystemName) -> bool {
        self.subsystems.contains_key(name)
    }

    /// Looks up a subsystem by name.
    #[must_use]
    pub fn get(&self, name: &SubsystemName) -> Option<&Subsystem> {
        self.subsystems.get(name)
    }

    /// Mutable lookup, used by the root router and scheduler.
    pub fn get_mut(&mut self, name: &SubsystemName) -> Option<&mut Subsystem> {
        self.subsystems.get_mut(name)
    }

    /// Removes a subsystem, returning it for final disposal.
    pub fn remove(&mut self, name: &SubsystemName) -> Option<Subsystem> {
        self.subsystems.remove(name)
    }

    /// Iterates every registered subsystem, in arbitrary order (the
    /// scheduler imposes its own ordering on top of this).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Subsystem> {
        self.subsystems.values_mut()
    }

    /// The names of every registered subsystem, for enumeration surfaces
    /// (e.g. the CLI's `subsystems list`).
    #[must_use]
    pub fn names(&self) -> Vec<SubsystemName> {
        self.subsystems.keys().cloned().collect()
    }

    /// How many subsystems are registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }
}
