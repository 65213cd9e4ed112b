//! Channels: named routes shared by an owner and a set of participants
//! (spec.md §3, §4.10 step 4).

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::KernelError;

use super::principal::Pkr;

/// A named communication route, usable by its owner and participants
/// (spec.md §3).
pub struct Channel {
    route: String,
    owner: Pkr,
    participants: HashSet<uuid::Uuid>,
    metadata: HashMap<String, Value>,
}

impl Channel {
    /// The channel's route string, e.g. `subsystem://channel/foo`.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// The channel's owning principal.
    #[must_use]
    pub fn owner(&self) -> Pkr {
        self.owner
    }

    /// Arbitrary metadata attached at creation.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Whether `pkr` may use this channel: owner or a current participant
    /// (spec.md §4.10 step 4).
    #[must_use]
    pub fn permits(&self, pkr: &Pkr) -> bool {
        pkr.uuid() == self.owner.uuid() || self.participants.contains(&pkr.uuid())
    }

    /// Adds a participant.
    pub fn add_participant(&mut self, pkr: Pkr) {
        self.participants.insert(pkr.uuid());
    }

    /// Removes a participant. No-op if never added.
    pub fn remove_participant(&mut self, pkr: &Pkr) {
        self.participants.remove(&pkr.uuid());
    }
}

/// Creates, looks up, and rights-checks [`Channel`]s (spec.md §4.9's
/// `ChannelManager` child service).
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Channel>,
}

impl ChannelManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel at `route`, owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateResource`] if `route` is already
    /// registered.
    pub fn create(
        &mut self,
        route: impl Into<String>,
        owner: Pkr,
        participants: HashSet<uuid::Uuid>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), KernelError> {
        let route = route.into();
        if self.channels.contains_key(&route) {
            return Err(KernelError::DuplicateResource { name: route });
        }
        self.channels.insert(
            route.clone(),
            Channel {
                route,
                owner,
                participants,
                metadata,
            },
        );
        Ok(())
    }

    /// Whether `route` names a registered channel (spec.md §4.10 step 4:
    /// "the path targets a channel").
    #[must_use]
    pub fn recognises(&self, route: &str) -> bool {
        self.channels.contains_key(route)
    }

    /// Looks up a channel by route.
    #[must_use]
    pub fn get(&self, route: &str) -> Option<&Channel> {
        self.channels.get(route)
    }

    /// Mutable lookup, for participant edits.
    pub fn get_mut(&mut self, route: &str) -> Option<&mut Channel> {
        self.channels.get_mut(route)
    }

    /// Enforces spec.md §4.10 step 4: `callerPkr == ownerPkr OR callerPkr
    /// ∈ participants`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownChannel`] if `route` isn't
    /// registered, or [`KernelError::AccessDenied`] if `pkr` is neither
    /// owner nor participant.
    pub fn check_access(&self, route: &str, pkr: &Pkr) -> Result<(), KernelError> {
        let channel = self
            .get(route)
            .ok_or_else(|| KernelError::UnknownChannel {
                route: route.to_string(),
            })?;
        if channel.permits(pkr) {
            Ok(())
        } else {
            Err(KernelError::AccessDenied)
        }
    }
}
