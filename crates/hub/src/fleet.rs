// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named device fleets and the membership oracle the dispatcher consults.
//!
//! Fleets are externally managed sets of device ids. Membership may change
//! concurrently with a fan-out; the dispatcher snapshots it once at send
//! time via [`GroupDirectory::members_of`].

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::state::epoch_ms;

/// Read-only membership oracle: expand a fleet id to its member list, or
/// `None` when the fleet does not exist.
pub trait GroupDirectory: Send + Sync {
    fn members_of(&self, fleet_id: &str) -> Option<Vec<String>>;
}

/// One named fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fleet {
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
    pub created_at_ms: u64,
}

/// In-memory fleet table with CRUD for the admin ingress.
pub struct FleetStore {
    fleets: RwLock<HashMap<String, Fleet>>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self { fleets: RwLock::new(HashMap::new()) }
    }

    /// Insert or replace a fleet. Members are deduplicated, order
    /// preserved, empty ids dropped.
    pub fn upsert(&self, id: Option<String>, name: String, members: Vec<String>) -> Fleet {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let fleet = Fleet {
            id: id.clone(),
            name,
            members: dedup_members(members),
            created_at_ms: epoch_ms(),
        };
        self.fleets.write().insert(id, fleet.clone());
        fleet
    }

    pub fn get(&self, id: &str) -> Option<Fleet> {
        self.fleets.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Fleet> {
        let mut fleets: Vec<Fleet> = self.fleets.read().values().cloned().collect();
        fleets.sort_by(|a, b| a.id.cmp(&b.id));
        fleets
    }

    /// Remove a fleet; returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.fleets.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.fleets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fleets.read().is_empty()
    }
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupDirectory for FleetStore {
    fn members_of(&self, fleet_id: &str) -> Option<Vec<String>> {
        self.fleets.read().get(fleet_id).map(|f| f.members.clone())
    }
}

fn dedup_members(members: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    members.into_iter().filter(|m| !m.is_empty() && seen.insert(m.clone())).collect()
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod tests;
