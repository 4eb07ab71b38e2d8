//! Facilities and vehicles, and the per-day containers built from them.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityId;
use crate::people::PersonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u32);

/// Static facility attributes from the facility file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub id: String,
    /// Overrides the activity's default number of spaces.
    #[serde(default)]
    pub spaces: Option<f64>,
    /// Typical number of occupants; the group size of the symmetric infection model.
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub region: Option<String>,
}

/// The co-present persons of one facility or vehicle on one day.
#[derive(Debug, Clone)]
pub struct Container {
    id: ContainerId,
    activity: ActivityId,
    spaces: f64,
    /// Typical occupancy in simulated persons, if the facility declares one.
    capacity: Option<usize>,
    /// Members in order of entry, with absolute entry time.
    members: Vec<(PersonId, f64)>,
    peak_occupancy: usize,
}

impl Container {
    #[must_use]
    pub fn new(
        id: ContainerId,
        activity: ActivityId,
        spaces: f64,
        capacity: Option<usize>,
    ) -> Self {
        Container {
            id,
            activity,
            spaces: spaces.max(1.0),
            capacity,
            members: Vec::new(),
            peak_occupancy: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    #[must_use]
    pub fn activity(&self) -> ActivityId {
        self.activity
    }

    #[must_use]
    pub fn spaces(&self) -> f64 {
        self.spaces
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// The typical capacity, or the peak occupancy for facilities without one.
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.capacity.unwrap_or(self.peak_occupancy)
    }

    /// Adds `person` at absolute time `time`. A person already inside keeps the earlier entry.
    pub fn enter(&mut self, person: PersonId, time: f64) {
        if self.contains(person) {
            return;
        }
        self.members.push((person, time));
        self.peak_occupancy = self.peak_occupancy.max(self.members.len());
    }

    /// Removes `person`, returning its entry time.
    pub fn leave(&mut self, person: PersonId) -> Option<f64> {
        let position = self.members.iter().position(|(id, _)| *id == person)?;
        Some(self.members.remove(position).1)
    }

    #[must_use]
    pub fn contains(&self, person: PersonId) -> bool {
        self.members.iter().any(|(id, _)| *id == person)
    }

    #[must_use]
    pub fn entry_time(&self, person: PersonId) -> Option<f64> {
        self.members
            .iter()
            .find(|(id, _)| *id == person)
            .map(|(_, time)| *time)
    }

    /// Members in order of entry.
    #[must_use]
    pub fn members(&self) -> &[(PersonId, f64)] {
        &self.members
    }

    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.members.len()
    }

    /// The largest number of simultaneous members seen today.
    #[must_use]
    pub fn peak_occupancy(&self) -> usize {
        self.peak_occupancy
    }
}

/// All containers of the current day.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<ContainerId, Container>,
}

impl ContainerRegistry {
    #[must_use]
    pub fn new() -> Self {
        ContainerRegistry::default()
    }

    /// The container with `id`, created with the given attributes on first use.
    pub fn get_or_create(
        &mut self,
        id: ContainerId,
        activity: ActivityId,
        spaces: f64,
        capacity: Option<usize>,
    ) -> &mut Container {
        self.containers
            .entry(id)
            .or_insert_with(|| Container::new(id, activity, spaces, capacity))
    }

    #[must_use]
    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn get_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.containers.get_mut(&id)
    }

    /// Everyone still inside, by container id and then entry order.
    #[must_use]
    pub fn remaining_members(&self) -> Vec<(ContainerId, PersonId)> {
        self.containers
            .values()
            .flat_map(|container| {
                container
                    .members()
                    .iter()
                    .map(move |(person, _)| (container.id(), *person))
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn clear(&mut self) {
        self.containers.clear();
    }
}
