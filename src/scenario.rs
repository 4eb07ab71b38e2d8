//! The read-only inputs of a run: population, facilities and weekly trajectories.
//!
//! A `Scenario` is built once and shared between the runs of a batch behind an `Arc`; nothing
//! in it changes during a run.
use std::path::Path;

use chrono::Weekday;
use log::{info, warn};
use serde::de::DeserializeOwned;

use crate::activity::Activities;
use crate::container::{ContainerId, FacilityRecord};
use crate::error::EpisimError;
use crate::hashing::{HashMap, HashMapExt};
use crate::people::{PersonId, PersonRecord};
use crate::trajectory::{EventRecord, MobilityEvent, TrajectorySource, WeeklyTrajectories};

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, EpisimError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Reads `id,age,household,region` rows.
pub fn read_persons(path: &Path) -> Result<Vec<PersonRecord>, EpisimError> {
    read_csv(path)
}

/// Reads `id,spaces,capacity,region` rows.
pub fn read_facilities(path: &Path) -> Result<Vec<FacilityRecord>, EpisimError> {
    read_csv(path)
}

/// Reads `weekday,time,person,facility,activity,kind` rows.
pub fn read_events(path: &Path) -> Result<Vec<EventRecord>, EpisimError> {
    read_csv(path)
}

pub struct Scenario {
    persons: Vec<PersonRecord>,
    facilities: Vec<FacilityRecord>,
    facility_index: HashMap<String, ContainerId>,
    trajectories: Box<dyn TrajectorySource>,
}

impl Scenario {
    /// Resolves the events against persons, facilities and `activities`. Events naming an
    /// unknown person or facility are skipped; an unknown activity is a configuration error.
    pub fn new(
        persons: Vec<PersonRecord>,
        facilities: Vec<FacilityRecord>,
        events: &[EventRecord],
        activities: &Activities,
    ) -> Result<Self, EpisimError> {
        let mut person_index: HashMap<String, PersonId> = HashMap::with_capacity(persons.len());
        for (i, person) in persons.iter().enumerate() {
            let id = PersonId(u32::try_from(i).map_err(|_| "too many persons")?);
            if person_index.insert(person.id.clone(), id).is_some() {
                return Err(EpisimError::config(format!("duplicate person id `{}`", person.id)));
            }
        }
        let mut facility_index: HashMap<String, ContainerId> =
            HashMap::with_capacity(facilities.len());
        for (i, facility) in facilities.iter().enumerate() {
            let id = ContainerId(u32::try_from(i).map_err(|_| "too many facilities")?);
            if facility_index.insert(facility.id.clone(), id).is_some() {
                return Err(EpisimError::config(format!(
                    "duplicate facility id `{}`",
                    facility.id
                )));
            }
        }

        let mut resolved = Vec::with_capacity(events.len());
        let mut skipped = 0usize;
        for record in events {
            let activity = activities.id(&record.activity).ok_or_else(|| {
                EpisimError::config(format!(
                    "events use activity `{}` which is not configured",
                    record.activity
                ))
            })?;
            let (Some(person), Some(container)) = (
                person_index.get(&record.person),
                facility_index.get(&record.facility),
            ) else {
                warn!(
                    "skipping event of unknown person `{}` or facility `{}`",
                    record.person, record.facility
                );
                skipped += 1;
                continue;
            };
            resolved.push((
                record.weekday,
                MobilityEvent {
                    time: record.time,
                    person: *person,
                    container: *container,
                    activity,
                    kind: record.kind,
                },
            ));
        }
        info!(
            "Scenario with {} persons, {} facilities and {} events ({skipped} skipped)",
            persons.len(),
            facilities.len(),
            resolved.len()
        );
        Ok(Scenario {
            persons,
            facilities,
            facility_index,
            trajectories: Box::new(WeeklyTrajectories::new(resolved)),
        })
    }

    /// Loads the three CSV files.
    pub fn from_files(
        persons: &Path,
        facilities: &Path,
        events: &Path,
        activities: &Activities,
    ) -> Result<Self, EpisimError> {
        Scenario::new(
            read_persons(persons)?,
            read_facilities(facilities)?,
            &read_events(events)?,
            activities,
        )
    }

    /// Uses already resolved trajectories.
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_trajectories(
        persons: Vec<PersonRecord>,
        facilities: Vec<FacilityRecord>,
        trajectories: Box<dyn TrajectorySource>,
    ) -> Self {
        let facility_index = facilities
            .iter()
            .enumerate()
            .map(|(i, facility)| (facility.id.clone(), ContainerId(i as u32)))
            .collect();
        Scenario {
            persons,
            facilities,
            facility_index,
            trajectories,
        }
    }

    #[must_use]
    pub fn persons(&self) -> &[PersonRecord] {
        &self.persons
    }

    #[must_use]
    pub fn facility(&self, id: ContainerId) -> Option<&FacilityRecord> {
        self.facilities.get(id.0 as usize)
    }

    #[must_use]
    pub fn facility_id(&self, name: &str) -> Option<ContainerId> {
        self.facility_index.get(name).copied()
    }

    #[must_use]
    pub fn num_facilities(&self) -> usize {
        self.facilities.len()
    }

    #[must_use]
    pub fn events(&self, weekday: Weekday) -> &[MobilityEvent] {
        self.trajectories.events(weekday)
    }
}
