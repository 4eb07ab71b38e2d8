//! Initial infections imported from outside the simulated population.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::calendar::SECONDS_PER_DAY;
use crate::error::EpisimError;
use crate::people::{DiseaseStatus, PersonId, PersonRegistry};
use crate::strain::{StrainId, Strains};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingSchedule {
    pub strain: String,
    pub per_day: BTreeMap<NaiveDate, u32>,
    pub lower_age: u8,
    pub upper_age: u8,
}

impl Default for SeedingSchedule {
    fn default() -> Self {
        SeedingSchedule {
            strain: String::new(),
            per_day: BTreeMap::new(),
            lower_age: 0,
            upper_age: u8::MAX,
        }
    }
}

/// Picks `n` of `candidates` (sorted by id) and returns them in id order. Takes everyone without
/// drawing when there are not more candidates than requested.
pub(crate) fn choose<R: Rng>(candidates: &[PersonId], n: usize, rng: &mut R) -> Vec<PersonId> {
    if n >= candidates.len() {
        return candidates.to_vec();
    }
    let mut picked: Vec<PersonId> = sample(rng, candidates.len(), n)
        .into_iter()
        .map(|i| candidates[i])
        .collect();
    picked.sort();
    picked
}

pub struct Seeding {
    schedules: Vec<(StrainId, SeedingSchedule)>,
}

impl Seeding {
    pub fn new(schedules: &[SeedingSchedule], strains: &Strains) -> Result<Self, EpisimError> {
        let schedules = schedules
            .iter()
            .map(|schedule| {
                if schedule.lower_age > schedule.upper_age {
                    return Err(EpisimError::config(format!(
                        "initial infections of {}: age band {}..={} is empty",
                        schedule.strain, schedule.lower_age, schedule.upper_age
                    )));
                }
                Ok((strains.require(&schedule.strain)?, schedule.clone()))
            })
            .collect::<Result<Vec<_>, EpisimError>>()?;
        Ok(Seeding { schedules })
    }

    /// Infects the persons seeded for `date` at the start of `day`.
    pub fn seed<R: Rng>(
        &self,
        persons: &mut PersonRegistry,
        day: u32,
        date: NaiveDate,
        rng: &mut R,
    ) -> Vec<(PersonId, StrainId)> {
        let mut seeded = Vec::new();
        for (strain, schedule) in &self.schedules {
            let Some(&count) = schedule.per_day.get(&date) else {
                continue;
            };
            let candidates: Vec<PersonId> = persons
                .iter()
                .filter(|p| {
                    p.status() == DiseaseStatus::Susceptible
                        && (schedule.lower_age..=schedule.upper_age).contains(&p.age())
                })
                .map(|p| p.id())
                .collect();
            if candidates.len() < count as usize {
                warn!(
                    "{date}: {count} initial infections of {} requested, only {} persons eligible",
                    schedule.strain,
                    candidates.len()
                );
            }
            for id in choose(&candidates, count as usize, rng) {
                if let Some(person) = persons.get_mut(id) {
                    person.set_status(
                        DiseaseStatus::InfectedButNotContagious,
                        f64::from(day) * SECONDS_PER_DAY,
                    );
                    person.add_infection(*strain, day);
                    seeded.push((id, *strain));
                }
            }
        }
        seeded
    }
}
