//! Contact tracing and quarantine.
//!
//! Reaching the trigger status schedules a tracing task `delay_days` later. A task walks the
//! index person's recorded contacts of the last `distance_days` (plus, optionally, the index
//! household) and quarantines them. The number of contacts looked at per day can be capped; the
//! cap is consumed oldest contact first.
use chrono::NaiveDate;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::calendar::SECONDS_PER_DAY;
use crate::error::EpisimError;
use crate::hashing::{HashMap, HashMapExt};
use crate::people::{DiseaseStatus, PersonId, PersonRegistry, QuarantineStatus};
use crate::progression::StatusChange;
use crate::schedule::DayQueue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Tracing is off when unset.
    pub start_date: Option<NaiveDate>,
    pub trigger: DiseaseStatus,
    pub delay_days: u32,
    /// How far back contacts are traced.
    pub distance_days: u32,
    /// Chance a contact outside the household is reached.
    pub probability: f64,
    /// Contacts processed per day at full population scale.
    pub capacity: Option<u32>,
    /// Shorter contacts are not recorded.
    pub min_contact_duration: f64,
    pub household_quarantine: bool,
    pub quarantine_status: QuarantineStatus,
    pub quarantine_duration_days: u32,
    /// Applied to the index person on reaching the trigger status.
    pub symptomatic_quarantine: Option<QuarantineStatus>,
    pub max_recorded_contacts: usize,
    /// Share of persons carrying a tracing device.
    pub equipment_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig {
            start_date: None,
            trigger: DiseaseStatus::ShowingSymptoms,
            delay_days: 0,
            distance_days: 4,
            probability: 1.0,
            capacity: None,
            min_contact_duration: 900.0,
            household_quarantine: true,
            quarantine_status: QuarantineStatus::AtHome,
            quarantine_duration_days: 14,
            symptomatic_quarantine: Some(QuarantineStatus::Full),
            max_recorded_contacts: 200,
            equipment_rate: 1.0,
        }
    }
}

impl TracingConfig {
    pub fn validate(&self) -> Result<(), EpisimError> {
        for (name, value) in [
            ("probability", self.probability),
            ("equipment rate", self.equipment_rate),
        ] {
            if value.is_nan() || !(0.0..=1.0).contains(&value) {
                return Err(EpisimError::config(format!(
                    "tracing {name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.min_contact_duration.is_nan() || self.min_contact_duration < 0.0 {
            return Err(EpisimError::config("negative minimum contact duration"));
        }
        if self.quarantine_status == QuarantineStatus::No {
            return Err(EpisimError::config(
                "tracing must quarantine contacts at home or fully",
            ));
        }
        Ok(())
    }
}

/// A pending trace of `index`'s contacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracingTask {
    pub index: PersonId,
    /// When the index person reached the trigger status
    pub trigger_time: f64,
}

/// A quarantine status change, as reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarantineChange {
    pub person: PersonId,
    pub day: u32,
    pub from: QuarantineStatus,
    pub to: QuarantineStatus,
}

struct Candidate {
    person: PersonId,
    last_contact: f64,
    household: bool,
}

pub struct ContactTracer {
    config: TracingConfig,
    start_day: Option<u32>,
    daily_capacity: Option<usize>,
    queue: DayQueue<TracingTask>,
}

impl ContactTracer {
    /// `sample_size` scales the daily capacity to the simulated population.
    pub fn new(
        config: &TracingConfig,
        start_date: NaiveDate,
        sample_size: f64,
    ) -> Result<Self, EpisimError> {
        config.validate()?;
        let start_day = config.start_date.map(|date| {
            let offset = (date - start_date).num_days() + 1;
            u32::try_from(offset.max(1)).unwrap_or(u32::MAX)
        });
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let daily_capacity = config
            .capacity
            .map(|capacity| (f64::from(capacity) * sample_size).round().max(0.0) as usize);
        if let Some(day) = start_day {
            info!(
                "Contact tracing starts on day {day} with capacity {}",
                daily_capacity.map_or("unlimited".to_string(), |c| c.to_string())
            );
        }
        Ok(ContactTracer {
            config: config.clone(),
            start_day,
            daily_capacity,
            queue: DayQueue::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    #[must_use]
    pub fn is_active(&self, day: u32) -> bool {
        self.start_day.is_some_and(|start| day >= start)
    }

    /// Reacts to a disease status change: self-isolation of the index person and scheduling of
    /// the trace.
    pub fn on_status_change(
        &mut self,
        persons: &mut PersonRegistry,
        change: &StatusChange,
        day: u32,
    ) -> Vec<QuarantineChange> {
        let mut changes = Vec::new();
        if change.to != self.config.trigger || !self.is_active(day) {
            return changes;
        }
        if let Some(status) = self.config.symptomatic_quarantine {
            changes.extend(quarantine(persons, change.person, status, day));
        }
        self.queue.add(
            day + self.config.delay_days,
            TracingTask {
                index: change.person,
                trigger_time: change.time,
            },
        );
        changes
    }

    /// Runs every trace due on `day`.
    pub fn run_due<R: Rng>(
        &mut self,
        persons: &mut PersonRegistry,
        day: u32,
        rng: &mut R,
    ) -> Vec<QuarantineChange> {
        let tasks = self.queue.pop_due(day);
        let mut changes = Vec::new();
        if tasks.is_empty() || !self.is_active(day) {
            return changes;
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut positions: HashMap<PersonId, usize> = HashMap::new();
        let mut add = |candidates: &mut Vec<Candidate>, candidate: Candidate| {
            match positions.get(&candidate.person) {
                Some(&i) => {
                    let existing = &mut candidates[i];
                    existing.last_contact = existing.last_contact.min(candidate.last_contact);
                    existing.household |= candidate.household;
                }
                None => {
                    positions.insert(candidate.person, candidates.len());
                    candidates.push(candidate);
                }
            }
        };
        for task in &tasks {
            let Some(index) = persons.get(task.index) else {
                continue;
            };
            let since = task.trigger_time - f64::from(self.config.distance_days) * SECONDS_PER_DAY;
            for (person, last_contact) in index.traceable_contacts_since(since) {
                add(
                    &mut candidates,
                    Candidate {
                        person,
                        last_contact,
                        household: false,
                    },
                );
            }
            if self.config.household_quarantine {
                for person in persons.household_members(task.index) {
                    add(
                        &mut candidates,
                        Candidate {
                            person,
                            last_contact: task.trigger_time,
                            household: true,
                        },
                    );
                }
            }
        }
        candidates.sort_by(|a, b| {
            a.last_contact
                .total_cmp(&b.last_contact)
                .then(a.person.cmp(&b.person))
        });

        let capacity = self.daily_capacity.unwrap_or(usize::MAX);
        if candidates.len() > capacity {
            debug!(
                "Day {day}: tracing capacity {capacity} reached, {} contacts not traced",
                candidates.len() - capacity
            );
        }
        let probability = self.config.probability;
        for candidate in candidates.into_iter().take(capacity) {
            if !candidate.household && probability < 1.0 && rng.random::<f64>() >= probability {
                continue;
            }
            changes.extend(quarantine(
                persons,
                candidate.person,
                self.config.quarantine_status,
                day,
            ));
        }
        changes
    }

    /// Ends every quarantine that has lasted `quarantine_duration_days`.
    pub fn release_due(&self, persons: &mut PersonRegistry, day: u32) -> Vec<QuarantineChange> {
        let duration = self.config.quarantine_duration_days;
        persons
            .iter_mut()
            .filter(|person| person.days_in_quarantine(day).is_some_and(|d| d >= duration))
            .map(|person| {
                let from = person.quarantine();
                person.set_quarantine(QuarantineStatus::No, day);
                QuarantineChange {
                    person: person.id(),
                    day,
                    from,
                    to: QuarantineStatus::No,
                }
            })
            .collect()
    }

    /// Forgets contacts too old to be traced by any task still to come.
    pub fn clear_old_contacts(&self, persons: &mut PersonRegistry, day: u32) {
        let horizon = self.config.delay_days + self.config.distance_days + 1;
        let Some(before_day) = day.checked_sub(horizon) else {
            return;
        };
        let before = f64::from(before_day) * SECONDS_PER_DAY;
        for person in persons.iter_mut() {
            person.clear_traceable_contacts_before(before);
        }
    }

    #[must_use]
    pub fn pending(&self) -> Vec<(u32, TracingTask)> {
        self.queue.pending()
    }

    pub fn restore_pending(&mut self, pending: Vec<(u32, TracingTask)>) {
        self.queue = DayQueue::from_pending(pending);
    }
}

/// Recovered persons and persons already in quarantine are left alone.
fn quarantine(
    persons: &mut PersonRegistry,
    id: PersonId,
    status: QuarantineStatus,
    day: u32,
) -> Option<QuarantineChange> {
    let person = persons.get_mut(id)?;
    if person.quarantine() != QuarantineStatus::No
        || person.status() == DiseaseStatus::Recovered
    {
        return None;
    }
    person.set_quarantine(status, day);
    Some(QuarantineChange {
        person: id,
        day,
        from: QuarantineStatus::No,
        to: status,
    })
}
