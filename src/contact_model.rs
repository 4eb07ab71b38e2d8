//! Transmission between persons sharing a container.
//!
//! Contacts are evaluated when a person leaves a container: the leaving person is paired with
//! every other member still inside, in person id order, and each pair's joint presence time
//! drives the hazard of [`InfectionModel`]. A leaving person is party to at most one successful
//! transmission per day.
use log::trace;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityId, Activities};
use crate::calendar::SECONDS_PER_DAY;
use crate::container::{Container, ContainerId};
use crate::immunity::AntibodyModel;
use crate::infection_model::{Exposure, InfectionModel};
use crate::mask::MaskModel;
use crate::people::{DiseaseStatus, Person, PersonId, PersonRegistry};
use crate::restriction::Restriction;
use crate::strain::{StrainId, Strains};

/// A successful transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionEvent {
    pub target: PersonId,
    pub infector: PersonId,
    /// Absolute time in seconds
    pub time: f64,
    pub container: ContainerId,
    pub activity: ActivityId,
    pub strain: StrainId,
    pub probability: f64,
}

/// Everything the contact model reads that changes from day to day.
pub struct ContactEnv<'a> {
    pub day: u32,
    pub activities: &'a Activities,
    /// Indexed by `ActivityId`
    pub restrictions: &'a [Restriction],
    /// Seasonality multiplier, indexed by `ActivityId`
    pub seasonality: &'a [f64],
    pub strains: &'a Strains,
    pub antibodies: &'a AntibodyModel,
    pub masks: &'a MaskModel,
    /// Contacts are recorded for tracing.
    pub tracing_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactModel {
    calibration: f64,
    max_contacts: Option<usize>,
    min_contact_duration: f64,
    max_recorded_contacts: usize,
    infection_model: InfectionModel,
}

impl ContactModel {
    #[must_use]
    pub fn new(
        calibration: f64,
        max_contacts: Option<usize>,
        min_contact_duration: f64,
        max_recorded_contacts: usize,
        infection_model: InfectionModel,
    ) -> Self {
        ContactModel {
            calibration,
            max_contacts,
            min_contact_duration,
            max_recorded_contacts,
            infection_model,
        }
    }

    #[must_use]
    pub fn infection_model(&self) -> &InfectionModel {
        &self.infection_model
    }

    /// Evaluates the contacts of `leaving` as it leaves `container` at absolute time
    /// `leave_time`. Only records contacts when `allow_transmission` is false.
    #[allow(clippy::too_many_arguments)]
    pub fn infect<R: Rng>(
        &self,
        env: &ContactEnv,
        persons: &mut PersonRegistry,
        container: &Container,
        leaving: PersonId,
        leave_time: f64,
        allow_transmission: bool,
        rng: &mut R,
    ) -> Vec<InfectionEvent> {
        let mut events = Vec::new();
        if container.occupancy() <= 1 {
            return events;
        }
        let Some(leaving_entry) = container.entry_time(leaving) else {
            return events;
        };
        let activity = container.activity();
        let open = Restriction::open();
        let restriction = env
            .restrictions
            .get(usize::from(activity.0))
            .unwrap_or(&open);
        let trackable = env.tracing_active && env.activities.params(activity).trackable;
        let day_start = f64::from(env.day) * SECONDS_PER_DAY;

        for (other, other_entry) in self.sample_contacts(container, leaving, restriction, rng) {
            let start = leaving_entry.max(other_entry);
            let overlap = leave_time - start;
            if overlap <= 0.0 {
                continue;
            }
            let closed = restriction.closed_seconds(start - day_start, leave_time - day_start);
            let joint = overlap - closed;
            if joint <= 0.0 {
                continue;
            }

            if trackable && joint >= self.min_contact_duration {
                if let Some((a, b)) = persons.pair_mut(leaving, other) {
                    if a.is_traceable() && b.is_traceable() {
                        a.add_traceable_contact(other, leave_time, self.max_recorded_contacts);
                        b.add_traceable_contact(leaving, leave_time, self.max_recorded_contacts);
                    }
                }
            }

            if !allow_transmission || !events.is_empty() {
                continue;
            }
            let (Some(leaving_person), Some(other_person)) =
                (persons.get(leaving), persons.get(other))
            else {
                continue;
            };
            let (infector, target) = match (leaving_person.status(), other_person.status()) {
                (infector, DiseaseStatus::Susceptible) if infector.is_infectious() => {
                    (leaving_person, other_person)
                }
                (DiseaseStatus::Susceptible, infector) if infector.is_infectious() => {
                    (other_person, leaving_person)
                }
                _ => continue,
            };
            let Some(strain) = infector.current_strain() else {
                continue;
            };
            let exposure = self.exposure(
                env,
                container,
                restriction,
                infector,
                target,
                strain,
                joint,
                leave_time,
            );
            let probability = self.infection_model.probability(&exposure);
            trace!(
                "{:?} -> {:?} in {:?}: joint={joint}s p={probability}",
                infector.id(),
                target.id(),
                container.id()
            );
            if probability <= 0.0 || rng.random::<f64>() >= probability {
                continue;
            }

            let (infector_id, target_id) = (infector.id(), target.id());
            if let Some(target) = persons.get_mut(target_id) {
                target.set_status(DiseaseStatus::InfectedButNotContagious, leave_time);
                target.add_infection(strain, env.day);
            }
            events.push(InfectionEvent {
                target: target_id,
                infector: infector_id,
                time: leave_time,
                container: container.id(),
                activity,
                strain,
                probability,
            });
        }
        events
    }

    /// The other members to pair with `leaving`, in person id order. A group-size cap or a
    /// contact limit below the number of members picks a random subset.
    fn sample_contacts<R: Rng>(
        &self,
        container: &Container,
        leaving: PersonId,
        restriction: &Restriction,
        rng: &mut R,
    ) -> Vec<(PersonId, f64)> {
        let mut others: Vec<(PersonId, f64)> = container
            .members()
            .iter()
            .filter(|(id, _)| *id != leaving)
            .copied()
            .collect();
        others.sort_by_key(|(id, _)| *id);

        let mut limit = self.max_contacts.unwrap_or(usize::MAX);
        if let Some(cap) = restriction.group_size_cap {
            let cap = cap as usize;
            if container.occupancy() > cap {
                limit = limit.min(cap.saturating_sub(1));
            }
        }
        if others.len() <= limit {
            return others;
        }
        let mut chosen = sample(rng, others.len(), limit).into_vec();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| others[i]).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn exposure(
        &self,
        env: &ContactEnv,
        container: &Container,
        restriction: &Restriction,
        infector: &Person,
        target: &Person,
        strain: StrainId,
        joint_seconds: f64,
        now: f64,
    ) -> Exposure {
        let activity = container.activity();
        let params = env.activities.params(activity);
        let days_since_symptoms = (infector.status() == DiseaseStatus::ShowingSymptoms)
            .then(|| infector.status_changed_at(DiseaseStatus::ShowingSymptoms))
            .flatten()
            .map(|since| (now - since) / SECONDS_PER_DAY);
        let days_contagious = infector
            .status_changed_at(DiseaseStatus::Contagious)
            .map_or(0.0, |since| (now - since) / SECONDS_PER_DAY);
        Exposure {
            calibration: self.calibration,
            contact_intensity: params.contact_intensity,
            ci_correction: restriction.ci_correction,
            seasonality: env
                .seasonality
                .get(usize::from(activity.0))
                .copied()
                .unwrap_or(1.0),
            joint_seconds,
            infector_mask: env.masks.mask_for(
                infector.id(),
                activity,
                &restriction.masks,
                restriction.mask_epoch,
            ),
            target_mask: env.masks.mask_for(
                target.id(),
                activity,
                &restriction.masks,
                restriction.mask_epoch,
            ),
            infectivity: env.strains.params(strain).infectiousness
                * env.antibodies.infectivity(infector, env.day),
            susceptibility: env.antibodies.susceptibility(target, strain, env.strains),
            spaces: container.spaces(),
            group_size: container.group_size(),
            infector_age: infector.age(),
            target_age: target.age(),
            days_since_symptoms,
            days_contagious,
        }
    }
}
