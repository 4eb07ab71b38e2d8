//! Persons and the registry that owns them.
//!
//! A `Person` keeps append-only logs of everything that happened to it (status changes,
//! quarantines, vaccinations, infections) next to the few derived values the models need on
//! every contact: the current status, the current quarantine and the per-strain antibody titer.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::activity::ActivityId;
use crate::calendar::day_of;
use crate::container::ContainerId;
use crate::hashing::{HashMap, HashMapExt};
use crate::strain::{ImmunityEvent, StrainId, VaccineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub u32);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DiseaseStatus {
    Susceptible,
    InfectedButNotContagious,
    Contagious,
    ShowingSymptoms,
    SeriouslySick,
    Critical,
    SeriouslySickAfterCritical,
    Recovered,
}

impl DiseaseStatus {
    /// Can pass the virus on.
    #[must_use]
    pub fn is_infectious(self) -> bool {
        matches!(
            self,
            DiseaseStatus::Contagious | DiseaseStatus::ShowingSymptoms
        )
    }

    /// Takes part in transmission at all, as either side of a pair.
    #[must_use]
    pub fn is_relevant_for_dynamics(self) -> bool {
        self == DiseaseStatus::Susceptible || self.is_infectious()
    }

    /// Whether the disease automaton allows a direct step from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: DiseaseStatus) -> bool {
        use DiseaseStatus::*;
        matches!(
            (self, next),
            (Susceptible, InfectedButNotContagious)
                | (InfectedButNotContagious, Contagious)
                | (Contagious, ShowingSymptoms | Recovered)
                | (ShowingSymptoms, SeriouslySick | Recovered)
                | (SeriouslySick, Critical | Recovered)
                | (Critical, SeriouslySickAfterCritical)
                | (SeriouslySickAfterCritical, Recovered)
                | (Recovered, Susceptible)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum QuarantineStatus {
    No,
    AtHome,
    Full,
}

/// One activity instance of a person's day. Times are seconds since midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryEntry {
    pub start: f64,
    pub end: f64,
    pub container: ContainerId,
    pub activity: ActivityId,
    pub participating: bool,
}

/// The next disease transition drawn on entering the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransition {
    pub to: DiseaseStatus,
    /// Days after entering the current status
    pub day_offset: u32,
}

/// Static attributes from the population file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub age: u8,
    pub household: u64,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    id: PersonId,
    age: u8,
    household: u64,
    region: Option<String>,
    /// Carries a tracing device; only such persons record contacts.
    traceable: bool,
    status: DiseaseStatus,
    status_history: Vec<(DiseaseStatus, f64)>,
    quarantine: QuarantineStatus,
    quarantine_history: Vec<(QuarantineStatus, u32)>,
    vaccinations: Vec<(VaccineId, u32)>,
    infections: Vec<(StrainId, u32)>,
    antibodies: Vec<f64>,
    immune_response: f64,
    traceable_contacts: IndexMap<PersonId, f64>,
    next_transition: Option<ScheduledTransition>,
    #[serde(skip)]
    trajectory: Vec<TrajectoryEntry>,
}

impl Person {
    #[must_use]
    pub fn new(id: PersonId, record: &PersonRecord, num_strains: usize) -> Self {
        Person {
            id,
            age: record.age,
            household: record.household,
            region: record.region.clone(),
            traceable: true,
            status: DiseaseStatus::Susceptible,
            status_history: Vec::new(),
            quarantine: QuarantineStatus::No,
            quarantine_history: Vec::new(),
            vaccinations: Vec::new(),
            infections: Vec::new(),
            antibodies: vec![0.0; num_strains],
            immune_response: 1.0,
            traceable_contacts: IndexMap::new(),
            next_transition: None,
            trajectory: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn age(&self) -> u8 {
        self.age
    }

    #[must_use]
    pub fn household(&self) -> u64 {
        self.household
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    #[must_use]
    pub fn is_traceable(&self) -> bool {
        self.traceable
    }

    pub fn set_traceable(&mut self, traceable: bool) {
        self.traceable = traceable;
    }

    #[must_use]
    pub fn status(&self) -> DiseaseStatus {
        self.status
    }

    /// Enters `status` at absolute time `time` and forgets the pending transition.
    pub fn set_status(&mut self, status: DiseaseStatus, time: f64) -> DiseaseStatus {
        let previous = self.status;
        self.status = status;
        self.status_history.push((status, time));
        self.next_transition = None;
        previous
    }

    #[must_use]
    pub fn status_history(&self) -> &[(DiseaseStatus, f64)] {
        &self.status_history
    }

    /// When `status` was last entered.
    #[must_use]
    pub fn status_changed_at(&self, status: DiseaseStatus) -> Option<f64> {
        self.status_history
            .iter()
            .rev()
            .find(|(s, _)| *s == status)
            .map(|(_, time)| *time)
    }

    /// Full days since `status` was last entered, as seen on `day`.
    #[must_use]
    pub fn days_since(&self, status: DiseaseStatus, day: u32) -> Option<u32> {
        self.status_changed_at(status)
            .map(|time| day.saturating_sub(day_of(time)))
    }

    #[must_use]
    pub fn next_transition(&self) -> Option<ScheduledTransition> {
        self.next_transition
    }

    pub fn set_next_transition(&mut self, transition: Option<ScheduledTransition>) {
        self.next_transition = transition;
    }

    #[must_use]
    pub fn quarantine(&self) -> QuarantineStatus {
        self.quarantine
    }

    pub fn set_quarantine(&mut self, quarantine: QuarantineStatus, day: u32) {
        self.quarantine = quarantine;
        self.quarantine_history.push((quarantine, day));
    }

    #[must_use]
    pub fn quarantine_history(&self) -> &[(QuarantineStatus, u32)] {
        &self.quarantine_history
    }

    /// Days since the current quarantine began, if quarantined.
    #[must_use]
    pub fn days_in_quarantine(&self, day: u32) -> Option<u32> {
        if self.quarantine == QuarantineStatus::No {
            return None;
        }
        self.quarantine_history
            .last()
            .map(|(_, since)| day.saturating_sub(*since))
    }

    pub fn add_vaccination(&mut self, vaccine: VaccineId, day: u32) {
        self.vaccinations.push((vaccine, day));
    }

    #[must_use]
    pub fn vaccinations(&self) -> &[(VaccineId, u32)] {
        &self.vaccinations
    }

    #[must_use]
    pub fn is_vaccinated(&self) -> bool {
        !self.vaccinations.is_empty()
    }

    pub fn add_infection(&mut self, strain: StrainId, day: u32) {
        self.infections.push((strain, day));
    }

    #[must_use]
    pub fn infections(&self) -> &[(StrainId, u32)] {
        &self.infections
    }

    /// The strain of the most recent infection.
    #[must_use]
    pub fn current_strain(&self) -> Option<StrainId> {
        self.infections.last().map(|(strain, _)| *strain)
    }

    /// Every immunity event in chronological order, vaccinations before infections on a tie.
    #[must_use]
    pub fn immunity_events(&self) -> Vec<(ImmunityEvent, u32)> {
        let mut events: Vec<(ImmunityEvent, u32)> = self
            .vaccinations
            .iter()
            .map(|(vaccine, day)| (ImmunityEvent::Vaccination(*vaccine), *day))
            .chain(
                self.infections
                    .iter()
                    .map(|(strain, day)| (ImmunityEvent::Infection(*strain), *day)),
            )
            .collect();
        // Stable, so each log keeps its own order
        events.sort_by_key(|(_, day)| *day);
        events
    }

    #[must_use]
    pub fn antibodies(&self) -> &[f64] {
        &self.antibodies
    }

    pub fn antibodies_mut(&mut self) -> &mut [f64] {
        &mut self.antibodies
    }

    #[must_use]
    pub fn titer(&self, strain: StrainId) -> f64 {
        self.antibodies
            .get(usize::from(strain.0))
            .copied()
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn immune_response(&self) -> f64 {
        self.immune_response
    }

    pub fn set_immune_response(&mut self, multiplier: f64) {
        self.immune_response = multiplier;
    }

    /// Records a contact at absolute time `time`, evicting the oldest record beyond `cap`.
    pub fn add_traceable_contact(&mut self, other: PersonId, time: f64, cap: usize) {
        self.traceable_contacts.shift_remove(&other);
        self.traceable_contacts.insert(other, time);
        while self.traceable_contacts.len() > cap {
            self.traceable_contacts.shift_remove_index(0);
        }
    }

    /// Contacts last seen at or after `since`, oldest first.
    #[must_use]
    pub fn traceable_contacts_since(&self, since: f64) -> Vec<(PersonId, f64)> {
        self.traceable_contacts
            .iter()
            .filter(|(_, time)| **time >= since)
            .map(|(id, time)| (*id, *time))
            .collect()
    }

    pub fn clear_traceable_contacts_before(&mut self, before: f64) {
        self.traceable_contacts.retain(|_, time| *time >= before);
    }

    #[must_use]
    pub fn num_traceable_contacts(&self) -> usize {
        self.traceable_contacts.len()
    }

    #[must_use]
    pub fn trajectory(&self) -> &[TrajectoryEntry] {
        &self.trajectory
    }

    pub fn set_trajectory(&mut self, trajectory: Vec<TrajectoryEntry>) {
        self.trajectory = trajectory;
    }

    /// Whether quarantine lets this person into a container of the given kind.
    #[must_use]
    pub fn may_enter(&self, activity_is_home: bool, vehicle: bool) -> bool {
        match self.quarantine {
            QuarantineStatus::No => true,
            QuarantineStatus::AtHome => activity_is_home && !vehicle,
            QuarantineStatus::Full => false,
        }
    }

    /// Whether the activity instance entering `container` at `start` (seconds since midnight)
    /// was chosen to take place today. Instances missing from the trajectory take place.
    #[must_use]
    pub fn participates(&self, container: ContainerId, start: f64) -> bool {
        self.trajectory
            .iter()
            .find(|entry| entry.container == container && entry.start == start)
            .is_none_or(|entry| entry.participating)
    }
}

/// Owns every person of a run, indexed by `PersonId`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonRegistry {
    persons: Vec<Person>,
    households: HashMap<u64, Vec<PersonId>>,
}

impl PersonRegistry {
    /// Builds the registry. `PersonId(i)` is the i-th person.
    #[must_use]
    pub fn new(persons: Vec<Person>) -> Self {
        let mut households: HashMap<u64, Vec<PersonId>> = HashMap::new();
        for person in &persons {
            households
                .entry(person.household)
                .or_default()
                .push(person.id);
        }
        PersonRegistry { persons, households }
    }

    #[must_use]
    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person> {
        self.persons.get_mut(id.0 as usize)
    }

    /// Mutable access to two different persons at once.
    pub fn pair_mut(&mut self, a: PersonId, b: PersonId) -> Option<(&mut Person, &mut Person)> {
        let (a, b) = (a.0 as usize, b.0 as usize);
        if a == b || a >= self.persons.len() || b >= self.persons.len() {
            return None;
        }
        if a < b {
            let (left, right) = self.persons.split_at_mut(b);
            Some((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.persons.split_at_mut(a);
            Some((&mut right[0], &mut left[b]))
        }
    }

    /// Other members of `id`'s household, in id order.
    #[must_use]
    pub fn household_members(&self, id: PersonId) -> Vec<PersonId> {
        self.get(id)
            .and_then(|person| self.households.get(&person.household))
            .map(|members| members.iter().copied().filter(|m| *m != id).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Person> {
        self.persons.iter_mut()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn ids(&self) -> impl Iterator<Item = PersonId> {
        (0..self.persons.len()).map(|i| PersonId(i as u32))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    #[must_use]
    pub fn into_persons(self) -> Vec<Person> {
        self.persons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SECONDS_PER_DAY;

    fn record(household: u64) -> PersonRecord {
        PersonRecord {
            id: "p".to_string(),
            age: 40,
            household,
            region: None,
        }
    }

    fn registry(households: &[u64]) -> PersonRegistry {
        let persons = households
            .iter()
            .enumerate()
            .map(|(i, h)| Person::new(PersonId(i as u32), &record(*h), 1))
            .collect();
        PersonRegistry::new(persons)
    }

    #[test]
    fn status_history_is_append_only() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        assert_eq!(person.status(), DiseaseStatus::Susceptible);
        let previous =
            person.set_status(DiseaseStatus::InfectedButNotContagious, 2.5 * SECONDS_PER_DAY);
        assert_eq!(previous, DiseaseStatus::Susceptible);
        person.set_status(DiseaseStatus::Contagious, 5.0 * SECONDS_PER_DAY);
        assert_eq!(person.status_history().len(), 2);
        assert_eq!(person.days_since(DiseaseStatus::InfectedButNotContagious, 6), Some(4));
        assert_eq!(person.days_since(DiseaseStatus::Contagious, 6), Some(1));
        assert_eq!(person.days_since(DiseaseStatus::Recovered, 6), None);
    }

    #[test]
    fn setting_status_clears_pending_transition() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        person.set_next_transition(Some(ScheduledTransition {
            to: DiseaseStatus::Contagious,
            day_offset: 3,
        }));
        person.set_status(DiseaseStatus::InfectedButNotContagious, 0.0);
        assert_eq!(person.next_transition(), None);
    }

    #[test]
    fn partial_order_of_statuses() {
        use DiseaseStatus::*;
        assert!(Susceptible.can_transition_to(InfectedButNotContagious));
        assert!(Recovered.can_transition_to(Susceptible));
        assert!(!Susceptible.can_transition_to(Contagious));
        assert!(!Critical.can_transition_to(Recovered));
        assert!(Contagious.is_infectious());
        assert!(!Recovered.is_relevant_for_dynamics());
    }

    #[test]
    fn traceable_contacts_are_capped_oldest_first() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        person.add_traceable_contact(PersonId(1), 10.0, 2);
        person.add_traceable_contact(PersonId(2), 20.0, 2);
        person.add_traceable_contact(PersonId(1), 30.0, 2);
        person.add_traceable_contact(PersonId(3), 40.0, 2);
        assert_eq!(
            person.traceable_contacts_since(0.0),
            vec![(PersonId(1), 30.0), (PersonId(3), 40.0)]
        );
        person.clear_traceable_contacts_before(35.0);
        assert_eq!(person.num_traceable_contacts(), 1);
    }

    #[test]
    fn immunity_events_are_chronological() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        person.add_infection(StrainId(0), 10);
        person.add_vaccination(VaccineId(0), 3);
        person.add_vaccination(VaccineId(0), 10);
        assert_eq!(
            person.immunity_events(),
            vec![
                (ImmunityEvent::Vaccination(VaccineId(0)), 3),
                (ImmunityEvent::Vaccination(VaccineId(0)), 10),
                (ImmunityEvent::Infection(StrainId(0)), 10),
            ]
        );
    }

    #[test]
    fn quarantine_limits_presence() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        assert!(person.may_enter(false, false));
        assert!(person.may_enter(false, true));
        person.set_quarantine(QuarantineStatus::AtHome, 3);
        assert!(!person.may_enter(false, false));
        assert!(person.may_enter(true, false));
        assert!(!person.may_enter(false, true));
        assert_eq!(person.days_in_quarantine(5), Some(2));
        person.set_quarantine(QuarantineStatus::Full, 5);
        assert!(!person.may_enter(true, false));
        person.set_quarantine(QuarantineStatus::No, 9);
        assert_eq!(person.days_in_quarantine(10), None);
    }

    #[test]
    fn non_participation_is_per_instance() {
        let mut person = Person::new(PersonId(0), &record(1), 1);
        person.set_trajectory(vec![
            TrajectoryEntry {
                start: 0.0,
                end: 100.0,
                container: ContainerId(7),
                activity: ActivityId(0),
                participating: false,
            },
            TrajectoryEntry {
                start: 200.0,
                end: 300.0,
                container: ContainerId(7),
                activity: ActivityId(0),
                participating: true,
            },
        ]);
        assert!(!person.participates(ContainerId(7), 0.0));
        assert!(person.participates(ContainerId(7), 200.0));
        assert!(person.participates(ContainerId(8), 0.0));
    }

    #[test]
    fn households_and_pairs() {
        let mut registry = registry(&[1, 1, 2, 1]);
        assert_eq!(
            registry.household_members(PersonId(0)),
            vec![PersonId(1), PersonId(3)]
        );
        assert!(registry.household_members(PersonId(2)).is_empty());

        let (a, b) = registry.pair_mut(PersonId(3), PersonId(1)).unwrap();
        assert_eq!(a.id(), PersonId(3));
        assert_eq!(b.id(), PersonId(1));
        assert!(registry.pair_mut(PersonId(1), PersonId(1)).is_none());
        assert!(registry.pair_mut(PersonId(1), PersonId(10)).is_none());
    }
}
