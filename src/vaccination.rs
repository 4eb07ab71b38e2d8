//! Daily vaccination campaigns.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::people::{DiseaseStatus, Person, PersonId, PersonRegistry};
use crate::seeding::choose;
use crate::strain::{VaccineId, Vaccines};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaccinationSchedule {
    pub vaccine: String,
    /// Doses per day at full population scale.
    pub per_day: BTreeMap<NaiveDate, u32>,
    pub min_age: u8,
    /// When set, the campaign boosts persons whose last dose is at least this old instead of
    /// vaccinating the unvaccinated.
    pub booster_after_days: Option<u32>,
}

impl VaccinationSchedule {
    fn is_eligible(&self, person: &Person, day: u32) -> bool {
        if person.age() < self.min_age {
            return false;
        }
        match self.booster_after_days {
            None => !person.is_vaccinated() && person.status() == DiseaseStatus::Susceptible,
            Some(after) => {
                matches!(
                    person.status(),
                    DiseaseStatus::Susceptible | DiseaseStatus::Recovered
                ) && person
                    .vaccinations()
                    .last()
                    .is_some_and(|(_, last)| day.saturating_sub(*last) >= after)
            }
        }
    }
}

pub struct Vaccination {
    schedules: Vec<(VaccineId, VaccinationSchedule)>,
    sample_size: f64,
}

impl Vaccination {
    pub fn new(
        schedules: &[VaccinationSchedule],
        vaccines: &Vaccines,
        sample_size: f64,
    ) -> Result<Self, EpisimError> {
        let schedules = schedules
            .iter()
            .map(|schedule| Ok((vaccines.require(&schedule.vaccine)?, schedule.clone())))
            .collect::<Result<Vec<_>, EpisimError>>()?;
        Ok(Vaccination {
            schedules,
            sample_size,
        })
    }

    /// Vaccinates the persons chosen for `date`. The dose only affects antibodies from the
    /// next day on.
    pub fn vaccinate<R: Rng>(
        &self,
        persons: &mut PersonRegistry,
        day: u32,
        date: NaiveDate,
        rng: &mut R,
    ) -> Vec<(PersonId, VaccineId)> {
        let mut vaccinated = Vec::new();
        for (vaccine, schedule) in &self.schedules {
            let Some(&count) = schedule.per_day.get(&date) else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let doses = (f64::from(count) * self.sample_size).round().max(0.0) as usize;
            let candidates: Vec<PersonId> = persons
                .iter()
                .filter(|p| schedule.is_eligible(p, day))
                .map(Person::id)
                .collect();
            debug!(
                "{date}: {doses} doses of {}, {} eligible",
                schedule.vaccine,
                candidates.len()
            );
            for id in choose(&candidates, doses, rng) {
                if let Some(person) = persons.get_mut(id) {
                    person.add_vaccination(*vaccine, day);
                    vaccinated.push((id, *vaccine));
                }
            }
        }
        vaccinated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::persons;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 10).unwrap()
    }

    fn vaccines() -> Vaccines {
        Vaccines::new(&["mRNA".to_string()]).unwrap()
    }

    fn schedule(count: u32) -> VaccinationSchedule {
        VaccinationSchedule {
            vaccine: "mRNA".to_string(),
            per_day: BTreeMap::from([(date(), count)]),
            ..VaccinationSchedule::default()
        }
    }

    #[test]
    fn vaccinates_unvaccinated_susceptibles() {
        let vaccination = Vaccination::new(&[schedule(20)], &vaccines(), 0.25).unwrap();
        let mut persons = persons(12);
        persons
            .get_mut(PersonId(0))
            .unwrap()
            .set_status(DiseaseStatus::Contagious, 0.0);
        persons
            .get_mut(PersonId(1))
            .unwrap()
            .add_vaccination(VaccineId(0), 1);
        let mut rng = SmallRng::seed_from_u64(2);
        let vaccinated = vaccination.vaccinate(&mut persons, 10, date(), &mut rng);
        assert_eq!(vaccinated.len(), 5);
        assert!(vaccinated.iter().all(|(id, _)| id.0 > 1));
        for (id, vaccine) in vaccinated {
            assert_eq!(persons.get(id).unwrap().vaccinations(), &[(vaccine, 10)]);
        }
    }

    #[test]
    fn boosters_wait_for_the_interval() {
        let booster = VaccinationSchedule {
            booster_after_days: Some(30),
            ..schedule(100)
        };
        let vaccination = Vaccination::new(&[booster], &vaccines(), 1.0).unwrap();
        let mut persons = persons(4);
        persons
            .get_mut(PersonId(0))
            .unwrap()
            .add_vaccination(VaccineId(0), 1);
        persons
            .get_mut(PersonId(1))
            .unwrap()
            .add_vaccination(VaccineId(0), 5);
        let mut rng = SmallRng::seed_from_u64(2);
        let boosted = vaccination.vaccinate(&mut persons, 33, date(), &mut rng);
        assert_eq!(boosted, vec![(PersonId(0), VaccineId(0))]);
    }

    #[test]
    fn unknown_vaccine_is_rejected() {
        let schedule = VaccinationSchedule {
            vaccine: "viral vector".to_string(),
            ..schedule(1)
        };
        assert!(Vaccination::new(&[schedule], &vaccines(), 1.0).is_err());
    }
}
