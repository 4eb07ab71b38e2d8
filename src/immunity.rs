//! Antibody kinetics and the susceptibility/infectivity multipliers derived from them.
//!
//! Every person carries one antibody titer per strain. An immunity event (a vaccine dose or an
//! infection) on day `d` is processed on day `d + 1`: the first event sets the titer to its
//! configured initial value, later events multiply the titer by the event's refresh factor.
//! On every other day titers decay by `0.5^(1 / half_life_days)`.
use std::collections::BTreeMap;

use log::trace;
use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::people::Person;
use crate::strain::{ImmunityEvent, StrainId, Strains, Vaccines};

const MIN_IMMUNE_RESPONSE: f64 = 0.1;
const MAX_IMMUNE_RESPONSE: f64 = 10.0;

/// Protection from an immunity event as a function of days since the event: a linear ramp up
/// to a plateau, optionally followed by a linear decline to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectivenessCurve {
    pub ramp_days: u32,
    pub plateau: f64,
    /// Length of the plateau; unlimited when absent.
    pub plateau_days: Option<u32>,
    /// Length of the decline after the plateau.
    pub decay_days: u32,
}

impl Default for EffectivenessCurve {
    fn default() -> Self {
        EffectivenessCurve {
            ramp_days: 0,
            plateau: 0.0,
            plateau_days: None,
            decay_days: 0,
        }
    }
}

impl EffectivenessCurve {
    #[must_use]
    pub fn value(&self, days_since: u32) -> f64 {
        if days_since < self.ramp_days {
            return self.plateau * f64::from(days_since) / f64::from(self.ramp_days);
        }
        let Some(plateau_days) = self.plateau_days else {
            return self.plateau;
        };
        let after_plateau = days_since - self.ramp_days;
        if after_plateau < plateau_days {
            return self.plateau;
        }
        let into_decay = after_plateau - plateau_days;
        if into_decay >= self.decay_days {
            return 0.0;
        }
        self.plateau * (1.0 - f64::from(into_decay) / f64::from(self.decay_days))
    }
}

/// Antibody response to one kind of immunity event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImmunizationParams {
    /// Titer per strain after a first immunization.
    pub initial: BTreeMap<String, f64>,
    /// Multiplier per strain applied by later immunizations.
    pub refresh: BTreeMap<String, f64>,
    /// Extra multiplier by dose index; the last entry applies to all later doses.
    pub dose_factors: Vec<f64>,
    /// Reduction of an infector's infectivity after this event.
    pub infectivity_curve: Option<EffectivenessCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntibodyConfig {
    pub half_life_days: f64,
    pub max_titer: f64,
    /// Sigma of the log-normal person-level immune response multiplier; 0 gives everyone 1.
    pub immune_response_sigma: f64,
    /// Keyed by strain name (infection) or vaccine name (vaccination).
    pub events: BTreeMap<String, ImmunizationParams>,
}

impl Default for AntibodyConfig {
    fn default() -> Self {
        AntibodyConfig {
            half_life_days: 60.0,
            max_titer: 150.0,
            immune_response_sigma: 0.0,
            events: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct EventParams {
    initial: Vec<f64>,
    refresh: Vec<f64>,
    dose_factors: Vec<f64>,
    infectivity_curve: Option<EffectivenessCurve>,
}

impl EventParams {
    fn dose_factor(&self, dose_index: usize) -> f64 {
        self.dose_factors
            .get(dose_index)
            .or(self.dose_factors.last())
            .copied()
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct AntibodyModel {
    daily_decay: f64,
    max_titer: f64,
    response_sigma: f64,
    params: BTreeMap<ImmunityEvent, EventParams>,
}

impl AntibodyModel {
    pub fn new(
        config: &AntibodyConfig,
        strains: &Strains,
        vaccines: &Vaccines,
    ) -> Result<Self, EpisimError> {
        if config.half_life_days.is_nan() || config.half_life_days <= 0.0 {
            return Err(EpisimError::config("antibody half-life must be > 0"));
        }
        if config.max_titer.is_nan() || config.max_titer <= 0.0 {
            return Err(EpisimError::config("maximum antibody titer must be > 0"));
        }
        if config.immune_response_sigma.is_nan() || config.immune_response_sigma < 0.0 {
            return Err(EpisimError::config("immune response sigma must be >= 0"));
        }

        let mut params = BTreeMap::new();
        let events = strains
            .ids()
            .map(|id| (strains.name(id).to_string(), ImmunityEvent::Infection(id)))
            .chain(
                vaccines
                    .ids()
                    .map(|id| (vaccines.name(id).to_string(), ImmunityEvent::Vaccination(id))),
            );
        for (name, event) in events {
            let event_config = config.events.get(&name).ok_or_else(|| {
                EpisimError::config(format!("no antibody parameters for `{name}`"))
            })?;
            params.insert(event, Self::resolve_event(&name, event_config, strains)?);
        }
        for name in config.events.keys() {
            if strains.id(name).is_none() && vaccines.id(name).is_none() {
                return Err(EpisimError::config(format!(
                    "antibody parameters for unknown strain or vaccine `{name}`"
                )));
            }
        }

        Ok(AntibodyModel {
            daily_decay: 0.5_f64.powf(1.0 / config.half_life_days),
            max_titer: config.max_titer,
            response_sigma: config.immune_response_sigma,
            params,
        })
    }

    fn resolve_event(
        name: &str,
        config: &ImmunizationParams,
        strains: &Strains,
    ) -> Result<EventParams, EpisimError> {
        let per_strain = |values: &BTreeMap<String, f64>, default: f64| {
            let mut resolved = vec![default; strains.len()];
            for (strain, value) in values {
                let id = strains.id(strain).ok_or_else(|| {
                    EpisimError::config(format!(
                        "antibody parameters for `{name}` mention unknown strain `{strain}`"
                    ))
                })?;
                resolved[usize::from(id.0)] = *value;
            }
            Ok::<Vec<f64>, EpisimError>(resolved)
        };
        let initial = per_strain(&config.initial, 0.0)?;
        let refresh = per_strain(&config.refresh, 1.0)?;
        if initial.iter().any(|v| v.is_nan() || *v < 0.0) {
            return Err(EpisimError::config(format!(
                "initial titers for `{name}` must be >= 0"
            )));
        }
        if refresh.iter().any(|v| v.is_nan() || *v < 1.0) {
            return Err(EpisimError::config(format!(
                "refresh factors for `{name}` must be >= 1"
            )));
        }
        if config.dose_factors.iter().any(|v| v.is_nan() || *v <= 0.0) {
            return Err(EpisimError::config(format!(
                "dose factors for `{name}` must be > 0"
            )));
        }
        Ok(EventParams {
            initial,
            refresh,
            dose_factors: config.dose_factors.clone(),
            infectivity_curve: config.infectivity_curve.clone(),
        })
    }

    #[must_use]
    pub fn daily_decay(&self) -> f64 {
        self.daily_decay
    }

    /// Draws the person-level immune response multiplier, bounded to `[0.1, 10]`.
    pub fn init_person<R: Rng>(&self, person: &mut Person, rng: &mut R) {
        if self.response_sigma == 0.0 {
            person.set_immune_response(1.0);
            return;
        }
        let multiplier = match LogNormal::new(0.0, self.response_sigma) {
            Ok(distribution) => (0..100)
                .map(|_| distribution.sample(rng))
                .find(|m| (MIN_IMMUNE_RESPONSE..=MAX_IMMUNE_RESPONSE).contains(m))
                .unwrap_or(1.0),
            Err(_) => 1.0,
        };
        person.set_immune_response(multiplier);
    }

    /// Advances `person`'s titers to `day`. Events of `day - 1` boost, otherwise titers decay.
    pub fn update_antibodies(&self, person: &mut Person, day: u32) {
        let events = person.immunity_events();
        let irm = person.immune_response();
        let changed = self.advance(person.antibodies_mut(), &events, irm, day);
        if changed {
            trace!("antibodies of {:?} on day {day}: {:?}", person.id(), person.antibodies());
        }
    }

    /// Recomputes `person`'s titers on `day` from the event logs alone. Agrees with calling
    /// [`AntibodyModel::update_antibodies`] once per day from day 1.
    #[must_use]
    pub fn rebuild(&self, person: &Person, day: u32) -> Vec<f64> {
        let events = person.immunity_events();
        let mut titers = vec![0.0; person.antibodies().len()];
        for d in 1..=day {
            self.advance(&mut titers, &events, person.immune_response(), d);
        }
        titers
    }

    /// Returns true if an event was processed.
    fn advance(
        &self,
        titers: &mut [f64],
        events: &[(ImmunityEvent, u32)],
        irm: f64,
        day: u32,
    ) -> bool {
        let mut boosted = false;
        if day > 0 {
            for (index, (event, _)) in events
                .iter()
                .enumerate()
                .filter(|(_, (_, event_day))| *event_day == day - 1)
            {
                let dose_index = events[..index]
                    .iter()
                    .filter(|(earlier, _)| same_kind(earlier, event))
                    .count();
                self.boost(titers, *event, dose_index, irm);
                boosted = true;
            }
        }
        if !boosted {
            for titer in titers.iter_mut() {
                *titer = (*titer * self.daily_decay).max(0.0);
            }
        }
        boosted
    }

    fn boost(&self, titers: &mut [f64], event: ImmunityEvent, dose_index: usize, irm: f64) {
        let Some(params) = self.params.get(&event) else {
            return;
        };
        let factor = params.dose_factor(dose_index);
        let first = titers.iter().all(|t| *t == 0.0);
        for (strain, titer) in titers.iter_mut().enumerate() {
            let floor = params.initial[strain] * irm;
            let next = if first {
                floor * factor
            } else {
                (*titer * (params.refresh[strain] * irm * factor).max(1.0)).max(floor)
            };
            *titer = next.min(self.max_titer);
        }
    }

    /// Multiplier on the infection hazard of a target exposed to `strain`; 1 without antibodies.
    #[must_use]
    pub fn susceptibility(&self, person: &Person, strain: StrainId, strains: &Strains) -> f64 {
        1.0 - strains.params(strain).effectiveness(person.titer(strain))
    }

    /// Multiplier on an infector's infectivity on `day`, from immunity acquired before the
    /// current infection.
    #[must_use]
    pub fn infectivity(&self, person: &Person, day: u32) -> f64 {
        let infected_on = person.infections().last().map_or(u32::MAX, |(_, d)| *d);
        let reduction = person
            .immunity_events()
            .iter()
            .filter(|(_, event_day)| *event_day < infected_on && *event_day <= day)
            .filter_map(|(event, event_day)| {
                let curve = self.params.get(event)?.infectivity_curve.as_ref()?;
                Some(curve.value(day - event_day))
            })
            .fold(0.0, f64::max);
        (1.0 - reduction).clamp(0.0, 1.0)
    }
}

fn same_kind(a: &ImmunityEvent, b: &ImmunityEvent) -> bool {
    matches!(
        (a, b),
        (ImmunityEvent::Vaccination(_), ImmunityEvent::Vaccination(_))
            | (ImmunityEvent::Infection(_), ImmunityEvent::Infection(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::{PersonId, PersonRecord};
    use crate::strain::{StrainParams, VaccineId};
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn strains() -> Strains {
        let config = BTreeMap::from([
            ("alpha".to_string(), StrainParams::default()),
            (
                "delta".to_string(),
                StrainParams {
                    ak50: 0.8,
                    ..StrainParams::default()
                },
            ),
        ]);
        Strains::new(&config).unwrap()
    }

    fn vaccines() -> Vaccines {
        Vaccines::new(&["mRNA".to_string()]).unwrap()
    }

    fn config() -> AntibodyConfig {
        let params = |initial: f64, refresh: f64| ImmunizationParams {
            initial: BTreeMap::from([
                ("alpha".to_string(), initial),
                ("delta".to_string(), initial / 2.0),
            ]),
            refresh: BTreeMap::from([
                ("alpha".to_string(), refresh),
                ("delta".to_string(), refresh),
            ]),
            ..ImmunizationParams::default()
        };
        AntibodyConfig {
            events: BTreeMap::from([
                ("alpha".to_string(), params(1.0, 10.0)),
                ("delta".to_string(), params(1.0, 10.0)),
                ("mRNA".to_string(), params(2.0, 15.0)),
            ]),
            ..AntibodyConfig::default()
        }
    }

    fn model() -> AntibodyModel {
        AntibodyModel::new(&config(), &strains(), &vaccines()).unwrap()
    }

    fn person() -> Person {
        let record = PersonRecord {
            id: "a".to_string(),
            age: 30,
            household: 1,
            region: None,
        };
        Person::new(PersonId(0), &record, 2)
    }

    fn run(
        model: &AntibodyModel,
        person: &mut Person,
        days: std::ops::RangeInclusive<u32>,
    ) -> Vec<Vec<f64>> {
        days.map(|day| {
            model.update_antibodies(person, day);
            person.antibodies().to_vec()
        })
        .collect()
    }

    #[test]
    fn half_life_decay_factor() {
        let model = model();
        assert_relative_eq!(model.daily_decay().powi(60), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn boost_lags_one_day_then_decays() {
        let model = model();
        let mut person = person();
        person.add_vaccination(VaccineId(0), 5);
        let titers = run(&model, &mut person, 1..=10);
        // day 5 (event day) shows nothing, day 6 shows the boost
        assert_eq!(titers[4], vec![0.0, 0.0]);
        assert_eq!(titers[5], vec![2.0, 1.0]);
        for day in 6..9 {
            for strain in 0..2 {
                assert!(titers[day][strain] < titers[day - 1][strain]);
            }
        }
    }

    #[test]
    fn boost_ordering_around_second_event() {
        let model = model();
        let mut person = person();
        person.add_vaccination(VaccineId(0), 2);
        person.add_vaccination(VaccineId(0), 30);
        let titers = run(&model, &mut person, 1..=40);
        let on = |day: usize| titers[day - 1][0];
        assert!(on(30) <= on(29));
        assert!(on(29) < on(31));
        assert_relative_eq!(on(31), on(30) * 15.0, epsilon = 1e-9);
    }

    #[test]
    fn titers_are_capped() {
        let model = model();
        let mut person = person();
        for day in [1, 3, 5, 7] {
            person.add_vaccination(VaccineId(0), day);
        }
        let titers = run(&model, &mut person, 1..=9);
        assert!(titers.iter().flatten().all(|t| *t <= 150.0));
        assert_eq!(titers[7][0], 150.0);
    }

    #[test]
    fn simultaneous_events_compound() {
        let config = AntibodyConfig {
            max_titer: 1000.0,
            ..config()
        };
        let model = AntibodyModel::new(&config, &strains(), &vaccines()).unwrap();
        let mut person = person();
        person.add_vaccination(VaccineId(0), 1);
        person.add_vaccination(VaccineId(0), 10);
        person.add_infection(StrainId(0), 10);
        let titers = run(&model, &mut person, 1..=11);
        let before = titers[9][0];
        assert_relative_eq!(titers[10][0], before * 15.0 * 10.0, epsilon = 1e-9);
    }

    #[test]
    fn rebuild_matches_incremental_updates() {
        let model = model();
        let mut person = person();
        person.set_immune_response(1.7);
        person.add_vaccination(VaccineId(0), 3);
        person.add_infection(StrainId(1), 20);
        person.add_vaccination(VaccineId(0), 45);
        run(&model, &mut person, 1..=60);
        let rebuilt = model.rebuild(&person, 60);
        for (a, b) in rebuilt.iter().zip(person.antibodies()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn susceptibility_without_antibodies_is_one() {
        let model = model();
        let mut person = person();
        let strains = strains();
        assert_eq!(model.susceptibility(&person, StrainId(0), &strains), 1.0);
        person.add_vaccination(VaccineId(0), 1);
        run(&model, &mut person, 1..=2);
        let alpha = model.susceptibility(&person, StrainId(0), &strains);
        let delta = model.susceptibility(&person, StrainId(1), &strains);
        assert!(alpha < delta);
        assert!(delta < 1.0);
    }

    #[test]
    fn immune_response_is_bounded() {
        let config = AntibodyConfig {
            immune_response_sigma: 3.0,
            ..config()
        };
        let model = AntibodyModel::new(&config, &strains(), &vaccines()).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut person = person();
        for _ in 0..1000 {
            model.init_person(&mut person, &mut rng);
            assert!((0.1..=10.0).contains(&person.immune_response()));
        }
    }

    #[test]
    fn missing_event_parameters_fail() {
        let mut config = config();
        config.events.remove("mRNA");
        let error = AntibodyModel::new(&config, &strains(), &vaccines()).unwrap_err();
        assert!(error.is_config_error());

        let mut config = self::config();
        config
            .events
            .get_mut("alpha")
            .unwrap()
            .initial
            .insert("omicron".to_string(), 1.0);
        assert!(AntibodyModel::new(&config, &strains(), &vaccines()).is_err());
    }

    #[test]
    fn effectiveness_curve_shape() {
        let curve = EffectivenessCurve {
            ramp_days: 4,
            plateau: 0.8,
            plateau_days: Some(10),
            decay_days: 10,
        };
        assert_eq!(curve.value(0), 0.0);
        assert_relative_eq!(curve.value(2), 0.4);
        assert_eq!(curve.value(4), 0.8);
        assert_eq!(curve.value(13), 0.8);
        assert_relative_eq!(curve.value(19), 0.4);
        assert_eq!(curve.value(24), 0.0);
        assert_eq!(curve.value(100), 0.0);
    }

    #[test]
    fn infectivity_ignores_current_infection() {
        let mut config = config();
        let curve = EffectivenessCurve {
            plateau: 0.5,
            ..EffectivenessCurve::default()
        };
        config.events.get_mut("mRNA").unwrap().infectivity_curve = Some(curve.clone());
        config.events.get_mut("alpha").unwrap().infectivity_curve = Some(curve);
        let model = AntibodyModel::new(&config, &strains(), &vaccines()).unwrap();

        let mut person = person();
        person.add_infection(StrainId(0), 5);
        assert_eq!(model.infectivity(&person, 6), 1.0);

        person.add_vaccination(VaccineId(0), 10);
        person.add_infection(StrainId(0), 40);
        assert_relative_eq!(model.infectivity(&person, 41), 0.5);
    }
}
