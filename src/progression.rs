//! The disease automaton.
//!
//! Every status has a list of outgoing edges, each with its own sampler of the number of days
//! spent in the status before taking that edge. On entering a status one day is drawn per edge
//! and the smallest draw wins; ties go to the edge listed first. The winner is stored on the
//! person and applied once enough days have passed.
use std::collections::BTreeMap;

use log::trace;
use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::calendar::SECONDS_PER_DAY;
use crate::error::EpisimError;
use crate::people::{DiseaseStatus, Person, PersonId, ScheduledTransition};

// More zero-day steps than statuses would mean a cycle.
const MAX_STEPS_PER_DAY: usize = 16;

/// How many days a person stays in a status before taking an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transition {
    Fixed { days: u32 },
    LogNormalWithMean { mean: f64, std: f64 },
    LogNormalWithMedian { median: f64, std: f64 },
}

impl Transition {
    fn validate(&self) -> Result<(), EpisimError> {
        let (center, std) = match *self {
            Transition::Fixed { .. } => return Ok(()),
            Transition::LogNormalWithMean { mean, std } => (mean, std),
            Transition::LogNormalWithMedian { median, std } => (median, std),
        };
        if center.is_nan() || center <= 0.0 || std.is_nan() || std < 0.0 {
            return Err(EpisimError::config(format!(
                "invalid log-normal transition {self:?}"
            )));
        }
        Ok(())
    }

    /// `(mu, sigma)` of the underlying normal distribution.
    #[must_use]
    pub fn log_normal_params(&self) -> Option<(f64, f64)> {
        match *self {
            Transition::Fixed { .. } => None,
            Transition::LogNormalWithMean { mean, std } => {
                let variance = std * std;
                let mu = (mean * mean / (mean * mean + variance).sqrt()).ln();
                let sigma = (1.0 + variance / (mean * mean)).ln().sqrt();
                Some((mu, sigma))
            }
            Transition::LogNormalWithMedian { median, std } => {
                let mu = median.ln();
                let e2mu = (2.0 * mu).exp();
                let sigma_sq = (0.5
                    * (-2.0 * mu).exp()
                    * (e2mu + ((4.0 * mu).exp() + 4.0 * e2mu * std * std).sqrt()))
                .ln();
                Some((mu, sigma_sq.max(0.0).sqrt()))
            }
        }
    }

    /// A continuous sample of the days spent before this transition.
    pub fn sample_days<R: Rng>(&self, rng: &mut R) -> f64 {
        if let Transition::Fixed { days } = *self {
            return f64::from(days);
        }
        let Some((mu, sigma)) = self.log_normal_params() else {
            return 0.0;
        };
        if sigma == 0.0 {
            return mu.exp();
        }
        match LogNormal::new(mu, sigma) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => mu.exp(),
        }
    }

    /// The sampled number of days, rounded to whole days.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample_day<R: Rng>(&self, rng: &mut R) -> u32 {
        self.sample_days(rng).round().clamp(0.0, f64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub to: DiseaseStatus,
    pub transition: Transition,
}

impl TransitionEdge {
    #[must_use]
    pub fn new(to: DiseaseStatus, transition: Transition) -> Self {
        TransitionEdge { to, transition }
    }
}

/// Outgoing edges per status. A status without edges is terminal until something else (an
/// infection) moves the person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressionConfig {
    pub transitions: BTreeMap<DiseaseStatus, Vec<TransitionEdge>>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        use DiseaseStatus::*;
        let median = |median, std| Transition::LogNormalWithMedian { median, std };
        let transitions = BTreeMap::from([
            (
                InfectedButNotContagious,
                vec![TransitionEdge::new(Contagious, median(4.0, 1.0))],
            ),
            (
                Contagious,
                vec![
                    TransitionEdge::new(ShowingSymptoms, median(2.0, 1.0)),
                    TransitionEdge::new(Recovered, median(5.0, 2.0)),
                ],
            ),
            (
                ShowingSymptoms,
                vec![
                    TransitionEdge::new(SeriouslySick, median(14.0, 4.0)),
                    TransitionEdge::new(Recovered, median(7.0, 2.0)),
                ],
            ),
            (
                SeriouslySick,
                vec![
                    TransitionEdge::new(Critical, median(12.0, 3.0)),
                    TransitionEdge::new(Recovered, median(7.0, 2.0)),
                ],
            ),
            (
                Critical,
                vec![TransitionEdge::new(
                    SeriouslySickAfterCritical,
                    median(14.0, 5.0),
                )],
            ),
            (
                SeriouslySickAfterCritical,
                vec![TransitionEdge::new(Recovered, median(7.0, 2.0))],
            ),
            (
                Recovered,
                vec![TransitionEdge::new(
                    Susceptible,
                    Transition::LogNormalWithMean {
                        mean: 360.0,
                        std: 15.0,
                    },
                )],
            ),
        ]);
        ProgressionConfig { transitions }
    }
}

/// A disease status change, as reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub person: PersonId,
    /// Absolute time in seconds
    pub time: f64,
    pub from: DiseaseStatus,
    pub to: DiseaseStatus,
}

#[derive(Debug, Clone)]
pub struct ProgressionModel {
    transitions: BTreeMap<DiseaseStatus, Vec<TransitionEdge>>,
}

impl ProgressionModel {
    pub fn new(config: &ProgressionConfig) -> Result<Self, EpisimError> {
        for (from, edges) in &config.transitions {
            if *from == DiseaseStatus::Susceptible {
                return Err(EpisimError::config(
                    "susceptible persons only leave their status through infection",
                ));
            }
            for (i, edge) in edges.iter().enumerate() {
                if !from.can_transition_to(edge.to) {
                    return Err(EpisimError::config(format!(
                        "transition {from} -> {} is not allowed",
                        edge.to
                    )));
                }
                if edges[..i].iter().any(|earlier| earlier.to == edge.to) {
                    return Err(EpisimError::config(format!(
                        "duplicate transition {from} -> {}",
                        edge.to
                    )));
                }
                edge.transition.validate()?;
            }
        }
        Ok(ProgressionModel {
            transitions: config.transitions.clone(),
        })
    }

    #[must_use]
    pub fn edges(&self, status: DiseaseStatus) -> &[TransitionEdge] {
        self.transitions.get(&status).map_or(&[], Vec::as_slice)
    }

    /// Races the outgoing edges of `status`.
    pub fn draw_next<R: Rng>(
        &self,
        status: DiseaseStatus,
        rng: &mut R,
    ) -> Option<ScheduledTransition> {
        let mut winner: Option<ScheduledTransition> = None;
        for edge in self.edges(status) {
            let day_offset = edge.transition.sample_day(rng);
            if winner.is_none_or(|w| day_offset < w.day_offset) {
                winner = Some(ScheduledTransition {
                    to: edge.to,
                    day_offset,
                });
            }
        }
        winner
    }

    /// Applies every transition due on `day`. Calling this twice on the same day changes
    /// nothing the second time.
    pub fn update_state<R: Rng>(
        &self,
        person: &mut Person,
        day: u32,
        rng: &mut R,
    ) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        for _ in 0..MAX_STEPS_PER_DAY {
            let status = person.status();
            let next = match person.next_transition() {
                Some(next) => next,
                None => match self.draw_next(status, rng) {
                    Some(next) => {
                        person.set_next_transition(Some(next));
                        next
                    }
                    None => break,
                },
            };
            if person.days_since(status, day).unwrap_or(0) < next.day_offset {
                break;
            }
            let time = f64::from(day) * SECONDS_PER_DAY;
            person.set_status(next.to, time);
            trace!("{:?}: {status} -> {} on day {day}", person.id(), next.to);
            changes.push(StatusChange {
                person: person.id(),
                time,
                from: status,
                to: next.to,
            });
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::PersonRecord;
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn person() -> Person {
        let record = PersonRecord {
            id: "p".to_string(),
            age: 30,
            household: 0,
            region: None,
        };
        Person::new(PersonId(0), &record, 1)
    }

    fn mean_std(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, variance.sqrt())
    }

    #[test]
    fn race_takes_the_earliest_edge() {
        use DiseaseStatus::*;
        let config = ProgressionConfig {
            transitions: BTreeMap::from([(
                Contagious,
                vec![
                    TransitionEdge::new(Recovered, Transition::Fixed { days: 12 }),
                    TransitionEdge::new(ShowingSymptoms, Transition::Fixed { days: 4 }),
                ],
            )]),
        };
        let model = ProgressionModel::new(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..1000 {
            let next = model.draw_next(Contagious, &mut rng).unwrap();
            assert_eq!(next.to, ShowingSymptoms);
            assert_eq!(next.day_offset, 4);
        }
    }

    #[test]
    fn ties_go_to_the_first_edge() {
        use DiseaseStatus::*;
        let config = ProgressionConfig {
            transitions: BTreeMap::from([(
                Contagious,
                vec![
                    TransitionEdge::new(Recovered, Transition::Fixed { days: 3 }),
                    TransitionEdge::new(ShowingSymptoms, Transition::Fixed { days: 3 }),
                ],
            )]),
        };
        let model = ProgressionModel::new(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(model.draw_next(Contagious, &mut rng).unwrap().to, Recovered);
    }

    #[test]
    fn log_normal_with_mean_matches_moments() {
        let transition = Transition::LogNormalWithMean {
            mean: 10.0,
            std: 5.0,
        };
        let mut rng = SmallRng::seed_from_u64(42);
        let samples: Vec<f64> = (0..400_000).map(|_| transition.sample_days(&mut rng)).collect();
        let (mean, std) = mean_std(&samples);
        assert_relative_eq!(mean, 10.0, max_relative = 0.01);
        assert_relative_eq!(std, 5.0, max_relative = 0.01);
    }

    #[test]
    fn log_normal_with_median_matches_moments() {
        let transition = Transition::LogNormalWithMedian {
            median: 5.0,
            std: 2.0,
        };
        let (mu, sigma) = transition.log_normal_params().unwrap();
        assert_relative_eq!(mu.exp(), 5.0, epsilon = 1e-12);
        let variance = ((sigma * sigma).exp() - 1.0) * (2.0 * mu + sigma * sigma).exp();
        assert_relative_eq!(variance.sqrt(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_std_is_deterministic() {
        let transition = Transition::LogNormalWithMean {
            mean: 7.0,
            std: 0.0,
        };
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..10 {
            assert_eq!(transition.sample_day(&mut rng), 7);
        }
    }

    #[test]
    fn update_applies_due_transition_once() {
        use DiseaseStatus::*;
        let config = ProgressionConfig {
            transitions: BTreeMap::from([(
                InfectedButNotContagious,
                vec![TransitionEdge::new(Contagious, Transition::Fixed { days: 3 })],
            )]),
        };
        let model = ProgressionModel::new(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut person = person();
        person.set_status(InfectedButNotContagious, 5.0 * SECONDS_PER_DAY + 100.0);

        for day in 6..8 {
            assert!(model.update_state(&mut person, day, &mut rng).is_empty());
        }
        let changes = model.update_state(&mut person, 8, &mut rng);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, InfectedButNotContagious);
        assert_eq!(changes[0].to, Contagious);
        assert_eq!(changes[0].time, 8.0 * SECONDS_PER_DAY);
        assert!(model.update_state(&mut person, 8, &mut rng).is_empty());
        assert_eq!(person.status(), Contagious);
    }

    #[test]
    fn zero_day_transitions_chain() {
        use DiseaseStatus::*;
        let config = ProgressionConfig {
            transitions: BTreeMap::from([
                (
                    InfectedButNotContagious,
                    vec![TransitionEdge::new(Contagious, Transition::Fixed { days: 1 })],
                ),
                (
                    Contagious,
                    vec![TransitionEdge::new(ShowingSymptoms, Transition::Fixed { days: 0 })],
                ),
            ]),
        };
        let model = ProgressionModel::new(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut person = person();
        person.set_status(InfectedButNotContagious, 0.0);
        let changes = model.update_state(&mut person, 1, &mut rng);
        assert_eq!(changes.len(), 2);
        assert_eq!(person.status(), ShowingSymptoms);
    }

    #[test]
    fn default_table_is_valid_and_loops_back() {
        let model = ProgressionModel::new(&ProgressionConfig::default()).unwrap();
        assert!(model.edges(DiseaseStatus::Susceptible).is_empty());
        assert_eq!(
            model.edges(DiseaseStatus::Recovered)[0].to,
            DiseaseStatus::Susceptible
        );
    }

    #[test]
    fn illegal_edges_are_rejected() {
        let config = ProgressionConfig {
            transitions: BTreeMap::from([(
                DiseaseStatus::Contagious,
                vec![TransitionEdge::new(
                    DiseaseStatus::Critical,
                    Transition::Fixed { days: 1 },
                )],
            )]),
        };
        assert!(ProgressionModel::new(&config).unwrap_err().is_config_error());

        let config = ProgressionConfig {
            transitions: BTreeMap::from([(
                DiseaseStatus::Contagious,
                vec![TransitionEdge::new(
                    DiseaseStatus::Recovered,
                    Transition::LogNormalWithMean {
                        mean: -1.0,
                        std: 1.0,
                    },
                )],
            )]),
        };
        assert!(ProgressionModel::new(&config).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let json = serde_json::to_string(&ProgressionConfig::default()).unwrap();
        let parsed: ProgressionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ProgressionConfig::default());
        let custom: ProgressionConfig = serde_json::from_str(
            r#"{"contagious": [{"to": "recovered", "transition": {"type": "Fixed", "days": 9}}]}"#,
        )
        .unwrap();
        assert_eq!(
            custom.transitions[&DiseaseStatus::Contagious][0].transition,
            Transition::Fixed { days: 9 }
        );
    }
}
