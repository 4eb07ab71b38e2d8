//! Whether a person's activity instance takes place under the day's restrictions.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::restriction::Restriction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParticipationModel {
    /// The activity's remaining fraction applies everywhere.
    #[default]
    Default,
    /// Regional remaining fractions override the activity's, keyed by the facility's region or,
    /// with `use_home_region`, by the person's.
    LocationBased {
        #[serde(default)]
        use_home_region: bool,
    },
}

impl ParticipationModel {
    #[must_use]
    pub fn remaining_fraction(
        &self,
        restriction: &Restriction,
        facility_region: Option<&str>,
        home_region: Option<&str>,
    ) -> f64 {
        match *self {
            ParticipationModel::Default => restriction.remaining_fraction,
            ParticipationModel::LocationBased { use_home_region } => restriction
                .remaining_fraction_for(if use_home_region {
                    home_region
                } else {
                    facility_region
                }),
        }
    }

    /// Draws participation. No random number is consumed at the boundaries.
    pub fn participates<R: Rng>(remaining_fraction: f64, rng: &mut R) -> bool {
        if remaining_fraction >= 1.0 {
            true
        } else if remaining_fraction <= 0.0 {
            false
        } else {
            rng.random::<f64>() < remaining_fraction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restriction::RestrictionUpdate;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    #[test]
    fn boundaries_do_not_draw() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut untouched = rng.clone();
        assert!(ParticipationModel::participates(1.0, &mut rng));
        assert!(!ParticipationModel::participates(0.0, &mut rng));
        assert_eq!(rng.random::<u64>(), untouched.random::<u64>());
    }

    #[test]
    fn fraction_is_the_participation_rate() {
        let mut rng = SmallRng::seed_from_u64(9);
        let n = 100_000;
        let count = (0..n)
            .filter(|_| ParticipationModel::participates(0.3, &mut rng))
            .count();
        assert!((count as f64 / f64::from(n) - 0.3).abs() < 0.01);
    }

    #[test]
    fn location_based_uses_region_fraction() {
        let mut restriction = Restriction::open();
        restriction.apply(&RestrictionUpdate::fraction(0.8));
        restriction.apply(&RestrictionUpdate {
            region_fraction: Some(BTreeMap::from([("north".to_string(), 0.2)])),
            ..RestrictionUpdate::default()
        });

        let default = ParticipationModel::Default;
        assert_eq!(default.remaining_fraction(&restriction, Some("north"), None), 0.8);

        let by_facility = ParticipationModel::LocationBased {
            use_home_region: false,
        };
        assert_eq!(
            by_facility.remaining_fraction(&restriction, Some("north"), Some("south")),
            0.2
        );
        assert_eq!(by_facility.remaining_fraction(&restriction, None, Some("north")), 0.8);

        let by_home = ParticipationModel::LocationBased {
            use_home_region: true,
        };
        assert_eq!(
            by_home.remaining_fraction(&restriction, Some("south"), Some("north")),
            0.2
        );
    }

    #[test]
    fn parses_from_json() {
        let model: ParticipationModel =
            serde_json::from_str(r#"{"type": "LocationBased", "use_home_region": true}"#).unwrap();
        assert_eq!(
            model,
            ParticipationModel::LocationBased {
                use_home_region: true
            }
        );
        let model: ParticipationModel = serde_json::from_str(r#"{"type": "Default"}"#).unwrap();
        assert_eq!(model, ParticipationModel::Default);
    }
}
