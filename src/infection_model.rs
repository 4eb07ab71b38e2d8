//! Pairwise transmission probability.
//!
//! All variants share one hazard formula
//!
//! `p = 1 - exp(-θ · ci · ciCorrection · seasonality · joint/86400 · shedding · intake
//!       · infectivity · susceptibility / spaces)`
//!
//! and differ only in how they adjust its inputs.
use serde::{Deserialize, Serialize};

use crate::calendar::SECONDS_PER_DAY;
use crate::error::EpisimError;
use crate::mask::FaceMask;

const VIRAL_LOAD_PEAK_DAY: f64 = 0.5;
const VIRAL_LOAD_SD_DAYS: f64 = 2.6;

/// A multiplier for everyone at least `min_age` years old (up to the next band).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub min_age: u8,
    pub factor: f64,
}

fn age_factor(bands: &[AgeBand], age: u8) -> f64 {
    bands
        .iter()
        .filter(|band| band.min_age <= age)
        .max_by_key(|band| band.min_age)
        .map_or(1.0, |band| band.factor)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InfectionModel {
    #[default]
    Default,
    /// Age dependent susceptibility of the target and infectivity of the infector.
    AgeDependent {
        susceptibility: Vec<AgeBand>,
        infectivity: Vec<AgeBand>,
    },
    /// Infectivity follows the viral load, peaking around symptom onset.
    ViralLoad {
        /// Assumed time from becoming contagious to symptom onset, for infectors without
        /// symptoms yet.
        presymptomatic_days: f64,
    },
    /// Contact intensity is shared among everyone in a space.
    Symmetric,
}

/// Inputs of one pairwise exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    pub calibration: f64,
    pub contact_intensity: f64,
    pub ci_correction: f64,
    pub seasonality: f64,
    pub joint_seconds: f64,
    pub infector_mask: FaceMask,
    pub target_mask: FaceMask,
    /// Strain infectiousness times the immunity multiplier of the infector.
    pub infectivity: f64,
    /// Immunity multiplier of the target.
    pub susceptibility: f64,
    pub spaces: f64,
    /// Largest simultaneous occupancy of the container.
    pub group_size: usize,
    pub infector_age: u8,
    pub target_age: u8,
    /// Days since the infector's symptom onset, if symptomatic.
    pub days_since_symptoms: Option<f64>,
    /// Days since the infector became contagious.
    pub days_contagious: f64,
}

impl Default for Exposure {
    fn default() -> Self {
        Exposure {
            calibration: 1.0,
            contact_intensity: 1.0,
            ci_correction: 1.0,
            seasonality: 1.0,
            joint_seconds: 0.0,
            infector_mask: FaceMask::None,
            target_mask: FaceMask::None,
            infectivity: 1.0,
            susceptibility: 1.0,
            spaces: 1.0,
            group_size: 2,
            infector_age: 40,
            target_age: 40,
            days_since_symptoms: None,
            days_contagious: 0.0,
        }
    }
}

impl InfectionModel {
    pub fn validate(&self) -> Result<(), EpisimError> {
        match self {
            InfectionModel::AgeDependent {
                susceptibility,
                infectivity,
            } => {
                if susceptibility
                    .iter()
                    .chain(infectivity)
                    .any(|band| band.factor.is_nan() || band.factor < 0.0)
                {
                    return Err(EpisimError::config("age band factors must be >= 0"));
                }
            }
            InfectionModel::ViralLoad {
                presymptomatic_days,
            } => {
                if presymptomatic_days.is_nan() || *presymptomatic_days < 0.0 {
                    return Err(EpisimError::config("presymptomatic days must be >= 0"));
                }
            }
            InfectionModel::Default | InfectionModel::Symmetric => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn probability(&self, exposure: &Exposure) -> f64 {
        if exposure.joint_seconds <= 0.0 || exposure.spaces <= 0.0 {
            return 0.0;
        }
        let mut contact_intensity = exposure.contact_intensity;
        let mut infectivity = exposure.infectivity;
        let mut susceptibility = exposure.susceptibility;
        match self {
            InfectionModel::Default => {}
            InfectionModel::AgeDependent {
                susceptibility: by_age_target,
                infectivity: by_age_infector,
            } => {
                susceptibility *= age_factor(by_age_target, exposure.target_age);
                infectivity *= age_factor(by_age_infector, exposure.infector_age);
            }
            InfectionModel::ViralLoad {
                presymptomatic_days,
            } => {
                let days = exposure
                    .days_since_symptoms
                    .unwrap_or(exposure.days_contagious - presymptomatic_days);
                infectivity *= viral_load(days);
            }
            InfectionModel::Symmetric => {
                #[allow(clippy::cast_precision_loss)]
                let per_space = exposure.group_size as f64 / exposure.spaces;
                contact_intensity /= per_space.max(1.0);
            }
        }
        let exponent = exposure.calibration
            * contact_intensity
            * exposure.ci_correction
            * exposure.seasonality
            * exposure.joint_seconds
            / SECONDS_PER_DAY
            * exposure.infector_mask.shedding()
            * exposure.target_mask.intake()
            * infectivity
            * susceptibility
            / exposure.spaces;
        1.0 - (-exponent.max(0.0)).exp()
    }
}

/// Relative viral load `days` after symptom onset, 1 at the peak.
#[must_use]
pub fn viral_load(days: f64) -> f64 {
    let z = (days - VIRAL_LOAD_PEAK_DAY) / VIRAL_LOAD_SD_DAYS;
    (-0.5 * z * z).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exposure(joint_seconds: f64) -> Exposure {
        Exposure {
            calibration: 2.0,
            joint_seconds,
            ..Exposure::default()
        }
    }

    #[test]
    fn matches_hazard_formula() {
        let p = InfectionModel::Default.probability(&exposure(SECONDS_PER_DAY / 2.0));
        assert_relative_eq!(p, 1.0 - (-1.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn non_decreasing_in_joint_time() {
        let models = [
            InfectionModel::Default,
            InfectionModel::Symmetric,
            InfectionModel::ViralLoad {
                presymptomatic_days: 2.0,
            },
        ];
        for model in &models {
            let mut last = 0.0;
            for minutes in 0..=24 * 60 {
                let p = model.probability(&exposure(f64::from(minutes) * 60.0));
                assert!(p >= last);
                last = p;
            }
        }
    }

    #[test]
    fn zero_cases() {
        let model = InfectionModel::Default;
        assert_eq!(model.probability(&exposure(0.0)), 0.0);
        assert_eq!(model.probability(&exposure(-10.0)), 0.0);
        let closed = Exposure {
            ci_correction: 0.0,
            ..exposure(3600.0)
        };
        assert_eq!(model.probability(&closed), 0.0);
    }

    #[test]
    fn more_spaces_dilute() {
        let model = InfectionModel::Default;
        let mut last = 1.0;
        for spaces in [1.0, 2.0, 4.0, 8.0, 16.0] {
            let p = model.probability(&Exposure {
                spaces,
                ..exposure(3600.0)
            });
            assert!(p < last);
            last = p;
        }
    }

    #[test]
    fn masks_reduce_probability() {
        let model = InfectionModel::Default;
        let bare = model.probability(&exposure(3600.0));
        let masked = model.probability(&Exposure {
            infector_mask: FaceMask::Surgical,
            target_mask: FaceMask::Cloth,
            ..exposure(3600.0)
        });
        assert!(masked < bare);
    }

    #[test]
    fn age_bands_scale_susceptibility() {
        let model = InfectionModel::AgeDependent {
            susceptibility: vec![
                AgeBand {
                    min_age: 0,
                    factor: 0.5,
                },
                AgeBand {
                    min_age: 60,
                    factor: 2.0,
                },
            ],
            infectivity: vec![],
        };
        let young = model.probability(&Exposure {
            target_age: 10,
            ..exposure(3600.0)
        });
        let old = model.probability(&Exposure {
            target_age: 70,
            ..exposure(3600.0)
        });
        let plain = InfectionModel::Default.probability(&exposure(3600.0));
        assert!(young < plain);
        assert!(old > plain);
    }

    #[test]
    fn viral_load_peaks_after_onset() {
        assert_relative_eq!(viral_load(0.5), 1.0);
        assert!(viral_load(-3.0) < viral_load(0.0));
        assert!(viral_load(5.0) < viral_load(1.0));
    }

    #[test]
    fn symmetric_shares_intensity_in_crowds() {
        let crowded = Exposure {
            group_size: 20,
            spaces: 2.0,
            ..exposure(3600.0)
        };
        let small = Exposure {
            group_size: 2,
            spaces: 2.0,
            ..exposure(3600.0)
        };
        let model = InfectionModel::Symmetric;
        assert!(model.probability(&crowded) < model.probability(&small));
        assert_eq!(
            model.probability(&small),
            InfectionModel::Default.probability(&small)
        );
    }
}
