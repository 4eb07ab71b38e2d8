//! Seasonal shift of activities between indoors and outdoors.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seasonality {
    /// Share of seasonal activities that happen outdoors, interpolated between dates.
    pub outdoor_fraction: BTreeMap<NaiveDate, f64>,
    /// Hazard multiplier of an outdoor exposure relative to indoors.
    pub outdoor_factor: f64,
}

impl Default for Seasonality {
    fn default() -> Self {
        Seasonality {
            outdoor_fraction: BTreeMap::new(),
            outdoor_factor: 0.1,
        }
    }
}

impl Seasonality {
    pub fn validate(&self) -> Result<(), EpisimError> {
        if !(0.0..=1.0).contains(&self.outdoor_factor) {
            return Err(EpisimError::config("outdoor factor must be in [0, 1]"));
        }
        if let Some((date, fraction)) = self
            .outdoor_fraction
            .iter()
            .find(|(_, f)| !(0.0..=1.0).contains(*f))
        {
            return Err(EpisimError::config(format!(
                "outdoor fraction {fraction} on {date} is outside [0, 1]"
            )));
        }
        Ok(())
    }

    /// Linear interpolation between the surrounding entries; constant beyond the ends.
    #[must_use]
    pub fn outdoor_fraction(&self, date: NaiveDate) -> f64 {
        let before = self.outdoor_fraction.range(..=date).next_back();
        let after = self.outdoor_fraction.range(date..).next();
        match (before, after) {
            (None, None) => 0.0,
            (Some((_, f)), None) | (None, Some((_, f))) => *f,
            (Some((d0, f0)), Some((d1, f1))) => {
                if d0 == d1 {
                    return *f0;
                }
                #[allow(clippy::cast_precision_loss)]
                let t = (date - *d0).num_days() as f64 / (*d1 - *d0).num_days() as f64;
                f0 + (f1 - f0) * t
            }
        }
    }

    /// Expected hazard multiplier of a seasonal activity on `date`.
    #[must_use]
    pub fn factor(&self, date: NaiveDate) -> f64 {
        1.0 - self.outdoor_fraction(date) * (1.0 - self.outdoor_factor)
    }
}
