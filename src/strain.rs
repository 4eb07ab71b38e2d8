//! Virus strains, vaccine types and the immunization events that combine them.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EpisimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrainId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaccineId(pub u8);

/// Something that primes the immune system: a vaccine dose or an infection with a strain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImmunityEvent {
    Vaccination(VaccineId),
    Infection(StrainId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrainParams {
    /// Base infectiousness multiplier relative to the reference strain.
    pub infectiousness: f64,
    /// Antibody titer at which protection reaches half of its range.
    pub ak50: f64,
    /// Protection of someone with a vanishingly small but nonzero titer.
    pub effectiveness_min: f64,
    /// Protection in the limit of infinite titer.
    pub effectiveness_max: f64,
}

impl Default for StrainParams {
    fn default() -> Self {
        StrainParams {
            infectiousness: 1.0,
            ak50: 0.2,
            effectiveness_min: 0.0,
            effectiveness_max: 1.0,
        }
    }
}

impl StrainParams {
    /// Protection conferred by `titer` against this strain, in
    /// `[effectiveness_min, effectiveness_max]`, or 0 without antibodies.
    #[must_use]
    pub fn effectiveness(&self, titer: f64) -> f64 {
        if titer <= 0.0 {
            return 0.0;
        }
        let effect = titer / (titer + self.ak50);
        self.effectiveness_min + (self.effectiveness_max - self.effectiveness_min) * effect
    }

    fn validate(&self, name: &str) -> Result<(), EpisimError> {
        if self.infectiousness.is_nan() || self.infectiousness < 0.0 {
            return Err(EpisimError::config(format!(
                "strain `{name}`: infectiousness must be >= 0"
            )));
        }
        if self.ak50.is_nan() || self.ak50 <= 0.0 {
            return Err(EpisimError::config(format!("strain `{name}`: ak50 must be > 0")));
        }
        let range = 0.0..=1.0;
        if !range.contains(&self.effectiveness_min)
            || !range.contains(&self.effectiveness_max)
            || self.effectiveness_min > self.effectiveness_max
        {
            return Err(EpisimError::config(format!(
                "strain `{name}`: effectiveness range must satisfy 0 <= min <= max <= 1"
            )));
        }
        Ok(())
    }
}

/// Configured strains, indexed by `StrainId` in name order.
#[derive(Debug, Clone)]
pub struct Strains {
    names: Vec<String>,
    params: Vec<StrainParams>,
}

impl Strains {
    pub fn new(config: &BTreeMap<String, StrainParams>) -> Result<Self, EpisimError> {
        if config.is_empty() {
            return Err(EpisimError::config("at least one strain must be configured"));
        }
        if config.len() > usize::from(u8::MAX) {
            return Err(EpisimError::config("too many strains"));
        }
        for (name, params) in config {
            params.validate(name)?;
        }
        Ok(Strains {
            names: config.keys().cloned().collect(),
            params: config.values().cloned().collect(),
        })
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn id(&self, name: &str) -> Option<StrainId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| StrainId(i as u8))
    }

    pub fn require(&self, name: &str) -> Result<StrainId, EpisimError> {
        self.id(name)
            .ok_or_else(|| EpisimError::config(format!("unknown strain `{name}`")))
    }

    #[must_use]
    pub fn name(&self, id: StrainId) -> &str {
        &self.names[usize::from(id.0)]
    }

    #[must_use]
    pub fn params(&self, id: StrainId) -> &StrainParams {
        &self.params[usize::from(id.0)]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn ids(&self) -> impl Iterator<Item = StrainId> {
        (0..self.names.len()).map(|i| StrainId(i as u8))
    }
}

/// Configured vaccine types, indexed by `VaccineId` in the order given.
#[derive(Debug, Clone, Default)]
pub struct Vaccines {
    names: Vec<String>,
}

impl Vaccines {
    pub fn new(names: &[String]) -> Result<Self, EpisimError> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(EpisimError::config(format!("duplicate vaccine `{name}`")));
            }
        }
        if names.len() > usize::from(u8::MAX) {
            return Err(EpisimError::config("too many vaccines"));
        }
        Ok(Vaccines {
            names: names.to_vec(),
        })
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn id(&self, name: &str) -> Option<VaccineId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| VaccineId(i as u8))
    }

    pub fn require(&self, name: &str) -> Result<VaccineId, EpisimError> {
        self.id(name)
            .ok_or_else(|| EpisimError::config(format!("unknown vaccine `{name}`")))
    }

    #[must_use]
    pub fn name(&self, id: VaccineId) -> &str {
        &self.names[usize::from(id.0)]
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn ids(&self) -> impl Iterator<Item = VaccineId> {
        (0..self.names.len()).map(|i| VaccineId(i as u8))
    }
}
