//! Face masks and who wears which.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::activity::ActivityId;
use crate::error::EpisimError;
use crate::hashing::{hash_keys, hash_to_unit};
use crate::people::PersonId;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
pub enum FaceMask {
    None,
    Cloth,
    Surgical,
    N95,
}

impl FaceMask {
    /// Factor applied to the hazard when the wearer is infectious.
    #[must_use]
    pub fn shedding(self) -> f64 {
        match self {
            FaceMask::None => 1.0,
            FaceMask::Cloth => 0.6,
            FaceMask::Surgical => 0.3,
            FaceMask::N95 => 0.15,
        }
    }

    /// Factor applied to the hazard when the wearer is susceptible.
    #[must_use]
    pub fn intake(self) -> f64 {
        match self {
            FaceMask::None => 1.0,
            FaceMask::Cloth => 0.5,
            FaceMask::Surgical => 0.2,
            FaceMask::N95 => 0.025,
        }
    }
}

/// Share of people wearing each mask type. The remainder wears none.
pub type MaskMandate = BTreeMap<FaceMask, f64>;

pub fn validate_mandate(mandate: &MaskMandate) -> Result<(), EpisimError> {
    let mut total = 0.0;
    for (mask, compliance) in mandate {
        if !(0.0..=1.0).contains(compliance) {
            return Err(EpisimError::config(format!(
                "mask compliance for {mask} must be in [0, 1]"
            )));
        }
        total += compliance;
    }
    if total > 1.0 + 1e-9 {
        return Err(EpisimError::config(format!(
            "mask compliance sums to {total}, which exceeds 1"
        )));
    }
    Ok(())
}

/// Decides which mask a person wears in an activity.
///
/// The draw is a hash of the person, the activity and the mandate epoch, so the same person keeps
/// the same mask for as long as a mandate stays unchanged and gets a fresh draw when it changes.
#[derive(Debug, Clone, Copy)]
pub struct MaskModel {
    seed: u64,
}

impl MaskModel {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        MaskModel { seed }
    }

    #[must_use]
    pub fn mask_for(
        &self,
        person: PersonId,
        activity: ActivityId,
        mandate: &MaskMandate,
        epoch: u32,
    ) -> FaceMask {
        if mandate.is_empty() {
            return FaceMask::None;
        }
        let draw = hash_to_unit(hash_keys(
            self.seed,
            "MaskModel",
            &[
                u64::from(person.0),
                u64::from(activity.0),
                u64::from(epoch),
            ],
        ));
        let mut cumulative = 0.0;
        // Strongest masks first
        for (mask, compliance) in mandate.iter().rev() {
            cumulative += compliance;
            if draw < cumulative {
                return *mask;
            }
        }
        FaceMask::None
    }
}
