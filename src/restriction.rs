//! The restriction in force for one activity type on one day.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calendar::SECONDS_PER_DAY;
use crate::error::EpisimError;
use crate::mask::{validate_mandate, MaskMandate};

/// An interval of the day during which facilities are closed. `from > to` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosingHours {
    /// Seconds since midnight
    pub from: f64,
    /// Seconds since midnight
    pub to: f64,
}

impl ClosingHours {
    /// Seconds of `[start, end)` (seconds since midnight) that fall in the closed interval.
    #[must_use]
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        let intersect = |a: f64, b: f64| (end.min(b) - start.max(a)).max(0.0);
        if self.from <= self.to {
            intersect(self.from, self.to)
        } else {
            intersect(self.from, SECONDS_PER_DAY) + intersect(0.0, self.to)
        }
    }

    fn validate(&self) -> Result<(), EpisimError> {
        let day = 0.0..=SECONDS_PER_DAY;
        if !day.contains(&self.from) || !day.contains(&self.to) {
            return Err(EpisimError::config(
                "closing hours must lie within [0, 86400] seconds",
            ));
        }
        Ok(())
    }
}

/// A fully resolved restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    /// Probability an optional activity instance still takes place.
    pub remaining_fraction: f64,
    /// Multiplier on the contact intensity.
    pub ci_correction: f64,
    pub masks: MaskMandate,
    /// Changes whenever `masks` changes, so mask draws are redone per mandate.
    pub mask_epoch: u32,
    pub group_size_cap: Option<u32>,
    pub closing_hours: Vec<ClosingHours>,
    /// Region specific replacements for `remaining_fraction`.
    pub region_fraction: BTreeMap<String, f64>,
}

impl Default for Restriction {
    fn default() -> Self {
        Restriction::open()
    }
}

impl Restriction {
    /// No restriction at all.
    #[must_use]
    pub fn open() -> Self {
        Restriction {
            remaining_fraction: 1.0,
            ci_correction: 1.0,
            masks: MaskMandate::new(),
            mask_epoch: 0,
            group_size_cap: None,
            closing_hours: Vec::new(),
            region_fraction: BTreeMap::new(),
        }
    }

    /// The remaining fraction for a container in `region`. The override only applies when the
    /// region matches.
    #[must_use]
    pub fn remaining_fraction_for(&self, region: Option<&str>) -> f64 {
        region
            .and_then(|region| self.region_fraction.get(region))
            .copied()
            .unwrap_or(self.remaining_fraction)
    }

    /// Seconds of `[start, end)` (seconds since midnight) during which facilities are closed.
    #[must_use]
    pub fn closed_seconds(&self, start: f64, end: f64) -> f64 {
        self.closing_hours
            .iter()
            .map(|hours| hours.overlap(start, end))
            .sum::<f64>()
            .min((end - start).max(0.0))
    }

    /// Overwrites every field `update` sets.
    pub fn apply(&mut self, update: &RestrictionUpdate) {
        if let Some(fraction) = update.remaining_fraction {
            self.remaining_fraction = fraction;
        }
        if let Some(correction) = update.ci_correction {
            self.ci_correction = correction;
        }
        if let Some(masks) = &update.masks {
            if *masks != self.masks {
                self.masks = masks.clone();
                self.mask_epoch += 1;
            }
        }
        if let Some(cap) = update.group_size_cap {
            self.group_size_cap = (cap > 0).then_some(cap);
        }
        if let Some(hours) = &update.closing_hours {
            self.closing_hours = hours.clone();
        }
        if let Some(regions) = &update.region_fraction {
            self.region_fraction = regions.clone();
        }
    }
}

/// A partial restriction: one timeline entry. Unset fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionUpdate {
    pub remaining_fraction: Option<f64>,
    pub ci_correction: Option<f64>,
    pub masks: Option<MaskMandate>,
    /// `0` lifts an earlier cap.
    pub group_size_cap: Option<u32>,
    /// An empty list lifts earlier closing hours.
    pub closing_hours: Option<Vec<ClosingHours>>,
    pub region_fraction: Option<BTreeMap<String, f64>>,
}

impl RestrictionUpdate {
    #[must_use]
    pub fn fraction(remaining_fraction: f64) -> Self {
        RestrictionUpdate {
            remaining_fraction: Some(remaining_fraction),
            ..RestrictionUpdate::default()
        }
    }

    #[must_use]
    pub fn ci_correction(ci_correction: f64) -> Self {
        RestrictionUpdate {
            ci_correction: Some(ci_correction),
            ..RestrictionUpdate::default()
        }
    }

    #[must_use]
    pub fn masks(masks: MaskMandate) -> Self {
        RestrictionUpdate {
            masks: Some(masks),
            ..RestrictionUpdate::default()
        }
    }

    /// Combines two updates; fields set in `other` win.
    #[must_use]
    pub fn merge(&self, other: &RestrictionUpdate) -> RestrictionUpdate {
        RestrictionUpdate {
            remaining_fraction: other.remaining_fraction.or(self.remaining_fraction),
            ci_correction: other.ci_correction.or(self.ci_correction),
            masks: other.masks.clone().or_else(|| self.masks.clone()),
            group_size_cap: other.group_size_cap.or(self.group_size_cap),
            closing_hours: other
                .closing_hours
                .clone()
                .or_else(|| self.closing_hours.clone()),
            region_fraction: other
                .region_fraction
                .clone()
                .or_else(|| self.region_fraction.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), EpisimError> {
        let unit = 0.0..=1.0;
        if let Some(fraction) = self.remaining_fraction {
            if !unit.contains(&fraction) {
                return Err(EpisimError::config(format!(
                    "remaining fraction {fraction} is outside [0, 1]"
                )));
            }
        }
        if let Some(correction) = self.ci_correction {
            if correction.is_nan() || correction < 0.0 {
                return Err(EpisimError::config(format!(
                    "ci correction {correction} must be >= 0"
                )));
            }
        }
        if let Some(masks) = &self.masks {
            validate_mandate(masks)?;
        }
        if let Some(hours) = &self.closing_hours {
            for closing in hours {
                closing.validate()?;
            }
        }
        if let Some(regions) = &self.region_fraction {
            for (region, fraction) in regions {
                if !unit.contains(fraction) {
                    return Err(EpisimError::config(format!(
                        "remaining fraction {fraction} for region `{region}` is outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::FaceMask;

    #[test]
    fn open_restriction_is_neutral() {
        let open = Restriction::open();
        assert_eq!(open.remaining_fraction, 1.0);
        assert_eq!(open.ci_correction, 1.0);
        assert!(open.masks.is_empty());
        assert_eq!(open.group_size_cap, None);
        assert_eq!(open.closed_seconds(0.0, SECONDS_PER_DAY), 0.0);
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut restriction = Restriction::open();
        restriction.apply(&RestrictionUpdate::fraction(0.4));
        restriction.apply(&RestrictionUpdate::ci_correction(0.5));
        assert_eq!(restriction.remaining_fraction, 0.4);
        assert_eq!(restriction.ci_correction, 0.5);

        restriction.apply(&RestrictionUpdate {
            group_size_cap: Some(20),
            ..RestrictionUpdate::default()
        });
        assert_eq!(restriction.group_size_cap, Some(20));
        restriction.apply(&RestrictionUpdate {
            group_size_cap: Some(0),
            ..RestrictionUpdate::default()
        });
        assert_eq!(restriction.group_size_cap, None);
        assert_eq!(restriction.remaining_fraction, 0.4);
    }

    #[test]
    fn mask_epoch_changes_with_mandate() {
        let mut restriction = Restriction::open();
        let mandate = MaskMandate::from([(FaceMask::Cloth, 0.5)]);
        restriction.apply(&RestrictionUpdate::masks(mandate.clone()));
        assert_eq!(restriction.mask_epoch, 1);
        restriction.apply(&RestrictionUpdate::masks(mandate));
        assert_eq!(restriction.mask_epoch, 1);
        restriction.apply(&RestrictionUpdate::masks(MaskMandate::from([(
            FaceMask::N95,
            0.9,
        )])));
        assert_eq!(restriction.mask_epoch, 2);
    }

    #[test]
    fn region_override_requires_match() {
        let mut restriction = Restriction::open();
        restriction.apply(&RestrictionUpdate {
            remaining_fraction: Some(0.5),
            region_fraction: Some(BTreeMap::from([("Berlin".to_string(), 0.2)])),
            ..RestrictionUpdate::default()
        });
        assert_eq!(restriction.remaining_fraction_for(Some("Berlin")), 0.2);
        assert_eq!(restriction.remaining_fraction_for(Some("Cologne")), 0.5);
        assert_eq!(restriction.remaining_fraction_for(None), 0.5);
    }

    #[test]
    fn closing_hours_overlap() {
        let mut restriction = Restriction::open();
        // closed 22:00 - 06:00
        restriction.apply(&RestrictionUpdate {
            closing_hours: Some(vec![ClosingHours {
                from: 22.0 * 3600.0,
                to: 6.0 * 3600.0,
            }]),
            ..RestrictionUpdate::default()
        });
        assert_eq!(restriction.closed_seconds(8.0 * 3600.0, 20.0 * 3600.0), 0.0);
        assert_eq!(
            restriction.closed_seconds(21.0 * 3600.0, 23.0 * 3600.0),
            3600.0
        );
        assert_eq!(restriction.closed_seconds(0.0, 7.0 * 3600.0), 6.0 * 3600.0);
        assert_eq!(
            restriction.closed_seconds(0.0, SECONDS_PER_DAY),
            8.0 * 3600.0
        );
    }

    #[test]
    fn merge_prefers_newer_fields() {
        let a = RestrictionUpdate {
            remaining_fraction: Some(0.3),
            ci_correction: Some(0.5),
            ..RestrictionUpdate::default()
        };
        let merged = a.merge(&RestrictionUpdate::fraction(0.8));
        assert_eq!(merged.remaining_fraction, Some(0.8));
        assert_eq!(merged.ci_correction, Some(0.5));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        assert!(RestrictionUpdate::fraction(1.2).validate().is_err());
        assert!(RestrictionUpdate::ci_correction(-0.1).validate().is_err());
        assert!(RestrictionUpdate::fraction(0.0).validate().is_ok());
        let hours = RestrictionUpdate {
            closing_hours: Some(vec![ClosingHours {
                from: -1.0,
                to: 10.0,
            }]),
            ..RestrictionUpdate::default()
        };
        assert!(hours.validate().is_err());
    }
}
