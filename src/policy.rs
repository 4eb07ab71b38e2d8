//! The restriction timeline: which restriction applies to which activity type on which date.
//!
//! A [`PolicyBuilder`] collects sparse, partial entries per activity type. [`PolicyBuilder::build`]
//! validates them and folds them into a [`RestrictionPolicy`] holding the fully resolved
//! restriction at every entry date. Resolution is then a pure lookup of the latest entry at or
//! before a date, so one policy can be shared by any number of concurrent runs.
use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::restriction::{Restriction, RestrictionUpdate};

/// The pre-parsed timeline: activity type -> date -> partial restriction.
pub type PolicyConfig = BTreeMap<String, BTreeMap<NaiveDate, RestrictionUpdate>>;

/// An edit of the point entries, applied before they are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyChange {
    /// See [`PolicyBuilder::interpolate`].
    Interpolate {
        start: NaiveDate,
        end: NaiveDate,
        from: RestrictionUpdate,
        to: RestrictionUpdate,
        activities: Vec<String>,
    },
    /// Drops entries on and after `date`; for every activity if `activities` is empty.
    ClearAfter {
        date: NaiveDate,
        #[serde(default)]
        activities: Vec<String>,
    },
    /// Multiplies explicitly set remaining fractions within `[from, to]` by `factor`.
    ScaleFraction {
        from: NaiveDate,
        to: NaiveDate,
        factor: f64,
        activities: Vec<String>,
    },
}

impl PolicyChange {
    #[must_use]
    pub fn activities(&self) -> &[String] {
        match self {
            PolicyChange::Interpolate { activities, .. }
            | PolicyChange::ClearAfter { activities, .. }
            | PolicyChange::ScaleFraction { activities, .. } => activities,
        }
    }

    pub fn validate(&self) -> Result<(), EpisimError> {
        match self {
            PolicyChange::Interpolate { start, end, .. } => {
                if start > end {
                    return Err(EpisimError::config(format!(
                        "interpolation ends on {end} before it starts on {start}"
                    )));
                }
            }
            PolicyChange::ScaleFraction {
                from, to, factor, ..
            } => {
                if from > to {
                    return Err(EpisimError::config(format!(
                        "fraction scaling ends on {to} before it starts on {from}"
                    )));
                }
                if !factor.is_finite() || *factor < 0.0 {
                    return Err(EpisimError::config("fraction scaling factor must be >= 0"));
                }
            }
            PolicyChange::ClearAfter { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    entries: PolicyConfig,
}

impl PolicyBuilder {
    #[must_use]
    pub fn new() -> Self {
        PolicyBuilder::default()
    }

    #[must_use]
    pub fn from_config(config: &PolicyConfig) -> Self {
        PolicyBuilder {
            entries: config.clone(),
        }
    }

    /// Adds `update` on `date` for each of `activities`. Fields already set for that date are
    /// overwritten.
    #[must_use]
    pub fn restrict(
        mut self,
        date: NaiveDate,
        update: &RestrictionUpdate,
        activities: &[&str],
    ) -> Self {
        for activity in activities {
            let timeline = self.entries.entry((*activity).to_string()).or_default();
            let merged = match timeline.get(&date) {
                Some(existing) => existing.merge(update),
                None => update.clone(),
            };
            timeline.insert(date, merged);
        }
        self
    }

    /// Linearly interpolates remaining fraction and ci correction from `from` on `start` to `to`
    /// on `end`, one entry per day, both ends inclusive. Other fields are taken from `from`
    /// until `end`, where `to` applies in full.
    #[must_use]
    pub fn interpolate(
        mut self,
        start: NaiveDate,
        end: NaiveDate,
        from: &RestrictionUpdate,
        to: &RestrictionUpdate,
        activities: &[&str],
    ) -> Self {
        let span = (end - start).num_days();
        if span <= 0 {
            return self.restrict(end, to, activities);
        }
        let lerp = |a: Option<f64>, b: Option<f64>, t: f64| match (a, b) {
            (Some(a), Some(b)) => Some(a + (b - a) * t),
            (a, b) => b.or(a),
        };
        let mut date = start;
        let mut offset = 0;
        while date < end {
            #[allow(clippy::cast_precision_loss)]
            let t = offset as f64 / span as f64;
            let update = RestrictionUpdate {
                remaining_fraction: lerp(from.remaining_fraction, to.remaining_fraction, t),
                ci_correction: lerp(from.ci_correction, to.ci_correction, t),
                ..from.clone()
            };
            self = self.restrict(date, &update, activities);
            offset += 1;
            match date.checked_add_days(Days::new(1)) {
                Some(next) => date = next,
                None => break,
            }
        }
        self.restrict(end, to, activities)
    }

    /// Removes every entry dated on or after `date`. Earlier entries stay in force past it.
    #[must_use]
    pub fn clear_after(self, date: NaiveDate) -> Self {
        let activities: Vec<String> = self.entries.keys().cloned().collect();
        self.clear_after_for(date, &activities)
    }

    /// [`PolicyBuilder::clear_after`] for `activities` only.
    #[must_use]
    pub fn clear_after_for<S: AsRef<str>>(mut self, date: NaiveDate, activities: &[S]) -> Self {
        for activity in activities {
            match self.entries.get_mut(activity.as_ref()) {
                Some(timeline) => timeline.retain(|entry_date, _| *entry_date < date),
                None => warn!("no restrictions for `{}` to clear", activity.as_ref()),
            }
        }
        self
    }

    /// Replaces each remaining fraction set explicitly on a date within `[from, to]` for one of
    /// `activities` with `f(date, fraction)`, clamped to `[0, 1]`. Entries that only change other
    /// fields, and dates without an entry, are left alone.
    #[must_use]
    pub fn adjust_remaining_fraction<S, F>(
        mut self,
        from: NaiveDate,
        to: NaiveDate,
        f: F,
        activities: &[S],
    ) -> Self
    where
        S: AsRef<str>,
        F: Fn(NaiveDate, f64) -> f64,
    {
        if from > to {
            return self;
        }
        for activity in activities {
            let Some(timeline) = self.entries.get_mut(activity.as_ref()) else {
                continue;
            };
            for (date, update) in timeline.range_mut(from..=to) {
                if let Some(fraction) = update.remaining_fraction.as_mut() {
                    *fraction = f(*date, *fraction).clamp(0.0, 1.0);
                }
            }
        }
        self
    }

    /// Applies `changes` in order, so later changes see the entries earlier ones produced.
    #[must_use]
    pub fn apply_changes(self, changes: &[PolicyChange]) -> Self {
        changes.iter().fold(self, |builder, change| builder.apply(change))
    }

    #[must_use]
    pub fn apply(self, change: &PolicyChange) -> Self {
        match change {
            PolicyChange::Interpolate {
                start,
                end,
                from,
                to,
                activities,
            } => {
                let activities: Vec<&str> = activities.iter().map(String::as_str).collect();
                self.interpolate(*start, *end, from, to, &activities)
            }
            PolicyChange::ClearAfter { date, activities } if activities.is_empty() => {
                self.clear_after(*date)
            }
            PolicyChange::ClearAfter { date, activities } => {
                self.clear_after_for(*date, activities.as_slice())
            }
            PolicyChange::ScaleFraction {
                from,
                to,
                factor,
                activities,
            } => self.adjust_remaining_fraction(
                *from,
                *to,
                |_, rf| rf * factor,
                activities.as_slice(),
            ),
        }
    }

    pub fn build(self) -> Result<RestrictionPolicy, EpisimError> {
        let mut timelines = BTreeMap::new();
        for (activity, entries) in self.entries {
            let mut current = Restriction::open();
            let mut resolved = BTreeMap::new();
            for (date, update) in entries {
                update.validate().map_err(|e| match e {
                    EpisimError::ConfigError(message) => EpisimError::config(format!(
                        "restriction for `{activity}` on {date}: {message}"
                    )),
                    other => other,
                })?;
                current.apply(&update);
                resolved.insert(date, current.clone());
            }
            debug!("policy for `{activity}` has {} entries", resolved.len());
            timelines.insert(activity, resolved);
        }
        Ok(RestrictionPolicy { timelines })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestrictionPolicy {
    timelines: BTreeMap<String, BTreeMap<NaiveDate, Restriction>>,
}

impl RestrictionPolicy {
    /// The restriction in force for every activity type with a timeline.
    #[must_use]
    pub fn resolve(&self, date: NaiveDate) -> BTreeMap<String, Restriction> {
        self.timelines
            .keys()
            .map(|activity| (activity.clone(), self.resolve_activity(date, activity)))
            .collect()
    }

    /// The latest entry at or before `date`, or fully open before the first entry.
    #[must_use]
    pub fn resolve_activity(&self, date: NaiveDate, activity: &str) -> Restriction {
        self.timelines
            .get(activity)
            .and_then(|timeline| timeline.range(..=date).next_back())
            .map_or_else(Restriction::open, |(_, restriction)| restriction.clone())
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.timelines.keys().map(String::as_str)
    }
}
