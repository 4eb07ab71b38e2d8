//! Activity types (home, work, leisure, ...) and their contact parameters.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EpisimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub u16);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityParams {
    /// Base multiplier on the transmission hazard.
    pub contact_intensity: f64,
    /// Default number of parallel sub-groups of a facility of this type.
    pub spaces: f64,
    /// Whether contacts made here are recorded for contact tracing.
    pub trackable: bool,
    /// Whether the seasonal outdoor fraction applies.
    pub seasonal: bool,
    /// Containers of vehicle activities are left empty by anyone in quarantine.
    pub vehicle: bool,
}

impl Default for ActivityParams {
    fn default() -> Self {
        ActivityParams {
            contact_intensity: 1.0,
            spaces: 1.0,
            trackable: true,
            seasonal: false,
            vehicle: false,
        }
    }
}

/// Configured activity types, indexed by `ActivityId` in name order.
#[derive(Debug, Clone)]
pub struct Activities {
    names: Vec<String>,
    params: Vec<ActivityParams>,
    home: ActivityId,
}

impl Activities {
    pub fn new(
        config: &BTreeMap<String, ActivityParams>,
        home_activity: &str,
    ) -> Result<Self, EpisimError> {
        if config.len() > usize::from(u16::MAX) {
            return Err(EpisimError::config("too many activity types"));
        }
        for (name, params) in config {
            if params.contact_intensity.is_nan() || params.contact_intensity < 0.0 {
                return Err(EpisimError::config(format!(
                    "activity `{name}`: contact_intensity must be >= 0"
                )));
            }
            if params.spaces.is_nan() || params.spaces < 1.0 {
                return Err(EpisimError::config(format!(
                    "activity `{name}`: spaces must be >= 1"
                )));
            }
        }
        let names: Vec<String> = config.keys().cloned().collect();
        let home = names
            .iter()
            .position(|name| name == home_activity)
            .ok_or_else(|| {
                EpisimError::config(format!("home activity `{home_activity}` is not configured"))
            })?;
        #[allow(clippy::cast_possible_truncation)]
        let home = ActivityId(home as u16);
        Ok(Activities {
            names,
            params: config.values().cloned().collect(),
            home,
        })
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn id(&self, name: &str) -> Option<ActivityId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ActivityId(i as u16))
    }

    pub fn require(&self, name: &str) -> Result<ActivityId, EpisimError> {
        self.id(name)
            .ok_or_else(|| EpisimError::config(format!("unknown activity type `{name}`")))
    }

    #[must_use]
    pub fn name(&self, id: ActivityId) -> &str {
        &self.names[usize::from(id.0)]
    }

    #[must_use]
    pub fn params(&self, id: ActivityId) -> &ActivityParams {
        &self.params[usize::from(id.0)]
    }

    #[must_use]
    pub fn home(&self) -> ActivityId {
        self.home
    }

    #[must_use]
    pub fn is_home(&self, id: ActivityId) -> bool {
        id == self.home
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn ids(&self) -> impl Iterator<Item = ActivityId> {
        (0..self.names.len()).map(|i| ActivityId(i as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BTreeMap<String, ActivityParams> {
        let mut config = BTreeMap::new();
        config.insert("home".to_string(), ActivityParams::default());
        config.insert(
            "work".to_string(),
            ActivityParams {
                contact_intensity: 1.47,
                ..ActivityParams::default()
            },
        );
        config
    }

    #[test]
    fn lookup_by_name() {
        let activities = Activities::new(&config(), "home").unwrap();
        let work = activities.require("work").unwrap();
        assert_eq!(activities.name(work), "work");
        assert!(activities.is_home(activities.home()));
        assert!(!activities.is_home(work));
        assert_eq!(activities.params(work).contact_intensity, 1.47);
        assert!(activities.require("gym").unwrap_err().is_config_error());
    }

    #[test]
    fn home_activity_must_exist() {
        assert!(Activities::new(&config(), "house").is_err());
    }

    #[test]
    fn spaces_below_one_are_rejected() {
        let mut config = config();
        config.get_mut("work").unwrap().spaces = 0.5;
        assert!(Activities::new(&config, "home").is_err());
    }
}
