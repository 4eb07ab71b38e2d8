//! Run configuration, loaded from JSON.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityParams;
use crate::error::EpisimError;
use crate::immunity::AntibodyConfig;
use crate::infection_model::InfectionModel;
use crate::participation::ParticipationModel;
use crate::policy::{PolicyChange, PolicyConfig};
use crate::progression::ProgressionConfig;
use crate::seasonality::Seasonality;
use crate::seeding::SeedingSchedule;
use crate::strain::StrainParams;
use crate::tracing::TracingConfig;
use crate::vaccination::VaccinationSchedule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisimConfig {
    /// Date of day 1.
    pub start_date: NaiveDate,
    /// Days to simulate.
    pub days: u32,
    pub random_seed: u64,
    /// The hazard calibration constant θ.
    pub calibration_parameter: f64,
    /// Share of the real population that is simulated.
    pub sample_size: f64,
    pub home_activity: String,
    pub activities: BTreeMap<String, ActivityParams>,
    /// Upper bound on the contacts evaluated per leaving person.
    pub max_contacts: Option<usize>,
    pub strains: BTreeMap<String, StrainParams>,
    pub vaccines: Vec<String>,
    pub antibodies: AntibodyConfig,
    pub progression: ProgressionConfig,
    pub tracing: TracingConfig,
    pub initial_infections: Vec<SeedingSchedule>,
    pub vaccinations: Vec<VaccinationSchedule>,
    pub infection_model: InfectionModel,
    pub participation: ParticipationModel,
    pub seasonality: Seasonality,
    pub policy: PolicyConfig,
    /// Edits of `policy`, applied in order before it is resolved.
    pub policy_changes: Vec<PolicyChange>,
}

const DEFAULT_START_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2020, 2, 15) {
    Some(date) => date,
    None => panic!("invalid default start date"),
};

impl Default for EpisimConfig {
    fn default() -> Self {
        let mut antibodies = AntibodyConfig::default();
        antibodies.events.insert(
            "wildtype".to_string(),
            crate::immunity::ImmunizationParams {
                initial: BTreeMap::from([("wildtype".to_string(), 1.0)]),
                refresh: BTreeMap::from([("wildtype".to_string(), 10.0)]),
                ..Default::default()
            },
        );
        EpisimConfig {
            start_date: DEFAULT_START_DATE,
            days: 100,
            random_seed: 4711,
            calibration_parameter: 1.07e-5,
            sample_size: 1.0,
            home_activity: "home".to_string(),
            activities: BTreeMap::from([("home".to_string(), ActivityParams::default())]),
            max_contacts: None,
            strains: BTreeMap::from([("wildtype".to_string(), StrainParams::default())]),
            vaccines: Vec::new(),
            antibodies,
            progression: ProgressionConfig::default(),
            tracing: TracingConfig::default(),
            initial_infections: Vec::new(),
            vaccinations: Vec::new(),
            infection_model: InfectionModel::default(),
            participation: ParticipationModel::default(),
            seasonality: Seasonality::default(),
            policy: PolicyConfig::new(),
            policy_changes: Vec::new(),
        }
    }
}

impl EpisimConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, EpisimError> {
        let reader = BufReader::new(File::open(path)?);
        let config: EpisimConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, EpisimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks what can be checked without building the models.
    pub fn validate(&self) -> Result<(), EpisimError> {
        if self.days == 0 {
            return Err(EpisimError::config("days must be at least 1"));
        }
        if self.calibration_parameter.is_nan() || self.calibration_parameter < 0.0 {
            return Err(EpisimError::config("calibration parameter must be >= 0"));
        }
        if self.sample_size.is_nan() || self.sample_size <= 0.0 || self.sample_size > 1.0 {
            return Err(EpisimError::config("sample size must be within (0, 1]"));
        }
        if !self.activities.contains_key(&self.home_activity) {
            return Err(EpisimError::config(format!(
                "home activity `{}` is not configured",
                self.home_activity
            )));
        }
        if self.max_contacts == Some(0) {
            return Err(EpisimError::config("max contacts must be at least 1"));
        }
        for change in &self.policy_changes {
            change.validate()?;
        }
        let changed = self.policy_changes.iter().flat_map(PolicyChange::activities);
        for activity in self.policy.keys().chain(changed) {
            if !self.activities.contains_key(activity) {
                return Err(EpisimError::config(format!(
                    "policy restricts activity `{activity}` which is not configured"
                )));
            }
        }
        self.tracing.validate()?;
        self.infection_model.validate()?;
        self.seasonality.validate()?;
        Ok(())
    }

    /// θ with the population sample folded in.
    #[must_use]
    pub fn effective_calibration(&self) -> f64 {
        self.calibration_parameter / self.sample_size
    }
}
