//! The models resolved from an [`EpisimConfig`].
//!
//! Building an `EpisimModel` performs every configuration check, so a run that starts never
//! fails on its configuration. The model is immutable and shared between the runs of a batch.
use log::info;

use crate::activity::Activities;
use crate::config::EpisimConfig;
use crate::contact_model::ContactModel;
use crate::error::EpisimError;
use crate::immunity::AntibodyModel;
use crate::policy::{PolicyBuilder, RestrictionPolicy};
use crate::progression::ProgressionModel;
use crate::seeding::Seeding;
use crate::strain::{Strains, Vaccines};
use crate::vaccination::Vaccination;

pub struct EpisimModel {
    config: EpisimConfig,
    pub activities: Activities,
    pub strains: Strains,
    pub vaccines: Vaccines,
    pub antibodies: AntibodyModel,
    pub progression: ProgressionModel,
    pub contact_model: ContactModel,
    pub seeding: Seeding,
    pub vaccination: Vaccination,
    pub policy: RestrictionPolicy,
}

impl EpisimModel {
    pub fn new(config: EpisimConfig) -> Result<Self, EpisimError> {
        config.validate()?;
        let activities = Activities::new(&config.activities, &config.home_activity)?;
        let strains = Strains::new(&config.strains)?;
        let vaccines = Vaccines::new(&config.vaccines)?;
        let antibodies = AntibodyModel::new(&config.antibodies, &strains, &vaccines)?;
        let progression = ProgressionModel::new(&config.progression)?;
        let contact_model = ContactModel::new(
            config.effective_calibration(),
            config.max_contacts,
            config.tracing.min_contact_duration,
            config.tracing.max_recorded_contacts,
            config.infection_model.clone(),
        );
        let seeding = Seeding::new(&config.initial_infections, &strains)?;
        let vaccination = Vaccination::new(&config.vaccinations, &vaccines, config.sample_size)?;
        let policy = PolicyBuilder::from_config(&config.policy)
            .apply_changes(&config.policy_changes)
            .build()?;
        info!(
            "Model with {} activities, {} strains, {} vaccines over {} days from {}",
            activities.len(),
            strains.len(),
            config.vaccines.len(),
            config.days,
            config.start_date
        );
        Ok(EpisimModel {
            config,
            activities,
            strains,
            vaccines,
            antibodies,
            progression,
            contact_model,
            seeding,
            vaccination,
            policy,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EpisimConfig {
        &self.config
    }
}
