//! Shared fixtures for unit tests.
use std::collections::BTreeMap;

use crate::activity::{Activities, ActivityId, ActivityParams};
use crate::calendar::SECONDS_PER_DAY;
use crate::contact_model::ContactEnv;
use crate::immunity::{AntibodyConfig, AntibodyModel, ImmunizationParams};
use crate::mask::MaskModel;
use crate::people::{DiseaseStatus, Person, PersonId, PersonRecord, PersonRegistry};
use crate::restriction::{Restriction, RestrictionUpdate};
use crate::strain::{StrainId, StrainParams, Strains, Vaccines};

pub(crate) fn activity_config() -> BTreeMap<String, ActivityParams> {
    BTreeMap::from([
        ("home".to_string(), ActivityParams::default()),
        ("work".to_string(), ActivityParams::default()),
        (
            "shop".to_string(),
            ActivityParams {
                trackable: false,
                ..ActivityParams::default()
            },
        ),
    ])
}

pub(crate) fn strain_config() -> BTreeMap<String, StrainParams> {
    BTreeMap::from([("wild".to_string(), StrainParams::default())])
}

pub(crate) fn antibody_config() -> AntibodyConfig {
    AntibodyConfig {
        events: BTreeMap::from([(
            "wild".to_string(),
            ImmunizationParams {
                initial: BTreeMap::from([("wild".to_string(), 1.0)]),
                refresh: BTreeMap::from([("wild".to_string(), 10.0)]),
                ..ImmunizationParams::default()
            },
        )]),
        ..AntibodyConfig::default()
    }
}

/// Persons with ids `0..n`, four to a household, all aged 40.
pub(crate) fn persons(n: u32) -> PersonRegistry {
    let persons = (0..n)
        .map(|i| {
            let record = PersonRecord {
                id: format!("p{i}"),
                age: 40,
                household: u64::from(i / 4),
                region: None,
            };
            Person::new(PersonId(i), &record, 1)
        })
        .collect();
    PersonRegistry::new(persons)
}

/// Everything a contact evaluation reads, except the persons.
pub(crate) struct World {
    pub day: u32,
    pub activities: Activities,
    pub strains: Strains,
    pub antibodies: AntibodyModel,
    pub masks: MaskModel,
    pub restrictions: Vec<Restriction>,
    pub seasonality: Vec<f64>,
    pub tracing_active: bool,
    pub home: ActivityId,
    pub work: ActivityId,
    pub shop: ActivityId,
}

impl World {
    pub fn env(&self) -> ContactEnv<'_> {
        ContactEnv {
            day: self.day,
            activities: &self.activities,
            restrictions: &self.restrictions,
            seasonality: &self.seasonality,
            strains: &self.strains,
            antibodies: &self.antibodies,
            masks: &self.masks,
            tracing_active: self.tracing_active,
        }
    }

    pub fn restrict(&mut self, activity: ActivityId, update: &RestrictionUpdate) {
        self.restrictions[usize::from(activity.0)].apply(update);
    }
}

pub(crate) struct Fixture {
    pub world: World,
    pub persons: PersonRegistry,
}

impl Fixture {
    pub fn new(n: u32) -> Self {
        let activities = Activities::new(&activity_config(), "home").unwrap();
        let strains = Strains::new(&strain_config()).unwrap();
        let antibodies =
            AntibodyModel::new(&antibody_config(), &strains, &Vaccines::default()).unwrap();
        let world = World {
            day: 10,
            restrictions: vec![Restriction::open(); activities.len()],
            seasonality: vec![1.0; activities.len()],
            home: activities.require("home").unwrap(),
            work: activities.require("work").unwrap(),
            shop: activities.require("shop").unwrap(),
            activities,
            strains,
            antibodies,
            masks: MaskModel::new(0),
            tracing_active: false,
        };
        Fixture {
            world,
            persons: persons(n),
        }
    }

    /// Infects `id` two days ago and makes it contagious at the start of today.
    pub fn make_contagious(&mut self, id: PersonId) {
        let day = self.world.day;
        let person = self.persons.get_mut(id).unwrap();
        person.set_status(
            DiseaseStatus::InfectedButNotContagious,
            f64::from(day - 2) * SECONDS_PER_DAY,
        );
        person.add_infection(StrainId(0), day - 2);
        person.set_status(DiseaseStatus::Contagious, f64::from(day) * SECONDS_PER_DAY);
    }
}

/// Paths of a small scenario written by `write_scenario_files`.
pub(crate) struct ScenarioFiles {
    pub persons: String,
    pub facilities: String,
    pub events: String,
}

/// Writes three persons in two homes, using only the `home` activity of the default config.
pub(crate) fn write_scenario_files(dir: &std::path::Path) -> ScenarioFiles {
    let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
    let files = ScenarioFiles {
        persons: path("persons.csv"),
        facilities: path("facilities.csv"),
        events: path("events.csv"),
    };
    std::fs::write(
        &files.persons,
        "id,age,household,region\na,30,0,\nb,32,0,\nc,70,1,\n",
    )
    .unwrap();
    std::fs::write(&files.facilities, "id,spaces,capacity,region\nh0,,,\nh1,,,\n").unwrap();
    std::fs::write(
        &files.events,
        "weekday,time,person,facility,activity,kind\n\
         Mon,0,a,h0,home,enter\n\
         Mon,0,b,h0,home,enter\n\
         Mon,0,c,h1,home,enter\n\
         Mon,86400,a,h0,home,leave\n\
         Mon,86400,b,h0,home,leave\n\
         Mon,86400,c,h1,home,leave\n",
    )
    .unwrap();
    files
}
