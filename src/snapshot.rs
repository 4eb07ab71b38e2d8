//! Day-boundary state of a run.
//!
//! A snapshot holds everything a run carries from one day to the next: the persons with their
//! full histories and the pending tracing tasks. Random streams are derived from the seed and
//! the day, so resuming from a snapshot reproduces the uninterrupted run exactly.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::people::Person;
use crate::tracing::TracingTask;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The last completed day.
    pub day: u32,
    pub seed: u64,
    pub persons: Vec<Person>,
    pub tracing_tasks: Vec<(u32, TracingTask)>,
}

impl Snapshot {
    pub fn write_json(&self, path: &Path) -> Result<(), EpisimError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, EpisimError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SECONDS_PER_DAY;
    use crate::people::{DiseaseStatus, PersonId, QuarantineStatus};
    use crate::strain::{StrainId, VaccineId};
    use crate::testing::persons;
    use tempfile::tempdir;

    #[test]
    fn person_state_survives_the_file() {
        let mut persons = persons(3).into_persons();
        let person = &mut persons[1];
        person.set_status(DiseaseStatus::InfectedButNotContagious, 3.0 * SECONDS_PER_DAY + 0.1);
        person.add_infection(StrainId(0), 3);
        person.add_vaccination(VaccineId(0), 1);
        person.antibodies_mut()[0] = 1.0 / 3.0;
        person.set_immune_response(0.734_512_345_678_9);
        person.set_quarantine(QuarantineStatus::AtHome, 4);
        person.add_traceable_contact(PersonId(2), 3.5 * SECONDS_PER_DAY, 10);

        let snapshot = Snapshot {
            day: 4,
            seed: 7,
            persons,
            tracing_tasks: vec![(
                6,
                TracingTask {
                    index: PersonId(1),
                    trigger_time: 4.0 * SECONDS_PER_DAY,
                },
            )],
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        snapshot.write_json(&path).unwrap();
        let restored = Snapshot::read_json(&path).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(
            restored.persons[1].antibodies()[0].to_bits(),
            (1.0_f64 / 3.0).to_bits()
        );
    }
}
