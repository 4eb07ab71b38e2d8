//! Report rows and the sinks that receive them.
//!
//! The day loop hands every row to a [`ReportSink`] and never waits for I/O: the
//! [`AsyncCsvWriter`] moves rows over a channel to a writer thread that keeps one CSV file per
//! report kind. [`ReportSink::finish`] drains the channel and flushes the files.
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::NaiveDate;
use csv::Writer;
use log::{error, trace};
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::people::{DiseaseStatus, QuarantineStatus};

/// A row type with its own output file.
pub trait Report: Serialize {
    /// File name without extension.
    const NAME: &'static str;
}

/// Use this macro to give a row type its report file
#[macro_export]
macro_rules! define_report {
    ($name:ident, $file:expr) => {
        impl $crate::report::Report for $name {
            const NAME: &'static str = $file;
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionReport {
    pub day: u32,
    pub time: f64,
    pub person: String,
    /// Empty for initial infections.
    pub infector: Option<String>,
    pub container: Option<String>,
    pub activity: Option<String>,
    pub strain: String,
    pub probability: f64,
}
define_report!(InfectionReport, "infections");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeReport {
    pub day: u32,
    pub time: f64,
    pub person: String,
    pub from: DiseaseStatus,
    pub to: DiseaseStatus,
}
define_report!(StatusChangeReport, "status_changes");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineReport {
    pub day: u32,
    pub person: String,
    pub from: QuarantineStatus,
    pub to: QuarantineStatus,
}
define_report!(QuarantineReport, "quarantine_changes");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationReport {
    pub day: u32,
    pub person: String,
    pub vaccine: String,
}
define_report!(VaccinationReport, "vaccinations");

/// Head counts at the end of a day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub day: u32,
    pub date: NaiveDate,
    pub susceptible: usize,
    pub infected_but_not_contagious: usize,
    pub contagious: usize,
    pub showing_symptoms: usize,
    pub seriously_sick: usize,
    pub critical: usize,
    pub seriously_sick_after_critical: usize,
    pub recovered: usize,
    pub quarantined_at_home: usize,
    pub quarantined_full: usize,
    pub vaccinated: usize,
    pub new_infections: usize,
}
define_report!(DailySummary, "daily_summary");

impl DailySummary {
    pub fn count_status(&mut self, status: DiseaseStatus) {
        let counter = match status {
            DiseaseStatus::Susceptible => &mut self.susceptible,
            DiseaseStatus::InfectedButNotContagious => &mut self.infected_but_not_contagious,
            DiseaseStatus::Contagious => &mut self.contagious,
            DiseaseStatus::ShowingSymptoms => &mut self.showing_symptoms,
            DiseaseStatus::SeriouslySick => &mut self.seriously_sick,
            DiseaseStatus::Critical => &mut self.critical,
            DiseaseStatus::SeriouslySickAfterCritical => &mut self.seriously_sick_after_critical,
            DiseaseStatus::Recovered => &mut self.recovered,
        };
        *counter += 1;
    }

    pub fn count_quarantine(&mut self, quarantine: QuarantineStatus) {
        match quarantine {
            QuarantineStatus::No => {}
            QuarantineStatus::AtHome => self.quarantined_at_home += 1,
            QuarantineStatus::Full => self.quarantined_full += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Infection(InfectionReport),
    StatusChange(StatusChangeReport),
    QuarantineChange(QuarantineReport),
    Vaccination(VaccinationReport),
    DailySummary(DailySummary),
}

pub trait ReportSink: Send {
    /// Accepts a row without blocking on I/O.
    fn send(&mut self, event: ReportEvent);

    /// Writes out everything sent so far. Called once after the last day.
    fn finish(&mut self) -> Result<(), EpisimError> {
        Ok(())
    }
}

/// Discards every row.
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn send(&mut self, _event: ReportEvent) {}
}

/// Keeps rows in memory. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ReportEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        MemorySink::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn infections(&self) -> Vec<InfectionReport> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Infection(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<DailySummary> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::DailySummary(row) => Some(row),
                _ => None,
            })
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn send(&mut self, event: ReportEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist.
fn create_csv(path: &Path) -> Result<Writer<File>, EpisimError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(Writer::from_writer(File::create(path)?))
        }
        _ => Err(EpisimError::from(
            "Report output files must be CSVs at this time",
        )),
    }
}

struct CsvFiles {
    infections: Writer<File>,
    status_changes: Writer<File>,
    quarantine_changes: Writer<File>,
    vaccinations: Writer<File>,
    daily_summary: Writer<File>,
}

impl CsvFiles {
    fn create(dir: &Path, prefix: &str) -> Result<Self, EpisimError> {
        let path = |name: &str| dir.join(format!("{prefix}{name}.csv"));
        Ok(CsvFiles {
            infections: create_csv(&path(InfectionReport::NAME))?,
            status_changes: create_csv(&path(StatusChangeReport::NAME))?,
            quarantine_changes: create_csv(&path(QuarantineReport::NAME))?,
            vaccinations: create_csv(&path(VaccinationReport::NAME))?,
            daily_summary: create_csv(&path(DailySummary::NAME))?,
        })
    }

    fn write(&mut self, event: &ReportEvent) -> Result<(), EpisimError> {
        match event {
            ReportEvent::Infection(row) => self.infections.serialize(row)?,
            ReportEvent::StatusChange(row) => self.status_changes.serialize(row)?,
            ReportEvent::QuarantineChange(row) => self.quarantine_changes.serialize(row)?,
            ReportEvent::Vaccination(row) => self.vaccinations.serialize(row)?,
            ReportEvent::DailySummary(row) => self.daily_summary.serialize(row)?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EpisimError> {
        self.infections.flush()?;
        self.status_changes.flush()?;
        self.quarantine_changes.flush()?;
        self.vaccinations.flush()?;
        self.daily_summary.flush()?;
        Ok(())
    }
}

/// Writes rows to `<dir>/<prefix><report>.csv` on a background thread.
pub struct AsyncCsvWriter {
    dir: PathBuf,
    sender: Option<Sender<ReportEvent>>,
    handle: Option<JoinHandle<Result<usize, EpisimError>>>,
}

impl AsyncCsvWriter {
    /// Creates the output files up front so a bad path fails before day 1.
    pub fn new(dir: &Path, prefix: &str) -> Result<Self, EpisimError> {
        let mut files = CsvFiles::create(dir, prefix)?;
        let (sender, receiver) = channel::<ReportEvent>();
        let handle = std::thread::Builder::new()
            .name(format!("{prefix}report-writer"))
            .spawn(move || -> Result<usize, EpisimError> {
                let mut written = 0;
                for event in receiver {
                    files.write(&event)?;
                    written += 1;
                }
                files.flush()?;
                Ok(written)
            })?;
        Ok(AsyncCsvWriter {
            dir: dir.to_path_buf(),
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for AsyncCsvWriter {
    fn send(&mut self, event: ReportEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                error!("report writer for {} has stopped", self.dir.display());
                self.sender = None;
            }
        }
    }

    fn finish(&mut self) -> Result<(), EpisimError> {
        // Closing the channel ends the writer loop once it has drained
        self.sender = None;
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let written = handle
            .join()
            .map_err(|_| EpisimError::from("report writer thread panicked"))??;
        trace!("wrote {written} report rows to {}", self.dir.display());
        Ok(())
    }
}

impl Drop for AsyncCsvWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("failed to finish reports in {}: {e}", self.dir.display());
        }
    }
}
