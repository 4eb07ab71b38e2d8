//! A day-by-day stochastic epidemic simulation driven by replayed mobility.
//!
//! Each simulated day replays a weekly pattern of persons entering and leaving facilities.
//! Persons that share a facility make contacts, and contagious persons may infect the
//! susceptible ones they meet. Around that core the engine runs disease progression,
//! contact tracing and quarantine, vaccination with waning antibodies, and a calendar of
//! interventions that close or restrict activities.
//!
//! The central object of a run is the [`Context`](context::Context). It owns the mutable
//! state of one run and shares an immutable [`EpisimModel`](model::EpisimModel) (the
//! resolved configuration) and [`Scenario`](scenario::Scenario) (population, facilities,
//! trajectories) with the other runs of a batch. All randomness comes from named streams
//! re-derived per day from the run seed, so a run can be resumed from a
//! [`Snapshot`](snapshot::Snapshot) and reproduce exactly the same days.
pub mod activity;
pub mod calendar;
pub mod config;
pub mod contact_model;
pub mod container;
pub mod context;
pub mod error;
pub mod hashing;
pub mod immunity;
pub mod infection_model;
pub mod log;
pub mod mask;
pub mod model;
pub mod participation;
pub mod people;
pub mod policy;
pub mod progression;
pub mod random;
pub mod report;
pub mod restriction;
pub mod runner;
pub mod scenario;
pub mod schedule;
pub mod seasonality;
pub mod seeding;
pub mod snapshot;
pub mod strain;
pub mod tracing;
pub mod trajectory;
pub mod vaccination;

#[cfg(test)]
mod testing;

pub use config::EpisimConfig;
pub use context::Context;
pub use error::EpisimError;
pub use model::EpisimModel;
pub use people::{DiseaseStatus, PersonId, QuarantineStatus};
pub use report::{AsyncCsvWriter, MemorySink, NullSink, ReportEvent, ReportSink};
pub use runner::{run_with_args, run_with_custom_args, BaseArgs, RunOutcome};
pub use scenario::Scenario;
pub use snapshot::Snapshot;

// Re-exports for use inside the `define_rng!` macro from other crates.
pub use paste;
pub use rand;
