//! One simulation run.
//!
//! A `Context` owns the mutable state of a run (persons, the day's containers, the tracing
//! queue and the report sink) and advances it one day at a time. Within a day the steps run in a
//! fixed order:
//!
//! 1. disease progression, which may trigger tracing and self-isolation
//! 2. quarantine release
//! 3. due tracing tasks
//! 4. seeding of initial infections and vaccinations
//! 5. antibody update
//! 6. trajectories and participation
//! 7. replay of the day's mobility events, evaluating contacts whenever someone leaves
//! 8. the daily summary
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info};
use rand::Rng;

use crate::activity::ActivityId;
use crate::calendar::{absolute_time, date_for_day, weekday_for_day, SECONDS_PER_DAY};
use crate::container::{ContainerId, ContainerRegistry};
use crate::contact_model::{ContactEnv, InfectionEvent};
use crate::define_rng;
use crate::error::EpisimError;
use crate::hashing::{HashSet, HashSetExt};
use crate::mask::MaskModel;
use crate::model::EpisimModel;
use crate::participation::ParticipationModel;
use crate::people::{Person, PersonId, PersonRegistry};
use crate::progression::StatusChange;
use crate::random::RandomStreams;
use crate::report::{
    DailySummary, InfectionReport, QuarantineReport, ReportEvent, ReportSink, StatusChangeReport,
    VaccinationReport,
};
use crate::restriction::Restriction;
use crate::scenario::Scenario;
use crate::snapshot::Snapshot;
use crate::tracing::{ContactTracer, QuarantineChange};
use crate::trajectory::{pair_events, EventKind};

define_rng!(
    PopulationRng,
    ProgressionRng,
    TracingRng,
    SeedingRng,
    VaccinationRng,
    ParticipationRng,
    ContactRng,
);

pub struct Context {
    model: Arc<EpisimModel>,
    scenario: Arc<Scenario>,
    streams: RandomStreams,
    masks: MaskModel,
    persons: PersonRegistry,
    containers: ContainerRegistry,
    tracer: ContactTracer,
    sink: Box<dyn ReportSink>,
    /// The last completed day; 0 before the first.
    day: u32,
    cancel: Option<Arc<AtomicBool>>,
}

impl Context {
    /// Sets up a run with the given seed. Draws each person's immune response and whether they
    /// carry a tracing device.
    pub fn new(
        model: Arc<EpisimModel>,
        scenario: Arc<Scenario>,
        seed: u64,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self, EpisimError> {
        let streams = RandomStreams::new(seed);
        let num_strains = model.strains.len();
        let equipment_rate = model.config().tracing.equipment_rate;
        let mut rng = streams.get_rng(PopulationRng, &[]);
        let mut persons = Vec::with_capacity(scenario.persons().len());
        for (i, record) in scenario.persons().iter().enumerate() {
            let id = PersonId(u32::try_from(i).map_err(|_| "too many persons")?);
            let mut person = Person::new(id, record, num_strains);
            model.antibodies.init_person(&mut person, &mut rng);
            person.set_traceable(equipment_rate >= 1.0 || rng.random::<f64>() < equipment_rate);
            persons.push(person);
        }
        Context::with_persons(model, scenario, seed, sink, persons, 0)
    }

    /// Resumes a run from `snapshot`.
    pub fn restore(
        model: Arc<EpisimModel>,
        scenario: Arc<Scenario>,
        snapshot: Snapshot,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self, EpisimError> {
        if snapshot.persons.len() != scenario.persons().len() {
            return Err(EpisimError::from(format!(
                "snapshot has {} persons, scenario has {}",
                snapshot.persons.len(),
                scenario.persons().len()
            )));
        }
        let mut context = Context::with_persons(
            model,
            scenario,
            snapshot.seed,
            sink,
            snapshot.persons,
            snapshot.day,
        )?;
        context.tracer.restore_pending(snapshot.tracing_tasks);
        info!("Restored run at day {}", snapshot.day);
        Ok(context)
    }

    fn with_persons(
        model: Arc<EpisimModel>,
        scenario: Arc<Scenario>,
        seed: u64,
        sink: Box<dyn ReportSink>,
        persons: Vec<Person>,
        day: u32,
    ) -> Result<Self, EpisimError> {
        let config = model.config();
        let tracer = ContactTracer::new(&config.tracing, config.start_date, config.sample_size)?;
        Ok(Context {
            streams: RandomStreams::new(seed),
            masks: MaskModel::new(seed),
            persons: PersonRegistry::new(persons),
            containers: ContainerRegistry::new(),
            tracer,
            sink,
            day,
            cancel: None,
            model,
            scenario,
        })
    }

    /// Cancels the run before the next day once `flag` is set.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        date_for_day(self.model.config().start_date, self.day)
    }

    #[must_use]
    pub fn persons(&self) -> &PersonRegistry {
        &self.persons
    }

    pub fn persons_mut(&mut self) -> &mut PersonRegistry {
        &mut self.persons
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            day: self.day,
            seed: self.streams.base_seed(),
            persons: self.persons.iter().cloned().collect(),
            tracing_tasks: self.tracer.pending(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Runs every remaining day up to `last_day`. Returns false if cancelled first.
    pub fn run_until(&mut self, last_day: u32) -> bool {
        while self.day < last_day {
            if self.is_cancelled() {
                info!("Run cancelled after day {}", self.day);
                return false;
            }
            self.run_day();
        }
        true
    }

    /// Runs the configured number of days and flushes the reports.
    pub fn execute(&mut self) -> Result<bool, EpisimError> {
        let completed = self.run_until(self.model.config().days);
        self.sink.finish()?;
        Ok(completed)
    }

    /// Simulates the day after the last completed one.
    pub fn run_day(&mut self) {
        let day = self.day + 1;
        let model = Arc::clone(&self.model);
        let config = model.config();
        let date = date_for_day(config.start_date, day);
        let mut summary = DailySummary {
            day,
            date,
            ..DailySummary::default()
        };

        let restrictions: Vec<Restriction> = model
            .activities
            .names()
            .map(|name| model.policy.resolve_activity(date, name))
            .collect();
        let seasonal_factor = config.seasonality.factor(date);
        let seasonality: Vec<f64> = model
            .activities
            .ids()
            .map(|id| {
                if model.activities.params(id).seasonal {
                    seasonal_factor
                } else {
                    1.0
                }
            })
            .collect();

        let mut rng = self.streams.day_rng(ProgressionRng, day);
        let status_changes: Vec<StatusChange> = self
            .persons
            .iter_mut()
            .flat_map(|person| model.progression.update_state(person, day, &mut rng))
            .collect();
        for change in &status_changes {
            self.report_status_change(day, change);
            let quarantines = self.tracer.on_status_change(&mut self.persons, change, day);
            self.report_quarantines(&quarantines);
        }

        let released = self.tracer.release_due(&mut self.persons, day);
        self.report_quarantines(&released);
        let mut rng = self.streams.day_rng(TracingRng, day);
        let traced = self.tracer.run_due(&mut self.persons, day, &mut rng);
        self.report_quarantines(&traced);
        self.tracer.clear_old_contacts(&mut self.persons, day);

        let mut rng = self.streams.day_rng(SeedingRng, day);
        for (person, strain) in model.seeding.seed(&mut self.persons, day, date, &mut rng) {
            summary.new_infections += 1;
            self.send(ReportEvent::Infection(InfectionReport {
                day,
                time: f64::from(day) * SECONDS_PER_DAY,
                person: self.external_id(person),
                infector: None,
                container: None,
                activity: None,
                strain: model.strains.name(strain).to_string(),
                probability: 1.0,
            }));
        }
        let mut rng = self.streams.day_rng(VaccinationRng, day);
        let vaccinated = model
            .vaccination
            .vaccinate(&mut self.persons, day, date, &mut rng);
        for (person, vaccine) in vaccinated {
            self.send(ReportEvent::Vaccination(VaccinationReport {
                day,
                person: self.external_id(person),
                vaccine: model.vaccines.name(vaccine).to_string(),
            }));
        }
        for person in self.persons.iter_mut() {
            model.antibodies.update_antibodies(person, day);
        }

        self.plan_participation(day, &restrictions);
        let infections = self.replay(day, &restrictions, &seasonality);
        summary.new_infections += infections.len();
        for infection in &infections {
            let report = self.infection_report(day, infection);
            self.send(ReportEvent::Infection(report));
        }

        for person in self.persons.iter() {
            summary.count_status(person.status());
            summary.count_quarantine(person.quarantine());
            if person.is_vaccinated() {
                summary.vaccinated += 1;
            }
        }
        info!(
            "Day {day} ({date}): {} new infections, {} contagious, {} symptomatic",
            summary.new_infections, summary.contagious, summary.showing_symptoms
        );
        self.send(ReportEvent::DailySummary(summary));
        self.day = day;
    }

    /// Pairs today's events into trajectories and draws which activity instances take place.
    fn plan_participation(&mut self, day: u32, restrictions: &[Restriction]) {
        let config = self.model.config();
        let weekday = weekday_for_day(config.start_date, day);
        let trajectories = pair_events(self.scenario.events(weekday), self.persons.len());
        let mut rng = self.streams.day_rng(ParticipationRng, day);
        let participation = config.participation;
        for (person, mut trajectory) in self.persons.iter_mut().zip(trajectories) {
            for entry in &mut trajectory {
                let open = Restriction::open();
                let restriction = restrictions
                    .get(usize::from(entry.activity.0))
                    .unwrap_or(&open);
                let facility_region = self
                    .scenario
                    .facility(entry.container)
                    .and_then(|facility| facility.region.as_deref());
                let fraction =
                    participation.remaining_fraction(restriction, facility_region, person.region());
                entry.participating = ParticipationModel::participates(fraction, &mut rng);
            }
            person.set_trajectory(trajectory);
        }
    }

    /// Replays the day's events. Everyone still inside a container at midnight leaves then.
    fn replay(
        &mut self,
        day: u32,
        restrictions: &[Restriction],
        seasonality: &[f64],
    ) -> Vec<InfectionEvent> {
        let Context {
            model,
            scenario,
            streams,
            masks,
            persons,
            containers,
            tracer,
            ..
        } = self;
        let model: &EpisimModel = model;
        let scenario: &Scenario = scenario;
        let env = ContactEnv {
            day,
            activities: &model.activities,
            restrictions,
            seasonality,
            strains: &model.strains,
            antibodies: &model.antibodies,
            masks,
            tracing_active: tracer.is_active(day),
        };
        let mut replay = Replay {
            model,
            streams,
            persons,
            containers,
            env,
            transmitted: HashSet::new(),
            infections: Vec::new(),
        };
        replay.containers.clear();

        let may_enter = |person: &Person, activity: ActivityId| {
            let vehicle = model.activities.params(activity).vehicle;
            person.may_enter(model.activities.is_home(activity), vehicle)
        };
        let sample_size = model.config().sample_size;
        let attributes = |container: ContainerId, activity: ActivityId| {
            let facility = scenario.facility(container);
            let spaces = facility
                .and_then(|facility| facility.spaces)
                .unwrap_or(model.activities.params(activity).spaces);
            // Typical capacity of the real facility, scaled to the simulated sample
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let capacity = facility
                .and_then(|facility| facility.capacity)
                .map(|capacity| (f64::from(capacity) * sample_size).max(1.0) as usize);
            (spaces, capacity)
        };

        // Visits without an enter event began before midnight
        let day_start = absolute_time(day, 0.0);
        for person in replay.persons.iter() {
            for entry in person.trajectory() {
                if entry.start > 0.0 || !entry.participating || !may_enter(person, entry.activity) {
                    continue;
                }
                let (spaces, capacity) = attributes(entry.container, entry.activity);
                replay
                    .containers
                    .get_or_create(entry.container, entry.activity, spaces, capacity)
                    .enter(person.id(), day_start);
            }
        }

        let weekday = weekday_for_day(model.config().start_date, day);
        for event in scenario.events(weekday) {
            let time = absolute_time(day, event.time);
            match event.kind {
                EventKind::Enter => {
                    let Some(person) = replay.persons.get(event.person) else {
                        continue;
                    };
                    if !person.participates(event.container, event.time)
                        || !may_enter(person, event.activity)
                    {
                        continue;
                    }
                    let (spaces, capacity) = attributes(event.container, event.activity);
                    replay
                        .containers
                        .get_or_create(event.container, event.activity, spaces, capacity)
                        .enter(event.person, time);
                }
                EventKind::Leave => replay.leave(event.container, event.person, time),
            }
        }

        let midnight = absolute_time(day, SECONDS_PER_DAY);
        for (container, person) in replay.containers.remaining_members() {
            replay.leave(container, person, midnight);
        }
        debug!(
            "Day {day}: {} containers, {} infections",
            replay.containers.len(),
            replay.infections.len()
        );
        replay.infections
    }

    fn external_id(&self, person: PersonId) -> String {
        self.scenario
            .persons()
            .get(person.0 as usize)
            .map_or_else(|| person.0.to_string(), |record| record.id.clone())
    }

    fn infection_report(&self, day: u32, infection: &InfectionEvent) -> InfectionReport {
        InfectionReport {
            day,
            time: infection.time,
            person: self.external_id(infection.target),
            infector: Some(self.external_id(infection.infector)),
            container: self
                .scenario
                .facility(infection.container)
                .map(|facility| facility.id.clone()),
            activity: Some(self.model.activities.name(infection.activity).to_string()),
            strain: self.model.strains.name(infection.strain).to_string(),
            probability: infection.probability,
        }
    }

    fn report_status_change(&mut self, day: u32, change: &StatusChange) {
        let report = StatusChangeReport {
            day,
            time: change.time,
            person: self.external_id(change.person),
            from: change.from,
            to: change.to,
        };
        self.send(ReportEvent::StatusChange(report));
    }

    fn report_quarantines(&mut self, changes: &[QuarantineChange]) {
        for change in changes {
            let report = QuarantineReport {
                day: change.day,
                person: self.external_id(change.person),
                from: change.from,
                to: change.to,
            };
            self.send(ReportEvent::QuarantineChange(report));
        }
    }

    fn send(&mut self, event: ReportEvent) {
        self.sink.send(event);
    }
}

/// The borrowed state of one day's event replay.
struct Replay<'a> {
    model: &'a EpisimModel,
    streams: &'a RandomStreams,
    persons: &'a mut PersonRegistry,
    containers: &'a mut ContainerRegistry,
    env: ContactEnv<'a>,
    /// Leaving persons already party to a transmission today
    transmitted: HashSet<PersonId>,
    infections: Vec<InfectionEvent>,
}

impl Replay<'_> {
    fn leave(&mut self, container_id: ContainerId, person: PersonId, time: f64) {
        let Some(container) = self.containers.get(container_id) else {
            return;
        };
        if !container.contains(person) {
            return;
        }
        let mut rng = self.streams.get_rng(
            ContactRng,
            &[
                u64::from(self.env.day),
                u64::from(container_id.0),
                u64::from(person.0),
                time.to_bits(),
            ],
        );
        let allow_transmission = !self.transmitted.contains(&person);
        let events = self.model.contact_model.infect(
            &self.env,
            self.persons,
            container,
            person,
            time,
            allow_transmission,
            &mut rng,
        );
        if !events.is_empty() {
            self.transmitted.insert(person);
        }
        self.infections.extend(events);
        if let Some(container) = self.containers.get_mut(container_id) {
            container.leave(person);
        }
    }
}
