use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use episim::activity::ActivityParams;
use episim::container::{ContainerId, FacilityRecord};
use episim::people::PersonRecord;
use episim::seeding::SeedingSchedule;
use episim::trajectory::{EventKind, MobilityEvent, WeeklyTrajectories};
use episim::{Context, EpisimConfig, EpisimModel, NullSink, PersonId, Scenario};

static SEED: u64 = 123;
static DAYS: u32 = 7;
static HOUSEHOLD_SIZE: u32 = 4;
static WORKPLACE_SIZE: u32 = 50;
const HOUR: f64 = 3600.0;

fn config(population: u32) -> EpisimConfig {
    let start_date = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
    EpisimConfig {
        start_date,
        days: DAYS,
        calibration_parameter: 0.05,
        activities: BTreeMap::from([
            ("home".to_string(), ActivityParams::default()),
            (
                "work".to_string(),
                ActivityParams {
                    contact_intensity: 1.47,
                    ..ActivityParams::default()
                },
            ),
        ]),
        initial_infections: vec![SeedingSchedule {
            strain: "wildtype".to_string(),
            per_day: BTreeMap::from([(start_date, population / 100)]),
            ..SeedingSchedule::default()
        }],
        ..EpisimConfig::default()
    }
}

/// Households of four, workplaces of fifty, everyone at work from 9 to 17.
fn scenario(model: &EpisimModel, population: u32) -> Scenario {
    let home = model.activities.require("home").unwrap();
    let work = model.activities.require("work").unwrap();
    let households = population.div_ceil(HOUSEHOLD_SIZE);
    let workplaces = population.div_ceil(WORKPLACE_SIZE);

    let persons = (0..population)
        .map(|i| PersonRecord {
            id: format!("p{i}"),
            age: u8::try_from(i % 90).unwrap(),
            household: u64::from(i / HOUSEHOLD_SIZE),
            region: None,
        })
        .collect();
    let facilities = (0..households)
        .map(|h| format!("h{h}"))
        .chain((0..workplaces).map(|w| format!("w{w}")))
        .map(|id| FacilityRecord {
            id,
            ..FacilityRecord::default()
        })
        .collect();

    let mut events = Vec::new();
    for i in 0..population {
        let household = ContainerId(i / HOUSEHOLD_SIZE);
        let workplace = ContainerId(households + i % workplaces);
        let event = |time, container, activity, kind| MobilityEvent {
            time,
            person: PersonId(i),
            container,
            activity,
            kind,
        };
        events.push(event(9.0 * HOUR, household, home, EventKind::Leave));
        events.push(event(9.0 * HOUR, workplace, work, EventKind::Enter));
        events.push(event(17.0 * HOUR, workplace, work, EventKind::Leave));
        events.push(event(17.0 * HOUR, household, home, EventKind::Enter));
    }
    Scenario::with_trajectories(
        persons,
        facilities,
        Box::new(WeeklyTrajectories::uniform(&events)),
    )
}

fn run_week(model: &Arc<EpisimModel>, scenario: &Arc<Scenario>) -> Context {
    let mut context = Context::new(
        Arc::clone(model),
        Arc::clone(scenario),
        SEED,
        Box::new(NullSink),
    )
    .unwrap();
    context.execute().unwrap();
    context
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate week");
    for population in [1_000, 10_000] {
        let model = Arc::new(EpisimModel::new(config(population)).unwrap());
        let scenario = Arc::new(scenario(&model, population));
        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &population,
            |bencher, _| bencher.iter_with_large_drop(|| run_week(&model, &scenario)),
        );
    }
    group.finish();
}

criterion_group!(contact_model_benches, criterion_benchmark);
criterion_main!(contact_model_benches);
