//! Command line entry points and batch execution.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::{Args, Command, FromArgMatches as _};
use log::{error, info};

use crate::config::EpisimConfig;
use crate::context::Context;
use crate::error::EpisimError;
use crate::log::apply_log_spec;
use crate::model::EpisimModel;
use crate::report::{AsyncCsvWriter, NullSink, ReportSink};
use crate::scenario::Scenario;
use crate::snapshot::Snapshot;

/// Default cli arguments for the episim runner
#[derive(Args, Debug, Clone, Default)]
pub struct BaseArgs {
    /// Random seed; overrides the one in the config file
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Optional path for a JSON run configuration
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Population file with columns id,age,household,region
    #[arg(long, default_value = "")]
    pub persons: String,

    /// Facility file with columns id,spaces,capacity,region
    #[arg(long, default_value = "")]
    pub facilities: String,

    /// Event file with columns weekday,time,person,facility,activity,kind
    #[arg(long, default_value = "")]
    pub events: String,

    /// Optional path for report output
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Log level, or a comma separated list of module=level pairs
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Overrides the number of simulated days
    #[arg(long)]
    pub days: Option<u32>,

    /// Runs one independent simulation per seed
    #[arg(long, value_delimiter = ',')]
    pub seeds: Vec<u64>,

    /// Number of runs executed in parallel
    #[arg(short, long, default_value = "1")]
    pub threads: usize,

    /// Writes a snapshot to the output directory at the end of this day
    #[arg(long)]
    pub snapshot_day: Option<u32>,

    /// Resumes every run from this snapshot file
    #[arg(long, default_value = "")]
    pub resume: String,
}

#[derive(Args)]
pub struct PlaceholderCustom {}

fn create_episim_cli() -> Command {
    let cli = Command::new("episim");
    BaseArgs::augment_args(cli)
}

/// How one run of a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub seed: u64,
    pub days_completed: u32,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Per-batch settings shared by every run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub output_dir: Option<PathBuf>,
    pub threads: usize,
    pub snapshot_day: Option<u32>,
    pub resume: Option<PathBuf>,
    pub cancel: Arc<AtomicBool>,
}

/// Runs a simulation with custom cli arguments.
///
/// # Parameters
/// - `setup_fn`: A function that takes the loaded `EpisimConfig`, the `BaseArgs` and an
///   `Option<A>` where A is the custom cli arguments struct, and may adjust the configuration
///   before the model is built
///
/// # Errors
/// Returns an error if argument parsing, loading the inputs or the setup function fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_custom_args<A, F>(
    setup_fn: F,
) -> Result<Vec<RunOutcome>, Box<dyn std::error::Error>>
where
    A: Args,
    F: Fn(&mut EpisimConfig, &BaseArgs, Option<&A>) -> Result<(), EpisimError>,
{
    let mut cli = create_episim_cli();
    cli = A::augment_args(cli);
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    let custom_matches = A::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, Some(custom_matches), setup_fn)
}

/// Runs a simulation with default cli arguments
///
/// # Errors
/// Returns an error if argument parsing, loading the inputs or the setup function fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_args<F>(setup_fn: F) -> Result<Vec<RunOutcome>, Box<dyn std::error::Error>>
where
    F: Fn(&mut EpisimConfig, &BaseArgs, Option<&PlaceholderCustom>) -> Result<(), EpisimError>,
{
    let cli = create_episim_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, None, setup_fn)
}

fn required<'a>(value: &'a str, flag: &str) -> Result<&'a Path, EpisimError> {
    if value.is_empty() {
        return Err(EpisimError::config(format!("missing --{flag}")));
    }
    Ok(Path::new(value))
}

fn run_with_args_internal<A, F>(
    args: BaseArgs,
    custom_args: Option<A>,
    setup_fn: F,
) -> Result<Vec<RunOutcome>, Box<dyn std::error::Error>>
where
    F: Fn(&mut EpisimConfig, &BaseArgs, Option<&A>) -> Result<(), EpisimError>,
{
    if let Some(spec) = &args.log_level {
        apply_log_spec(spec)?;
    }

    // Optionally load the configuration from a file
    let mut config = if args.config.is_empty() {
        EpisimConfig::default()
    } else {
        info!("Loading configuration from: {}", args.config);
        EpisimConfig::from_json_file(Path::new(&args.config))?
    };
    if let Some(days) = args.days {
        config.days = days;
    }
    if let Some(seed) = args.random_seed {
        config.random_seed = seed;
    }
    setup_fn(&mut config, &args, custom_args.as_ref())?;

    let seeds = if args.seeds.is_empty() {
        vec![config.random_seed]
    } else {
        args.seeds.clone()
    };
    let model = Arc::new(EpisimModel::new(config)?);
    let scenario = Arc::new(Scenario::from_files(
        required(&args.persons, "persons")?,
        required(&args.facilities, "facilities")?,
        required(&args.events, "events")?,
        &model.activities,
    )?);

    let options = BatchOptions {
        output_dir: (!args.output_dir.is_empty()).then(|| PathBuf::from(&args.output_dir)),
        threads: args.threads,
        snapshot_day: args.snapshot_day,
        resume: (!args.resume.is_empty()).then(|| PathBuf::from(&args.resume)),
        cancel: Arc::new(AtomicBool::new(false)),
    };
    Ok(run_batch(&model, &scenario, &seeds, &options))
}

/// Runs one simulation per seed on up to `options.threads` worker threads. Runs share only the
/// model and the scenario; a failing run does not stop the others. Outcomes are in seed order.
pub fn run_batch(
    model: &Arc<EpisimModel>,
    scenario: &Arc<Scenario>,
    seeds: &[u64],
    options: &BatchOptions,
) -> Vec<RunOutcome> {
    let next = AtomicUsize::new(0);
    let outcomes: Mutex<Vec<(usize, RunOutcome)>> = Mutex::new(Vec::with_capacity(seeds.len()));
    let workers = options.threads.clamp(1, seeds.len().max(1));
    let started = Instant::now();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(&seed) = seeds.get(index) else {
                    break;
                };
                let outcome = match run_single(model, scenario, seed, options) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Run with seed {seed} failed: {e}");
                        RunOutcome {
                            seed,
                            days_completed: 0,
                            cancelled: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                match outcomes.lock() {
                    Ok(mut outcomes) => outcomes.push((index, outcome)),
                    Err(poisoned) => poisoned.into_inner().push((index, outcome)),
                }
            });
        }
    });

    let mut outcomes = outcomes
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    outcomes.sort_by_key(|(index, _)| *index);
    info!(
        "{} runs finished in {}",
        outcomes.len(),
        humantime::format_duration(std::time::Duration::from_millis(
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        ))
    );
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Runs the simulation for one seed with its own context, streams and report writer.
pub fn run_single(
    model: &Arc<EpisimModel>,
    scenario: &Arc<Scenario>,
    seed: u64,
    options: &BatchOptions,
) -> Result<RunOutcome, EpisimError> {
    let started = Instant::now();
    let prefix = format!("seed{seed}_");
    let sink: Box<dyn ReportSink> = match &options.output_dir {
        Some(dir) => Box::new(AsyncCsvWriter::new(dir, &prefix)?),
        None => Box::new(NullSink),
    };
    let mut context = match &options.resume {
        Some(path) => {
            let mut snapshot = Snapshot::read_json(path)?;
            snapshot.seed = seed;
            Context::restore(Arc::clone(model), Arc::clone(scenario), snapshot, sink)?
        }
        None => Context::new(Arc::clone(model), Arc::clone(scenario), seed, sink)?,
    };
    context.set_cancel_flag(Arc::clone(&options.cancel));

    let snapshot_day = options
        .snapshot_day
        .filter(|day| (context.day()..=model.config().days).contains(day));
    if let Some(day) = snapshot_day {
        if context.run_until(day) {
            if let Some(dir) = &options.output_dir {
                let path = dir.join(format!("{prefix}snapshot_day{day}.json"));
                context.snapshot().write_json(&path)?;
                info!("Wrote snapshot {}", path.display());
            }
        }
    }
    let completed = context.execute()?;
    info!(
        "Run with seed {seed} finished day {} in {}",
        context.day(),
        humantime::format_duration(std::time::Duration::from_secs(started.elapsed().as_secs()))
    );
    Ok(RunOutcome {
        seed,
        days_completed: context.day(),
        cancelled: !completed,
        error: None,
    })
}
