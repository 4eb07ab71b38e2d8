//! Diagnostic logging for simulation runs. Not to be confused with _reporting_ (see
//! [`crate::report`]), which records the epidemic itself.
//!
//! Everything logs through the `log` facade. A process-wide [`LogConfiguration`] holds a global
//! level and per-module levels and installs them as a `log4rs` console logger:
//!
//!  - `enable_logging()` / `disable_logging()`: everything / nothing
//!  - `set_log_level(level)`: the level for modules without their own filter
//!  - `set_module_filter()`, `set_module_filters()`, `remove_module_filter()`: per-module levels
//!
//! The command line passes `--log-level` to [`apply_log_spec`]:
//!
//! ```rust
//! use episim::log::apply_log_spec;
//!
//! // `info` globally, pair-level detail for the contact model.
//! apply_log_spec("info,episim::contact_model=trace").unwrap();
//! ```
mod standard_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::{Mutex, MutexGuard};

use crate::error::EpisimError;
use log4rs::Handle;

// Silent unless asked
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;
// Per-pair probabilities are only useful when asked for explicitly
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] =
    [("episim::contact_model", LevelFilter::Debug)];

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// The installed logging levels. A single instance lives behind the free functions of this
/// module; every change reinstalls the `log4rs` configuration.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    /// Level for modules without their own filter. `LevelFilter::Off` disables logging.
    pub(in crate::log) global_log_level: LevelFilter,
    /// Module path to level, in path order.
    pub(in crate::log) module_filters: BTreeMap<String, LevelFilter>,
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        LogConfiguration {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_filters: DEFAULT_MODULE_FILTERS
                .iter()
                .map(|(module, level)| ((*module).to_string(), *level))
                .collect(),
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    /// Applies `update` and reinstalls the logger if anything changed.
    fn update(&mut self, update: impl FnOnce(&mut Self) -> bool) {
        if update(self) {
            self.set_config();
        }
    }

    fn insert(&mut self, module: String, level: LevelFilter) -> bool {
        self.module_filters.insert(module, level) != Some(level)
    }
}

/// Turns on every log message. Same as `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Turns off every log message. Same as `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the level for modules without their own filter.
pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().update(|config| {
        config.global_log_level = level;
        true
    });
}

/// Sets the level of `module_path` and everything below it.
pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    get_log_configuration().update(|config| config.insert(module_path.to_string(), level_filter));
}

/// Drops the filter of `module_path`; the global level applies to it again.
pub fn remove_module_filter(module_path: &str) {
    get_log_configuration().update(|config| config.module_filters.remove(module_path).is_some());
}

/// Sets several module filters with a single logger reinstall.
pub fn set_module_filters<S: ToString>(module_filters: &[(&S, LevelFilter)]) {
    get_log_configuration().update(|config| {
        module_filters.iter().fold(false, |changed, (module, level)| {
            config.insert(module.to_string(), *level) || changed
        })
    });
}

/// Parses a specification such as `"info"` or `"warn,episim::tracing=debug"`. A bare level sets
/// the global level, `module=level` pairs set module filters.
pub fn parse_log_spec(
    spec: &str,
) -> Result<(LevelFilter, Vec<(String, LevelFilter)>), EpisimError> {
    let parse = |level: &str| {
        LevelFilter::from_str(level.trim())
            .map_err(|_| EpisimError::from(format!("invalid log level `{level}`")))
    };
    let mut global = LevelFilter::Info;
    let mut modules = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('=') {
            Some((module, level)) => modules.push((module.trim().to_string(), parse(level)?)),
            None => global = parse(part)?,
        }
    }
    Ok((global, modules))
}

/// Installs the configuration described by `spec` (see [`parse_log_spec`]).
pub fn apply_log_spec(spec: &str) -> Result<(), EpisimError> {
    let (global, modules) = parse_log_spec(spec)?;
    get_log_configuration().update(|config| {
        for (module, level) in modules {
            config.insert(module, level);
        }
        config.global_log_level = global;
        true
    });
    Ok(())
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    // A panic while holding the lock leaves the levels themselves intact
    LOG_CONFIGURATION
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
