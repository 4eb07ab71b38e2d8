use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::LogConfiguration;

const APPENDER: &str = "stderr";
// ISO 8601 timestamp, colored level, module path
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

impl LogConfiguration {
    fn build_config(&self) -> Result<Config, log4rs::config::runtime::ConfigErrors> {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build();
        // The map iterates in path order, so identical levels give identical configs
        let loggers = self
            .module_filters
            .iter()
            .map(|(module, level)| Logger::builder().build(module.clone(), *level));
        Config::builder()
            .appender(Appender::builder().build(APPENDER, Box::new(stderr)))
            .loggers(loggers)
            .build(Root::builder().appender(APPENDER).build(self.global_log_level))
    }

    /// Installs the levels as the process logger, or swaps them into the installed one.
    pub(in crate::log) fn set_config(&mut self) {
        let config = match self.build_config() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("invalid log configuration: {e}");
                return;
            }
        };
        if let Some(handle) = &self.root_handle {
            handle.set_config(config);
            return;
        }
        match log4rs::init_config(config) {
            Ok(handle) => self.root_handle = Some(handle),
            Err(e) => eprintln!("could not install logger: {e}"),
        }
    }
}
