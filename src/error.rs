use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpisimError` and maps other errors to
/// convert to an `EpisimError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpisimError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    ParseIntError(std::num::ParseIntError),
    ParseFloatError(std::num::ParseFloatError),
    DateError(chrono::ParseError),
    /// Invalid or inconsistent configuration, detected before day 1.
    ConfigError(String),
    EpisimError(String),
}

impl From<io::Error> for EpisimError {
    fn from(error: io::Error) -> Self {
        EpisimError::IoError(error)
    }
}

impl From<serde_json::Error> for EpisimError {
    fn from(error: serde_json::Error) -> Self {
        EpisimError::JsonError(error)
    }
}

impl From<csv::Error> for EpisimError {
    fn from(error: csv::Error) -> Self {
        EpisimError::CSVError(error)
    }
}

impl From<std::num::ParseIntError> for EpisimError {
    fn from(error: std::num::ParseIntError) -> Self {
        EpisimError::ParseIntError(error)
    }
}

impl From<std::num::ParseFloatError> for EpisimError {
    fn from(error: std::num::ParseFloatError) -> Self {
        EpisimError::ParseFloatError(error)
    }
}

impl From<chrono::ParseError> for EpisimError {
    fn from(error: chrono::ParseError) -> Self {
        EpisimError::DateError(error)
    }
}

impl From<String> for EpisimError {
    fn from(error: String) -> Self {
        EpisimError::EpisimError(error)
    }
}

impl From<&str> for EpisimError {
    fn from(error: &str) -> Self {
        EpisimError::EpisimError(error.to_string())
    }
}

impl EpisimError {
    pub fn config(message: impl Into<String>) -> Self {
        EpisimError::ConfigError(message.into())
    }

    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, EpisimError::ConfigError(_))
    }
}

impl std::error::Error for EpisimError {}

impl Display for EpisimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::EpisimError;

    #[test]
    fn config_errors_are_distinguished() {
        let error = EpisimError::config("unknown activity type `gym`");
        assert!(error.is_config_error());
        assert!(!EpisimError::from("boom").is_config_error());
    }

    #[test]
    fn display_includes_variant() {
        let error = EpisimError::config("missing strain");
        assert_eq!(
            error.to_string(),
            "Error: ConfigError(\"missing strain\")"
        );
    }

    #[test]
    fn converts_parse_errors() {
        let error: EpisimError = "x".parse::<u32>().unwrap_err().into();
        assert!(matches!(error, EpisimError::ParseIntError(_)));
    }
}
