use std::time::Duration;
use thiserror::Error;

/// Fatal errors raised while assembling the agent at startup
///
/// Any of these aborts the daemon before the first acquisition cycle runs.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("Module '{0}' is not registered")]
    ModuleNotFound(String),

    #[error("Invalid refresh interval for module '{module}': {reason}")]
    InvalidInterval { module: String, reason: String },

    #[error("Module '{module}' failed to initialize: {source}")]
    InitFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("Failed to seed random generator: {0}")]
    Entropy(String),

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors returned by module hooks
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Control plane call failed: {0}")]
    Connection(String),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Hook panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

/// Recoverable errors scoped to a single acquisition cycle
///
/// A cycle error never touches the module's previous fragment and never
/// removes the module from the schedule.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("start hook failed: {0}")]
    StartFailed(ModuleError),

    #[error("acquisition failed: {0}")]
    AcquisitionFailed(ModuleError),

    #[error("acquisition timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors that can occur while delivering the output document
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to serialize document: {0}")]
    SerializeError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_failure_names_module_and_cause() {
        let err = ConfigurationError::InitFailed {
            module: "core.general".to_string(),
            source: ModuleError::Failed("no such device".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("core.general"));
        assert!(message.contains("no such device"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cycle_error_wraps_module_error() {
        let err = CycleError::AcquisitionFailed(ModuleError::Malformed(
            "expected an object".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "acquisition failed: Malformed data: expected an object"
        );
    }

    #[test]
    fn test_timeout_reports_duration() {
        let err = CycleError::TimedOut(Duration::from_secs(2));
        assert!(err.to_string().contains("2s"));
    }
}
