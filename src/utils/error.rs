use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV report error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Worker thread failed in {scenario}: {message}")]
    WorkerPanicked { scenario: String, message: String },

    #[error("Lost updates in {scenario} ({implementation}): expected {expected}, observed {observed}")]
    LostUpdates {
        scenario: String,
        implementation: String,
        expected: u64,
        observed: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Workload,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BenchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BenchError::ConfigError { .. }
            | BenchError::ConfigValidationError { .. }
            | BenchError::InvalidConfigValueError { .. }
            | BenchError::MissingConfigError { .. } => ErrorCategory::Configuration,
            BenchError::WorkerPanicked { .. } | BenchError::LostUpdates { .. } => {
                ErrorCategory::Workload
            }
            BenchError::CsvError(_) | BenchError::SerializationError(_) => ErrorCategory::Output,
            BenchError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BenchError::CsvError(_) | BenchError::SerializationError(_) => ErrorSeverity::Medium,
            BenchError::ConfigError { .. }
            | BenchError::ConfigValidationError { .. }
            | BenchError::InvalidConfigValueError { .. }
            | BenchError::MissingConfigError { .. }
            | BenchError::WorkerPanicked { .. } => ErrorSeverity::High,
            // A lost update means the protected cell itself is broken.
            BenchError::LostUpdates { .. } | BenchError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the benchmark TOML file and command line overrides"
            }
            ErrorCategory::Workload => {
                "Re-run with --verbose and a single implementation to isolate the failing cell"
            }
            ErrorCategory::Output => "Check the requested report formats and output directory",
            ErrorCategory::System => "Check file permissions and free disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            BenchError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            BenchError::MissingConfigError { field } => {
                format!("Missing setting '{}'", field)
            }
            BenchError::LostUpdates {
                implementation,
                expected,
                observed,
                ..
            } => format!(
                "{} dropped updates: {} of {} writes were visible",
                implementation, observed, expected
            ),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
