use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Source unavailable ({source_kind}): {cause}")]
    SourceUnavailable { source_kind: String, cause: String },

    #[error("Column '{column}' not found. Available columns: {}", .available.join(", "))]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("Extraction failed: {message}")]
    ExtractionFailure { message: String },

    #[error("Sheet sync failed: {cause}")]
    SyncFailure { cause: String, restored: bool },

    #[error("Cannot {action} while the session is {stage}")]
    InvalidState { action: String, stage: String },

    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("{service} returned {status}: {body}")]
    RemoteError {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Data,
    Extraction,
    Sync,
    Session,
    Network,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LookupError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceUnavailable { .. } | Self::AuthError { .. } => ErrorCategory::Source,
            Self::ColumnNotFound { .. } | Self::CsvError(_) | Self::ValidationError { .. } => {
                ErrorCategory::Data
            }
            Self::ExtractionFailure { .. } => ErrorCategory::Extraction,
            Self::SyncFailure { .. } => ErrorCategory::Sync,
            Self::InvalidState { .. } => ErrorCategory::Session,
            Self::ApiError(_) | Self::RemoteError { .. } => ErrorCategory::Network,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    /// Extraction failures are recorded per record, sync failures leave local
    /// results intact; neither stops a run.
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Extraction | ErrorCategory::Sync => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Source
            | ErrorCategory::Data
            | ErrorCategory::Session
            | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// The underlying cause without the variant prefix, used for the
    /// `Error: <cause>` annotation on extraction records.
    pub fn cause_message(&self) -> String {
        match self {
            Self::ExtractionFailure { message } => message.clone(),
            Self::SourceUnavailable { cause, .. } | Self::SyncFailure { cause, .. } => {
                cause.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::SourceUnavailable { source_kind, cause } => match source_kind.as_str() {
                "sheet" => format!("Error accessing the Google Sheet: {}", cause),
                _ => format!("Error reading the CSV file: {}", cause),
            },
            Self::ColumnNotFound { column, .. } => {
                format!("The column '{}' does not exist in the loaded data", column)
            }
            Self::ExtractionFailure { message } => format!("Error: {}", message),
            Self::SyncFailure { cause, restored } => {
                if *restored {
                    format!(
                        "Error updating the Google Sheet: {} (previous content restored)",
                        cause
                    )
                } else {
                    format!("Error updating the Google Sheet: {}", cause)
                }
            }
            Self::InvalidState { action, stage } => {
                format!("Cannot {} yet, the session is {}", action, stage)
            }
            Self::AuthError { message } => format!("Could not authenticate: {}", message),
            Self::ApiError(e) => format!("A network request failed: {}", e),
            Self::MissingConfigError { field } => {
                format!("Missing required setting: {}", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { source_kind, .. } if source_kind == "sheet" => {
                "Check the sheet URL and that the service account has access to it"
            }
            Self::SourceUnavailable { .. } => "Check that the file exists and is UTF-8 CSV",
            Self::ColumnNotFound { .. } => "Pick one of the available columns",
            Self::ExtractionFailure { .. } => "Check the inference endpoint and token",
            Self::SyncFailure { .. } => {
                "Local results are unchanged; download the CSV export or retry the sync"
            }
            Self::InvalidState { .. } => "Run the earlier steps first",
            Self::AuthError { .. } => "Check the service account credentials file",
            Self::ApiError(_) | Self::RemoteError { .. } => {
                "Check network connectivity and API credentials, then retry"
            }
            Self::CsvError(_) | Self::ValidationError { .. } => "Check the input data",
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Fix the configuration and run again",
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                "Check disk space and permissions for the output path"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_fatal_errors_are_low_severity() {
        let extraction = LookupError::ExtractionFailure {
            message: "model timed out".to_string(),
        };
        let sync = LookupError::SyncFailure {
            cause: "503".to_string(),
            restored: false,
        };
        assert_eq!(extraction.severity(), ErrorSeverity::Low);
        assert_eq!(sync.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_column_not_found_lists_available_columns() {
        let err = LookupError::ColumnNotFound {
            column: "company".to_string(),
            available: vec!["name".to_string(), "city".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Column 'company' not found. Available columns: name, city"
        );
        assert_eq!(err.category(), ErrorCategory::Data);
    }

    #[test]
    fn test_cause_message_strips_prefix() {
        let err = LookupError::ExtractionFailure {
            message: "classifier offline".to_string(),
        };
        assert_eq!(err.cause_message(), "classifier offline");
        assert_eq!(err.user_friendly_message(), "Error: classifier offline");
    }
}
