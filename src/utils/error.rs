use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API request to {url} failed with status {status}: {message}")]
    ApiError {
        url: String,
        status: u16,
        message: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] sqlx::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Credential error: {message}")]
    CredentialError { message: String },

    #[error("Secret '{name}' not found in {vault}")]
    SecretNotFound { name: String, vault: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Resource already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("No data returned: {message}")]
    EmptyData { message: String },

    #[error("Task '{task}' timed out after {seconds}s")]
    Timeout { task: String, seconds: u64 },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Authentication,
    Data,
    Storage,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn validation(message: impl Into<String>) -> Self {
        EtlError::ValidationError {
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        EtlError::CredentialError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::HttpError(_) | EtlError::Timeout { .. } => ErrorCategory::Network,
            EtlError::ApiError { status, .. } if *status == 401 || *status == 403 => {
                ErrorCategory::Authentication
            }
            EtlError::ApiError { .. } => ErrorCategory::Network,
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::CredentialError { .. } | EtlError::SecretNotFound { .. } => {
                ErrorCategory::Authentication
            }
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::ValidationError { .. }
            | EtlError::EmptyData { .. }
            | EtlError::ProcessingError { .. } => ErrorCategory::Data,
            EtlError::ZipError(_)
            | EtlError::SqliteError(_)
            | EtlError::NotFound { .. }
            | EtlError::AlreadyExists { .. } => ErrorCategory::Storage,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::EmptyData { .. } => ErrorSeverity::Low,
            EtlError::HttpError(_) | EtlError::Timeout { .. } => ErrorSeverity::Medium,
            EtlError::ApiError { .. } if self.is_retryable() => ErrorSeverity::Medium,
            EtlError::IoError(_) | EtlError::SqliteError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Transient failures worth another attempt: network errors, timeouts,
    /// throttling and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            EtlError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EtlError::Timeout { .. } => true,
            EtlError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self.category() {
            ErrorCategory::Network => {
                "Check network connectivity and the API endpoint, then retry".to_string()
            }
            ErrorCategory::Configuration => {
                "Review the configuration file and command line arguments".to_string()
            }
            ErrorCategory::Authentication => {
                "Verify the credentials or the Key Vault secret holding them".to_string()
            }
            ErrorCategory::Data => match self {
                EtlError::EmptyData { .. } => {
                    "Widen the date range or set if_empty to 'warn' or 'skip'".to_string()
                }
                _ => "Check the input parameters and the shape of the source data".to_string(),
            },
            ErrorCategory::Storage => match self {
                EtlError::AlreadyExists { .. } => {
                    "Enable overwrite or choose a different target path".to_string()
                }
                _ => "Check that the target path exists and is accessible".to_string(),
            },
            ErrorCategory::System => {
                "Check file permissions and available disk space".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::ApiError { status, url, .. } => {
                format!("The API at {} answered with HTTP {}", url, status)
            }
            EtlError::HttpError(_) => "Could not reach the remote service".to_string(),
            EtlError::CredentialError { message } => format!("Credentials problem: {}", message),
            EtlError::SecretNotFound { name, .. } => format!("Secret '{}' does not exist", name),
            EtlError::EmptyData { message } => format!("Nothing to process: {}", message),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let throttled = EtlError::ApiError {
            url: "http://x".to_string(),
            status: 429,
            message: String::new(),
        };
        let not_found = EtlError::ApiError {
            url: "http://x".to_string(),
            status: 404,
            message: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!not_found.is_retryable());
        assert_eq!(throttled.severity(), ErrorSeverity::Medium);
        assert_eq!(not_found.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_unauthorized_is_authentication_error() {
        let err = EtlError::ApiError {
            url: "http://x".to_string(),
            status: 401,
            message: "bad token".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Authentication);
    }

    #[test]
    fn test_empty_data_is_low_severity() {
        let err = EtlError::EmptyData {
            message: "jobs".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.recovery_suggestion().contains("if_empty"));
    }
}
