use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeatError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Authentication failed with status {status}: {body}")]
    AuthError { status: u16, body: String },

    #[error("API returned status {status}: {body}")]
    ApiStatusError { status: u16, body: String },

    #[error("Content span error: {message}")]
    ContentSpanError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Api,
    Io,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BeatError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BeatError::ApiError(_) | BeatError::ApiStatusError { .. } => ErrorCategory::Api,
            BeatError::AuthError { .. } => ErrorCategory::Authentication,
            BeatError::IoError(_) => ErrorCategory::Io,
            BeatError::ConfigError { .. }
            | BeatError::MissingConfigError { .. }
            | BeatError::InvalidConfigValueError { .. }
            | BeatError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            BeatError::SerializationError(_)
            | BeatError::ContentSpanError { .. }
            | BeatError::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 設定錯誤無法自行恢復，必須由使用者修正
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Authentication => ErrorSeverity::High,
            // API 錯誤通常是暫時性的，下個輪詢週期重試
            ErrorCategory::Api => ErrorSeverity::Medium,
            ErrorCategory::Io => ErrorSeverity::Critical,
            ErrorCategory::Processing => ErrorSeverity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            BeatError::AuthError { .. } => {
                "Check tenant_domain, client_id and client_secret in the configuration".to_string()
            }
            BeatError::ApiStatusError { .. } => {
                "Newly enabled subscriptions can take up to 12 hours to provide data; \
                 confirm audit log search is enabled for the tenancy"
                    .to_string()
            }
            BeatError::ApiError(_) => {
                "Check network connectivity and the configured API endpoints".to_string()
            }
            BeatError::ContentSpanError { .. } => {
                "Check the registry file timestamp and content_max_age_hours".to_string()
            }
            BeatError::MissingConfigError { field } => {
                format!("Add the '{}' setting to the configuration file", field)
            }
            BeatError::InvalidConfigValueError { field, .. }
            | BeatError::ConfigValidationError { field, .. } => {
                format!("Fix the '{}' setting in the configuration file", field)
            }
            BeatError::ConfigError { .. } => {
                "Check the configuration file syntax".to_string()
            }
            BeatError::IoError(_) => {
                "Check file permissions and available disk space".to_string()
            }
            BeatError::SerializationError(_) | BeatError::ProcessingError { .. } => {
                "The API may have returned an unexpected payload; re-run with --verbose".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Authentication => format!("Authentication problem: {}", self),
            ErrorCategory::Api => format!("Office 365 API problem: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
            ErrorCategory::Processing => format!("Data problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BeatError>;
