use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required field: {field}")]
    MissingConfigError { field: String },

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Discovery failed for {url}: {message}")]
    DiscoveryFailure { url: String, message: String },

    #[error("Fetching slice {slice} failed: {message}")]
    SliceFetchFailure { slice: String, message: String },

    #[error("Extraction failed: {message}")]
    ExtractionFailure { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Referenced {entity} '{id}' does not exist")]
    ForeignKeyMiss { entity: String, id: String },

    #[error("Persistence transaction failed: {message}")]
    PersistenceTransactionFailure { message: String },

    #[error("Clearing statistics of tournament {tournament_id} failed: {message}")]
    ClearFailure {
        tournament_id: String,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Storage,
    Configuration,
    Data,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_)
            | EtlError::UnexpectedStatus { .. }
            | EtlError::DiscoveryFailure { .. }
            | EtlError::SliceFetchFailure { .. } => ErrorCategory::Network,
            EtlError::DatabaseError(_)
            | EtlError::IoError(_)
            | EtlError::ForeignKeyMiss { .. }
            | EtlError::PersistenceTransactionFailure { .. }
            | EtlError::ClearFailure { .. } => ErrorCategory::Storage,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::SerializationError(_)
            | EtlError::InvalidValueError { .. }
            | EtlError::ExtractionFailure { .. }
            | EtlError::ValidationError { .. } => ErrorCategory::Data,
            EtlError::Cancelled => ErrorCategory::Cancellation,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::ExtractionFailure { .. }
            | EtlError::ValidationError { .. }
            | EtlError::ForeignKeyMiss { .. } => ErrorSeverity::Low,
            EtlError::ApiError(_)
            | EtlError::UnexpectedStatus { .. }
            | EtlError::SliceFetchFailure { .. }
            | EtlError::SerializationError(_)
            | EtlError::PersistenceTransactionFailure { .. }
            | EtlError::Cancelled => ErrorSeverity::Medium,
            EtlError::DiscoveryFailure { .. }
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorSeverity::High,
            EtlError::DatabaseError(_) | EtlError::IoError(_) | EtlError::ClearFailure { .. } => {
                ErrorSeverity::Critical
            }
        }
    }

    /// 會中止整個 tournament 執行的錯誤
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EtlError::DiscoveryFailure { .. } | EtlError::ClearFailure { .. } | EtlError::Cancelled
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check that the federation site is reachable and the tournament path is correct"
            }
            ErrorCategory::Storage => {
                "Check the database URL and that the reference tables (players, teams, tournaments) are populated"
            }
            ErrorCategory::Configuration => "Fix the configuration value and run again",
            ErrorCategory::Data => "The upstream markup may have changed; inspect the raw response",
            ErrorCategory::Cancellation => "Run again; stored statistics were left untouched",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::DiscoveryFailure { url, .. } => {
                format!("Could not load the tournament page {}", url)
            }
            EtlError::ClearFailure { tournament_id, .. } => format!(
                "Old statistics of tournament {} could not be removed, nothing was written",
                tournament_id
            ),
            EtlError::Cancelled => "The run was cancelled before any data was replaced".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
