//! Unified error hierarchy for zonetrack
//!
//! Zone derivation and classification failures are local to one user or one
//! activity; the variants here carry enough context for a recompute batch to
//! report them and move on.

use thiserror::Error;

/// Top-level error type for all zonetrack operations
#[derive(Debug, Error)]
pub enum ZoneTrackError {
    /// Invalid zone configuration, no bands could be derived
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Malformed heart-rate sample sequence
    #[error("Data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Input validation errors (provider payloads, CLI arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Zone configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Maximum heart rate not set
    #[error("Maximum heart rate is required")]
    MissingMaxHr,

    /// Maximum heart rate is zero
    #[error("Maximum heart rate must be positive")]
    NonPositiveMaxHr,

    /// Maximum heart rate outside the accepted range
    #[error("Maximum heart rate must be between {min} and {max} bpm, got {value}")]
    MaxHrOutOfRange { value: u16, min: u16, max: u16 },

    /// Karvonen method without resting heart rate
    #[error("Resting heart rate is required for the Karvonen method")]
    MissingRestingHr,

    /// Resting heart rate not strictly below maximum
    #[error("Resting heart rate ({resting}) must be below maximum heart rate ({max})")]
    RestingHrNotBelowMax { resting: u16, max: u16 },

    /// Zone thresholds not strictly increasing
    #[error("Zone thresholds must be strictly increasing: {thresholds:?}")]
    ThresholdsNotIncreasing { thresholds: [u8; 5] },

    /// Zone threshold outside 10..=100 percent
    #[error("Zone {zone} threshold must be between 10 and 100 percent, got {value}")]
    ThresholdOutOfRange { zone: u8, value: u8 },

    /// Fixed cutoffs not strictly increasing
    #[error("Fixed zone cutoffs must be strictly increasing: {cutoffs:?}")]
    CutoffsNotIncreasing { cutoffs: [u16; 5] },

    /// Derived band collapsed to an empty range
    #[error("Zone {zone} is empty ({min}-{max} bpm); thresholds are too close for this heart rate range")]
    DegenerateBand { zone: u8, min: u16, max: u16 },
}

/// Sample sequence integrity errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    /// Elapsed time went backwards between two samples
    #[error("Elapsed time decreases at sample {index}: {previous}s -> {current}s")]
    NonMonotonicTime {
        index: usize,
        previous: u32,
        current: u32,
    },
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Record not found: {table}.{id}")]
    NotFound { table: String, id: String },

    #[error("Duplicate entry: {table}.{key}")]
    Duplicate { table: String, key: String },
}

/// Result type alias for zonetrack operations
pub type Result<T> = std::result::Result<T, ZoneTrackError>;

impl ZoneTrackError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZoneTrackError::Database(DatabaseError::Sqlite(_)) | ZoneTrackError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ZoneTrackError::DataIntegrity(_) => ErrorSeverity::Warning,
            ZoneTrackError::Validation(_) => ErrorSeverity::Warning,
            ZoneTrackError::Database(DatabaseError::NotFound { .. }) => ErrorSeverity::Warning,
            ZoneTrackError::Database(DatabaseError::Duplicate { .. }) => ErrorSeverity::Info,
            ZoneTrackError::Io(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ZoneTrackError::Configuration(ConfigurationError::MaxHrOutOfRange { min, max, .. }) => {
                format!("Maximum heart rate must be between {} and {} bpm", min, max)
            }
            ZoneTrackError::Configuration(err) => {
                format!("Heart rate zone settings are invalid: {}", err)
            }
            ZoneTrackError::DataIntegrity(_) => {
                "Heart rate data for this activity is malformed and was skipped.".to_string()
            }
            ZoneTrackError::Database(DatabaseError::NotFound { id, .. }) => {
                format!("Could not find {}", id)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
