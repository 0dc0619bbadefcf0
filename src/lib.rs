// Library interface for zonetrack
// The CLI binary and integration tests build on these modules

pub mod aggregation;
pub mod classifier;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod recompute;
pub mod store;
pub mod streams;
pub mod zones;

// Re-export commonly used types for convenience
pub use aggregation::{AggregationEngine, SummaryWindow};
pub use classifier::ActivityZoneClassifier;
pub use database::Database;
pub use error::{ConfigurationError, DataIntegrityError, DatabaseError, Result, ZoneTrackError};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use recompute::{recompute_user_zones, update_zone_configuration, RecomputeConfig, RecomputeSummary};
pub use store::{ActivityRepository, ConfigurationStore, InMemoryStore, SampleProvider, ZoneStore};
pub use zones::{BandStrategy, ZoneCalculator};
