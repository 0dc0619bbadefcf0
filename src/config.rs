use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregation::{DEFAULT_ALLOWED_WINDOWS, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use crate::logging::LogConfig;
use crate::models::ZoneConfiguration;
use crate::recompute::RecomputeConfig;
use crate::zones::ZoneCalculator;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Zone configuration for users who have not saved their own
    #[serde(default)]
    pub zones: ZoneConfiguration,

    /// Summary window options
    #[serde(default)]
    pub dashboard: DashboardSettings,

    /// Recompute pass options
    #[serde(default)]
    pub recompute: RecomputeConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Data directory path
    pub data_dir: PathBuf,

    /// Explicit database file; `<data_dir>/zonetrack.db` when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// User acted on when the CLI gets no `--user`
    pub default_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSettings {
    /// Window used when none or an unsupported one is requested
    pub default_window_days: u32,

    /// Window lengths a summary may be requested for
    pub allowed_windows: Vec<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            zones: ZoneConfiguration::default(),
            dashboard: DashboardSettings::default(),
            recompute: RecomputeConfig { show_progress: true },
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".zonetrack"),
            database_path: None,
            default_user: "default".to_string(),
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        DashboardSettings {
            default_window_days: DEFAULT_WINDOW_DAYS,
            allowed_windows: DEFAULT_ALLOWED_WINDOWS.to_vec(),
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zonetrack")
            .join("config.toml")
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_file(&config_path)
    }

    /// Resolved database file location
    pub fn database_path(&self) -> PathBuf {
        self.settings
            .database_path
            .clone()
            .unwrap_or_else(|| self.settings.data_dir.join("zonetrack.db"))
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let dashboard = &self.dashboard;
        if dashboard.allowed_windows.is_empty() {
            bail!("dashboard.allowed_windows must list at least one window");
        }
        if dashboard.allowed_windows.contains(&0) {
            bail!("dashboard.allowed_windows must be positive day counts");
        }
        if let Some(days) = dashboard
            .allowed_windows
            .iter()
            .find(|days| **days > MAX_WINDOW_DAYS)
        {
            bail!(
                "dashboard.allowed_windows entry {} exceeds the {} day maximum",
                days,
                MAX_WINDOW_DAYS
            );
        }
        if !dashboard.allowed_windows.contains(&dashboard.default_window_days) {
            bail!(
                "dashboard.default_window_days ({}) is not one of the allowed windows {:?}",
                dashboard.default_window_days,
                dashboard.allowed_windows
            );
        }

        ZoneCalculator::derive_bands(&self.zones)
            .with_context(|| "Invalid default zone configuration")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use crate::models::ZoneMethod;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(config.zones, deserialized.zones);
        assert_eq!(config.dashboard, deserialized.dashboard);
        assert!(deserialized.recompute.show_progress);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = AppConfig::default();
        original.settings.default_user = "athlete-1".to_string();
        original.zones = ZoneConfiguration {
            method: ZoneMethod::FixedOffset {
                cutoffs: [110, 130, 150, 170, 190],
            },
            ..ZoneConfiguration::percentage(195)
        };
        original.logging.format = LogFormat::Json;

        original.save_to_file(&config_path).unwrap();
        let loaded = AppConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.settings.default_user, "athlete-1");
        assert_eq!(loaded.zones, original.zones);
        assert_eq!(loaded.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
            [metadata]
            version = "1.0"
            created_at = "2024-01-01T00:00:00Z"
            updated_at = "2024-01-01T00:00:00Z"

            [settings]
            data_dir = "/tmp/zonetrack"
            default_user = "me"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.zones, ZoneConfiguration::default());
        assert_eq!(config.dashboard.default_window_days, 30);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/zonetrack/zonetrack.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut config = AppConfig::default();
        config.dashboard.allowed_windows = vec![30, 200_000_000];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("200000000"));

        config.dashboard.allowed_windows = vec![30, MAX_WINDOW_DAYS];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("absent.toml");

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.settings.default_user, "default");
    }

    #[test]
    fn test_validation_rejects_bad_windows() {
        let mut config = AppConfig::default();
        config.dashboard.default_window_days = 14;
        assert!(config.validate().is_err());

        config.dashboard = DashboardSettings {
            default_window_days: 30,
            allowed_windows: vec![],
        };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.zones.thresholds = [60, 50, 80, 90, 100];
        assert!(config.validate().is_err());
    }
}
