use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::shift_plan::ShiftPlanConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite sample store used by the estimation commands
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Shift plan defaults and limits
    #[serde(default)]
    pub plan: PlanSettings,

    /// Peak and diet estimation thresholds
    #[serde(default)]
    pub estimation: EstimationConfig,

    /// Logging setup
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

/// Shift plan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    /// Sleep need when a request omits it (minutes)
    pub default_sleep_need_minutes: u32,

    /// Plan length when a request omits it (days)
    pub default_days: u32,

    /// Largest wake-time move per day (minutes)
    pub max_daily_step_minutes: u32,

    /// Longest plan accepted (days)
    pub max_plan_days: u32,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            default_sleep_need_minutes: 540,
            default_days: 7,
            max_daily_step_minutes: 30,
            max_plan_days: 366,
        }
    }
}

impl PlanSettings {
    pub fn generator_config(&self) -> ShiftPlanConfig {
        ShiftPlanConfig {
            max_daily_step_minutes: self.max_daily_step_minutes,
            max_plan_days: self.max_plan_days,
        }
    }
}

/// Estimation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Samples a time-of-day window needs before it can win
    pub peak_min_samples: usize,

    /// Feature records needed before peak estimation skips raw sessions
    pub peak_min_features: usize,

    /// Feature records needed before diet correlation skips raw sessions
    pub diet_min_features: usize,

    /// Samples a meal-recency band needs to be reported (0 reports all)
    pub diet_min_band_samples: usize,

    /// Samples a weekday needs to be reported
    pub weekday_min_samples: usize,

    /// Width of the sliding peak window (hours)
    pub window_hours: u8,

    /// Hard cap on records fetched per tier
    pub max_fetch_limit: usize,

    /// Records fetched per tier when a request does not say
    pub default_limit: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            peak_min_samples: 5,
            peak_min_features: 5,
            diet_min_features: 30,
            diet_min_band_samples: 0,
            weekday_min_samples: 3,
            window_hours: 2,
            max_fetch_limit: 500,
            default_limit: 200,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            database_path: None,
            metadata: ConfigMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: now,
                updated_at: now,
            },
            plan: PlanSettings::default(),
            estimation: EstimationConfig::default(),
            logging: LogConfig::default(),
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
            .join(".chronoshift")
            .join("config.toml")
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            if path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let config = Self::load_from_file(&config_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the planner or estimator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.plan.max_daily_step_minutes == 0 {
            anyhow::bail!("plan.max_daily_step_minutes must be positive");
        }
        if !(1..=1440).contains(&self.plan.default_sleep_need_minutes) {
            anyhow::bail!("plan.default_sleep_need_minutes must be between 1 and 1440");
        }
        if self.estimation.window_hours == 0 || self.estimation.window_hours > 24 {
            anyhow::bail!("estimation.window_hours must be between 1 and 24");
        }
        if self.estimation.max_fetch_limit == 0 {
            anyhow::bail!("estimation.max_fetch_limit must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(config.plan, deserialized.plan);
        assert_eq!(config.estimation, deserialized.estimation);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [metadata]
            version = "0.1.0"
            created_at = "2024-01-01T00:00:00Z"
            updated_at = "2024-01-01T00:00:00Z"

            [plan]
            default_sleep_need_minutes = 480
            default_days = 10
            max_daily_step_minutes = 20
            max_plan_days = 60
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.plan.max_daily_step_minutes, 20);
        assert_eq!(config.estimation.peak_min_samples, 5);
        assert_eq!(config.estimation.diet_min_features, 30);
        assert_eq!(config.plan.generator_config().max_plan_days, 60);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original_config = AppConfig::default();
        original_config.estimation.window_hours = 3;
        original_config.database_path = Some(PathBuf::from("/tmp/samples.db"));

        original_config.save_to_file(&config_path).unwrap();
        let loaded_config = AppConfig::load_or_default(Some(&config_path)).unwrap();

        assert_eq!(loaded_config.estimation.window_hours, 3);
        assert_eq!(loaded_config.database_path, Some(PathBuf::from("/tmp/samples.db")));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let temp_dir = tempdir().unwrap();
        assert!(AppConfig::load_or_default(Some(&temp_dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_step() {
        let mut config = AppConfig::default();
        config.plan.max_daily_step_minutes = 0;
        assert!(config.validate().is_err());
    }
}
