//! Performance sample records as read from the external store
//!
//! Two shapes exist: feature records, which already carry a robust z-score
//! and context fields, and raw game sessions, which only carry a median
//! reaction time. Both are read-only inputs.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Precomputed per-session features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rt_z: Option<f64>,
    /// Local hour of day the session ran; only whole values in 0-23 are used
    #[serde(default, deserialize_with = "lenient_number")]
    pub time_of_day_hour: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub mins_since_last_meal: Option<f64>,
    #[serde(default)]
    pub last_meal_type: Option<String>,
}

impl FeatureRecord {
    pub fn new(created_at: DateTime<Utc>, rt_z: f64) -> Self {
        Self {
            created_at,
            rt_z: Some(rt_z),
            time_of_day_hour: None,
            mins_since_last_meal: None,
            last_meal_type: None,
        }
    }

    pub fn with_hour(mut self, hour: u8) -> Self {
        self.time_of_day_hour = Some(f64::from(hour));
        self
    }

    pub fn with_meal(mut self, mins_since_last_meal: f64, meal_type: Option<&str>) -> Self {
        self.mins_since_last_meal = Some(mins_since_last_meal);
        self.last_meal_type = meal_type.map(str::to_string);
        self
    }
}

/// Raw game session as written by the mini-game clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub game_start_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rt_median_ms: Option<f64>,
}

impl SessionRecord {
    pub fn new(timestamp: DateTime<Utc>, rt_median_ms: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            game_start_at: None,
            rt_median_ms: Some(rt_median_ms),
        }
    }

    /// When the session happened: `timestamp`, else `gameStartAt`
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.or(self.game_start_at)
    }
}

/// Optional numeric field; strings, booleans and the like read as absent
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

/// Whole hour of day in 0-23, if `hour` is one
pub fn hour_of_day(hour: f64) -> Option<u8> {
    (hour.fract() == 0.0 && (0.0..24.0).contains(&hour)).then(|| hour as u8)
}

/// Local hour of `at` for a user whose clock is `offset` from UTC
pub fn local_hour(at: DateTime<Utc>, offset: FixedOffset) -> u8 {
    at.with_timezone(&offset).hour() as u8
}
