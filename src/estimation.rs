//! Peak-performance and diet-correlation estimation
//!
//! Composes the store, normalizer, and aggregator. Each request fetches
//! feature records first and only falls back to raw sessions when too few
//! features are usable. Thin data produces an outcome with a `status`
//! message, never an error; only store failures and bad requests error.

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    aggregate, best_group, find_peak_window, meal_recency_summary, rank_groups, BestWindow, DayOfWeek,
    DayOfWeekGrouping, GroupSummary, LastMealType, MealRecencyBand,
};
use crate::config::EstimationConfig;
use crate::error::{InputError, Result};
use crate::normalizer::{Evidence, SampleNormalizer, SampleSource, SourceKind};
use crate::store::SampleStore;

/// Which user's history to mine, and how much of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequest {
    pub user_id: String,
    /// Records fetched per tier; clamped to the configured maximum
    #[serde(default, alias = "maxSessions", alias = "lookback")]
    pub limit: Option<usize>,
    /// User's clock offset east of UTC, for raw session timestamps
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl EstimationRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            limit: None,
            utc_offset_minutes: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of the peak-window search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakEstimate {
    /// Absent when no window has enough samples
    pub best_window: Option<BestWindow>,
    pub source: SourceKind,
    /// Samples that carried an hour of day
    pub sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl PeakEstimate {
    pub fn is_available(&self) -> bool {
        self.best_window.is_some()
    }
}

/// Result of the meal-recency correlation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DietCorrelation {
    /// Bands ranked best first
    pub summary: Vec<GroupSummary<MealRecencyBand>>,
    /// Ranked by last meal type, for samples that report one
    pub by_meal_type: Vec<GroupSummary<String>>,
    pub source: SourceKind,
    /// Samples that carried meal timing
    pub sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Per-weekday performance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayProfile {
    /// Monday first
    pub days: Vec<GroupSummary<DayOfWeek>>,
    pub best_day: Option<DayOfWeek>,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Estimation service over a sample store
pub struct PerformanceEstimator<S> {
    store: S,
    config: EstimationConfig,
}

impl<S: SampleStore> PerformanceEstimator<S> {
    /// Create estimator with default thresholds
    pub fn new(store: S) -> Self {
        Self::with_config(store, EstimationConfig::default())
    }

    /// Create estimator with custom thresholds
    pub fn with_config(store: S, config: EstimationConfig) -> Self {
        PerformanceEstimator { store, config }
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Best `window_hours`-wide time-of-day window for the user
    pub async fn estimate_peak(&self, request: &EstimationRequest) -> Result<PeakEstimate> {
        let normalizer = SampleNormalizer::with_utc_offset_minutes(request.utc_offset_minutes)?;
        let evidence = Evidence::timed(self.config.peak_min_features);
        let source = self.load(request, &normalizer, evidence).await?;
        let sample_count = evidence.count(source.samples());

        let best_window = find_peak_window(
            source.samples(),
            self.config.window_hours,
            self.config.peak_min_samples,
        );

        let status = match best_window {
            Some(ref window) => {
                tracing::info!(
                    user = %request.user_id,
                    start_hour = window.start_hour,
                    samples = window.sample_count,
                    source = ?source.kind(),
                    "Peak window estimated"
                );
                None
            }
            None => {
                tracing::info!(user = %request.user_id, samples = sample_count, "Peak window unavailable");
                Some(format!(
                    "Not enough data yet: need at least {} sessions within one {}-hour window ({} timed sessions so far).",
                    self.config.peak_min_samples, self.config.window_hours, sample_count
                ))
            }
        };

        Ok(PeakEstimate {
            best_window,
            source: source.kind(),
            sample_count,
            status,
        })
    }

    /// Median performance per meal-recency band, best first
    pub async fn diet_correlation(&self, request: &EstimationRequest) -> Result<DietCorrelation> {
        let normalizer = SampleNormalizer::with_utc_offset_minutes(request.utc_offset_minutes)?;
        let evidence = Evidence::meal_timed(self.config.diet_min_features);
        let source = self.load(request, &normalizer, evidence).await?;
        let sample_count = evidence.count(source.samples());

        let summary = meal_recency_summary(source.samples(), self.config.diet_min_band_samples);
        let by_meal_type = rank_groups(aggregate(
            source.samples(),
            &LastMealType,
            self.config.diet_min_band_samples,
        ));

        let status = if summary.is_empty() {
            Some("Not enough data yet: no sessions with meal timing were found.".to_string())
        } else {
            None
        };

        tracing::info!(
            user = %request.user_id,
            bands = summary.len(),
            samples = sample_count,
            source = ?source.kind(),
            "Diet correlation computed"
        );

        Ok(DietCorrelation {
            summary,
            by_meal_type,
            source: source.kind(),
            sample_count,
            status,
        })
    }

    /// Median performance per local weekday
    pub async fn weekday_profile(&self, request: &EstimationRequest) -> Result<WeekdayProfile> {
        let normalizer = SampleNormalizer::with_utc_offset_minutes(request.utc_offset_minutes)?;
        let source = self
            .load(request, &normalizer, Evidence::dated(self.config.peak_min_features))
            .await?;

        let days = aggregate(
            source.samples(),
            &DayOfWeekGrouping::new(normalizer.offset()),
            self.config.weekday_min_samples,
        );
        let best_day = best_group(&days).map(|g| g.key);

        let status = best_day.is_none().then(|| {
            format!(
                "Not enough data yet: need at least {} sessions on a single weekday.",
                self.config.weekday_min_samples
            )
        });

        Ok(WeekdayProfile {
            days,
            best_day,
            source: source.kind(),
            status,
        })
    }

    /// Fetch and normalize, falling back to raw sessions when too few
    /// feature records are usable under `evidence`
    async fn load(
        &self,
        request: &EstimationRequest,
        normalizer: &SampleNormalizer,
        evidence: Evidence,
    ) -> Result<SampleSource> {
        if request.user_id.trim().is_empty() {
            return Err(InputError::MissingField {
                field: "userId".to_string(),
            }
            .into());
        }

        let limit = self.effective_limit(request);

        let features = self.store.fetch_features(&request.user_id, limit).await?;
        let precomputed = normalizer.precomputed(&features);
        if evidence.is_met_by(&precomputed) {
            return Ok(SampleSource::Precomputed(precomputed));
        }

        tracing::warn!(
            user = %request.user_id,
            usable_features = evidence.count(&precomputed),
            required = evidence.min_samples,
            requirement = ?evidence.requirement,
            "Too few usable feature records, falling back to raw sessions"
        );

        let sessions = self.store.fetch_sessions(&request.user_id, limit).await?;
        Ok(normalizer.resolve(precomputed, &sessions, evidence))
    }

    fn effective_limit(&self, request: &EstimationRequest) -> usize {
        request
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_fetch_limit)
    }
}
