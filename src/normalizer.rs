//! Robust sample normalization
//!
//! Turns feature records or raw sessions into [`NormalizedSample`]s whose
//! `score` is higher-is-better, using median/MAD rather than mean/variance so
//! a handful of distracted sessions cannot drag the baseline.
//!
//! Feature records are preferred. When too few are usable the raw sessions
//! are normalized against their own baseline instead; either way consumers
//! get the same [`NormalizedSample`] shape.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InputError, Result};
use crate::samples::{hour_of_day, local_hour, FeatureRecord, SessionRecord};
use crate::stats::RobustBaseline;

/// One scored observation with whatever context it carried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSample {
    pub at: Option<DateTime<Utc>>,
    /// Local hour of day (0-23)
    pub hour: Option<u8>,
    pub mins_since_last_meal: Option<f64>,
    pub last_meal_type: Option<String>,
    /// Negated robust z-score of latency; higher is better
    pub score: f64,
}

impl NormalizedSample {
    pub fn new(score: f64) -> Self {
        Self {
            at: None,
            hour: None,
            mins_since_last_meal: None,
            last_meal_type: None,
            score,
        }
    }

    pub fn with_hour(mut self, hour: u8) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn with_mins_since_last_meal(mut self, minutes: f64) -> Self {
        self.mins_since_last_meal = Some(minutes);
        self
    }
}

/// Which tier produced a sample set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Precomputed,
    Derived,
}

/// Normalized samples tagged with the tier they came from
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSource {
    /// Scores taken from feature records' `rtZ`
    Precomputed(Vec<NormalizedSample>),
    /// Scores recomputed from raw session latencies
    Derived {
        samples: Vec<NormalizedSample>,
        baseline: RobustBaseline,
    },
}

impl SampleSource {
    pub fn samples(&self) -> &[NormalizedSample] {
        match self {
            SampleSource::Precomputed(samples) => samples,
            SampleSource::Derived { samples, .. } => samples,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SampleSource::Precomputed(_) => SourceKind::Precomputed,
            SampleSource::Derived { .. } => SourceKind::Derived,
        }
    }

    pub fn baseline(&self) -> Option<RobustBaseline> {
        match self {
            SampleSource::Precomputed(_) => None,
            SampleSource::Derived { baseline, .. } => Some(*baseline),
        }
    }

    pub fn len(&self) -> usize {
        self.samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples().is_empty()
    }
}

/// Sample normalizer for one user's clock offset
#[derive(Debug, Clone)]
pub struct SampleNormalizer {
    offset: FixedOffset,
}

impl Default for SampleNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleNormalizer {
    /// Normalizer that reads session timestamps in UTC
    pub fn new() -> Self {
        SampleNormalizer {
            offset: Utc.fix(),
        }
    }

    /// Normalizer for a user `minutes` east of UTC
    pub fn with_utc_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                InputError::invalid_field(
                    "utcOffsetMinutes",
                    format!("{} is not a valid UTC offset", minutes),
                )
            })?;
        Ok(SampleNormalizer { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Score feature records by their stored `rtZ`.
    ///
    /// Records without a finite `rtZ` are dropped; invalid context fields are
    /// cleared rather than defaulted.
    pub fn precomputed(&self, records: &[FeatureRecord]) -> Vec<NormalizedSample> {
        records
            .iter()
            .filter_map(|record| {
                let rt_z = record.rt_z.filter(|z| z.is_finite())?;
                Some(NormalizedSample {
                    at: Some(record.created_at),
                    hour: record.time_of_day_hour.and_then(hour_of_day),
                    mins_since_last_meal: record
                        .mins_since_last_meal
                        .filter(|m| m.is_finite() && *m >= 0.0),
                    last_meal_type: record
                        .last_meal_type
                        .as_deref()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                    score: -rt_z,
                })
            })
            .collect()
    }

    /// Score raw sessions against the median/MAD of their own latencies
    pub fn derive(&self, sessions: &[SessionRecord]) -> SampleSource {
        let usable: Vec<(&SessionRecord, f64)> = sessions
            .iter()
            .filter_map(|s| {
                s.rt_median_ms
                    .filter(|rt| rt.is_finite() && *rt > 0.0)
                    .map(|rt| (s, rt))
            })
            .collect();

        let latencies: Vec<f64> = usable.iter().map(|(_, rt)| *rt).collect();
        let baseline = RobustBaseline::from_values(&latencies);

        let samples = usable
            .into_iter()
            .map(|(session, rt)| {
                let at = session.started_at();
                NormalizedSample {
                    at,
                    hour: at.map(|t| local_hour(t, self.offset)),
                    mins_since_last_meal: None,
                    last_meal_type: None,
                    score: -baseline.z_score(rt),
                }
            })
            .collect();

        SampleSource::Derived { samples, baseline }
    }

    /// Fallback step once `precomputed` fails `evidence`: derive samples
    /// from raw sessions and keep whichever set the analysis can use more of
    pub fn resolve(
        &self,
        precomputed: Vec<NormalizedSample>,
        sessions: &[SessionRecord],
        evidence: Evidence,
    ) -> SampleSource {
        prefer(precomputed, self.derive(sessions), evidence)
    }
}

/// Derived samples win only with strictly more samples usable under `evidence`
fn prefer(precomputed: Vec<NormalizedSample>, derived: SampleSource, evidence: Evidence) -> SampleSource {
    let usable_precomputed = evidence.count(&precomputed);
    let usable_derived = evidence.count(derived.samples());

    if usable_derived > usable_precomputed {
        tracing::debug!(
            precomputed = usable_precomputed,
            derived = usable_derived,
            "Using samples derived from raw sessions"
        );
        derived
    } else {
        SampleSource::Precomputed(precomputed)
    }
}

/// Field a sample must carry to be usable by an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Hour,
    MealTiming,
    Timestamp,
}

/// What an analysis needs from each sample, and how many such samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evidence {
    pub min_samples: usize,
    pub requirement: Requirement,
}

impl Evidence {
    /// Samples with an hour of day
    pub fn timed(min_samples: usize) -> Self {
        Evidence {
            min_samples,
            requirement: Requirement::Hour,
        }
    }

    /// Samples with time since the last meal
    pub fn meal_timed(min_samples: usize) -> Self {
        Evidence {
            min_samples,
            requirement: Requirement::MealTiming,
        }
    }

    /// Samples with a timestamp
    pub fn dated(min_samples: usize) -> Self {
        Evidence {
            min_samples,
            requirement: Requirement::Timestamp,
        }
    }

    pub fn is_usable(&self, sample: &NormalizedSample) -> bool {
        match self.requirement {
            Requirement::Hour => sample.hour.is_some(),
            Requirement::MealTiming => sample.mins_since_last_meal.is_some(),
            Requirement::Timestamp => sample.at.is_some(),
        }
    }

    pub fn count(&self, samples: &[NormalizedSample]) -> usize {
        samples.iter().filter(|s| self.is_usable(s)).count()
    }

    pub fn is_met_by(&self, samples: &[NormalizedSample]) -> bool {
        self.count(samples) >= self.min_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_precomputed_scores_are_negated_rt_z() {
        let records = vec![
            FeatureRecord::new(at(9), -1.5).with_hour(9),
            FeatureRecord::new(at(10), 0.5).with_hour(10),
        ];
        let samples = SampleNormalizer::new().precomputed(&records);
        assert_eq!(samples[0].score, 1.5);
        assert_eq!(samples[1].score, -0.5);
        assert_eq!(samples[0].hour, Some(9));
    }

    #[test]
    fn test_precomputed_drops_unusable_fields() {
        let mut bad_hour = FeatureRecord::new(at(9), 0.0).with_hour(31);
        bad_hour.mins_since_last_meal = Some(f64::NAN);
        let mut no_score = FeatureRecord::new(at(9), 0.0);
        no_score.rt_z = Some(f64::INFINITY);

        let samples = SampleNormalizer::new().precomputed(&[bad_hour, no_score]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].hour, None);
        assert_eq!(samples[0].mins_since_last_meal, None);
    }

    #[test]
    fn test_derived_uses_median_and_mad() {
        let sessions = vec![
            SessionRecord::new(at(8), 300.0),
            SessionRecord::new(at(9), 310.0),
            SessionRecord::new(at(10), 320.0),
            SessionRecord::new(at(11), 330.0),
            SessionRecord::new(at(12), 5000.0),
        ];
        let source = SampleNormalizer::new().derive(&sessions);
        assert_eq!(source.kind(), SourceKind::Derived);
        assert_eq!(source.baseline(), Some(RobustBaseline { median: 320.0, mad: 10.0 }));

        let scores: Vec<f64> = source.samples().iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![2.0, 1.0, 0.0, -1.0, -468.0]);
        assert_eq!(source.samples()[0].hour, Some(8));
    }

    #[test]
    fn test_flat_latencies_score_zero() {
        let sessions: Vec<SessionRecord> = (0..6).map(|h| SessionRecord::new(at(h), 275.0)).collect();
        let source = SampleNormalizer::new().derive(&sessions);
        for sample in source.samples() {
            assert!(sample.score.is_finite());
            assert_eq!(sample.score, 0.0);
        }
    }

    #[test]
    fn test_derived_skips_sessions_without_latency() {
        let mut missing = SessionRecord::new(at(8), 0.0);
        missing.rt_median_ms = None;
        let negative = SessionRecord::new(at(9), -12.0);
        let ok = SessionRecord::new(at(10), 400.0);

        let source = SampleNormalizer::new().derive(&[missing, negative, ok]);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_session_hour_uses_offset() {
        let normalizer = SampleNormalizer::with_utc_offset_minutes(-300).unwrap();
        let source = normalizer.derive(&[SessionRecord::new(at(20), 300.0)]);
        assert_eq!(source.samples()[0].hour, Some(15));

        assert!(SampleNormalizer::with_utc_offset_minutes(24 * 60).is_err());
    }

    #[test]
    fn test_fallback_only_when_features_insufficient() {
        let normalizer = SampleNormalizer::new();
        let features: Vec<FeatureRecord> =
            (0..5).map(|h| FeatureRecord::new(at(h), 0.1).with_hour(h as u8)).collect();
        let sessions: Vec<SessionRecord> =
            (0..10).map(|h| SessionRecord::new(at(h), 300.0 + h as f64)).collect();
        let evidence = Evidence::timed(5);

        assert!(evidence.is_met_by(&normalizer.precomputed(&features)));

        let few = normalizer.precomputed(&features[..2]);
        assert!(!evidence.is_met_by(&few));
        let fallback = normalizer.resolve(few, &sessions, evidence);
        assert_eq!(fallback.kind(), SourceKind::Derived);
        assert_eq!(fallback.len(), 10);
    }

    #[test]
    fn test_untimed_features_do_not_count_toward_timed_gate() {
        let normalizer = SampleNormalizer::new();
        let untimed: Vec<FeatureRecord> = (0..10).map(|h| FeatureRecord::new(at(h), 0.0)).collect();
        let precomputed = normalizer.precomputed(&untimed);
        let evidence = Evidence::timed(5);

        assert_eq!(precomputed.len(), 10);
        assert_eq!(evidence.count(&precomputed), 0);
        assert!(!evidence.is_met_by(&precomputed));

        let sessions: Vec<SessionRecord> = (0..6).map(|h| SessionRecord::new(at(h), 300.0)).collect();
        let source = normalizer.resolve(precomputed, &sessions, evidence);
        assert_eq!(source.kind(), SourceKind::Derived);
    }

    #[test]
    fn test_fallback_keeps_features_when_sessions_are_poorer() {
        let normalizer = SampleNormalizer::new();
        let features = vec![FeatureRecord::new(at(9), 0.2), FeatureRecord::new(at(10), 0.3)];
        let precomputed = normalizer.precomputed(&features);
        let source = normalizer.resolve(precomputed, &[SessionRecord::new(at(9), 300.0)], Evidence::dated(30));
        assert_eq!(source.kind(), SourceKind::Precomputed);
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_sessions_never_replace_meal_timed_features() {
        let normalizer = SampleNormalizer::new();
        let features: Vec<FeatureRecord> = (0..3)
            .map(|h| FeatureRecord::new(at(h), 0.0).with_meal(60.0, None))
            .collect();
        let sessions: Vec<SessionRecord> = (0..20).map(|h| SessionRecord::new(at(h % 24), 300.0)).collect();

        let source = normalizer.resolve(normalizer.precomputed(&features), &sessions, Evidence::meal_timed(30));
        assert_eq!(source.kind(), SourceKind::Precomputed);
        assert_eq!(source.len(), 3);
    }
}
