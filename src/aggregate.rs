//! Contextual aggregation of normalized scores
//!
//! One primitive serves every analysis: a [`Grouping`] maps each sample to
//! the context keys it belongs to, [`aggregate`] takes the median score per
//! key and drops groups below an evidence gate, and [`best_group`] /
//! [`rank_groups`] pick or order the survivors. A new contextual dimension
//! only needs a new `Grouping`.

use chrono::{Datelike, FixedOffset, Weekday};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::normalizer::NormalizedSample;
use crate::stats::median;

/// Maps a sample to zero or more context keys
pub trait Grouping {
    type Key: Ord + Clone;

    /// Keys the sample contributes to; empty when the needed field is missing
    fn keys(&self, sample: &NormalizedSample) -> Vec<Self::Key>;
}

/// Robust centre of one context group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary<K> {
    pub key: K,
    pub median_score: f64,
    pub sample_count: usize,
}

/// Group scores by key and keep groups with at least `min_count` samples.
///
/// Output is in ascending key order.
pub fn aggregate<G: Grouping>(
    samples: &[NormalizedSample],
    grouping: &G,
    min_count: usize,
) -> Vec<GroupSummary<G::Key>> {
    let mut groups: BTreeMap<G::Key, Vec<f64>> = BTreeMap::new();

    for sample in samples.iter().filter(|s| s.score.is_finite()) {
        for key in grouping.keys(sample) {
            groups.entry(key).or_default().push(sample.score);
        }
    }

    groups
        .into_iter()
        .filter(|(_, scores)| !scores.is_empty() && scores.len() >= min_count)
        .map(|(key, scores)| GroupSummary {
            key,
            median_score: median(&scores),
            sample_count: scores.len(),
        })
        .collect()
}

/// Group with the strictly greatest median; ties keep the earliest group
pub fn best_group<K>(groups: &[GroupSummary<K>]) -> Option<&GroupSummary<K>> {
    groups.iter().fold(None, |best: Option<&GroupSummary<K>>, group| match best {
        Some(current) if group.median_score > current.median_score => Some(group),
        Some(current) => Some(current),
        None => Some(group),
    })
}

/// Order groups by descending median, preserving key order on ties
pub fn rank_groups<K>(mut groups: Vec<GroupSummary<K>>) -> Vec<GroupSummary<K>> {
    groups.sort_by(|a, b| {
        b.median_score
            .partial_cmp(&a.median_score)
            .unwrap_or(Ordering::Equal)
    });
    groups
}

/// Circular window of `width` consecutive hours, keyed by its start hour
#[derive(Debug, Clone, Copy)]
pub struct HourWindow {
    width: u8,
}

impl HourWindow {
    /// Window width is clamped to 1..=24 hours
    pub fn new(width: u8) -> Self {
        HourWindow {
            width: width.clamp(1, 24),
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }
}

impl Grouping for HourWindow {
    type Key = u8;

    fn keys(&self, sample: &NormalizedSample) -> Vec<u8> {
        match sample.hour.filter(|h| *h < 24) {
            Some(hour) => (0..self.width).map(|back| (hour + 24 - back) % 24).collect(),
            None => Vec::new(),
        }
    }
}

/// Best-performing time-of-day window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestWindow {
    pub start_hour: u8,
    /// `(start_hour + width) % 24`
    pub end_hour: u8,
    pub sample_count: usize,
    pub median_score: f64,
}

impl fmt::Display for BestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

/// Slide a circular `window_hours` window over the day and return the one
/// with the best median score among windows holding at least `min_samples`.
///
/// Start hours are scanned 0..24, so ties resolve to the earliest start.
pub fn find_peak_window(
    samples: &[NormalizedSample],
    window_hours: u8,
    min_samples: usize,
) -> Option<BestWindow> {
    let grouping = HourWindow::new(window_hours);
    let windows = aggregate(samples, &grouping, min_samples.max(1));

    best_group(&windows).map(|window| BestWindow {
        start_hour: window.key,
        end_hour: (window.key + grouping.width()) % 24,
        sample_count: window.sample_count,
        median_score: window.median_score,
    })
}

/// Time since the last meal, in three bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealRecencyBand {
    /// 90 minutes or less
    Recent,
    /// More than 90, at most 180 minutes
    Moderate,
    /// More than 180 minutes
    Fasted,
}

impl MealRecencyBand {
    pub fn from_minutes(minutes: f64) -> Option<Self> {
        if !minutes.is_finite() || minutes < 0.0 {
            return None;
        }
        Some(if minutes <= 90.0 {
            MealRecencyBand::Recent
        } else if minutes <= 180.0 {
            MealRecencyBand::Moderate
        } else {
            MealRecencyBand::Fasted
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MealRecencyBand::Recent => "<=90m",
            MealRecencyBand::Moderate => "90-180m",
            MealRecencyBand::Fasted => ">180m",
        }
    }
}

impl fmt::Display for MealRecencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for MealRecencyBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Groups samples by [`MealRecencyBand`]; samples without meal data are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct MealRecency;

impl Grouping for MealRecency {
    type Key = MealRecencyBand;

    fn keys(&self, sample: &NormalizedSample) -> Vec<MealRecencyBand> {
        sample
            .mins_since_last_meal
            .and_then(MealRecencyBand::from_minutes)
            .into_iter()
            .collect()
    }
}

/// Meal-recency bands ranked best first. Empty bands are omitted.
pub fn meal_recency_summary(
    samples: &[NormalizedSample],
    min_band_samples: usize,
) -> Vec<GroupSummary<MealRecencyBand>> {
    rank_groups(aggregate(samples, &MealRecency, min_band_samples))
}

/// Groups samples by the reported type of their last meal
#[derive(Debug, Clone, Copy, Default)]
pub struct LastMealType;

impl Grouping for LastMealType {
    type Key = String;

    fn keys(&self, sample: &NormalizedSample) -> Vec<String> {
        sample
            .last_meal_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .into_iter()
            .collect()
    }
}

/// Weekday ordered Monday first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOfWeek(pub Weekday);

impl Ord for DayOfWeek {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .num_days_from_monday()
            .cmp(&other.0.num_days_from_monday())
    }
}

impl PartialOrd for DayOfWeek {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Groups samples by local weekday of their timestamp
#[derive(Debug, Clone, Copy)]
pub struct DayOfWeekGrouping {
    offset: FixedOffset,
}

impl DayOfWeekGrouping {
    pub fn new(offset: FixedOffset) -> Self {
        DayOfWeekGrouping { offset }
    }
}

impl Grouping for DayOfWeekGrouping {
    type Key = DayOfWeek;

    fn keys(&self, sample: &NormalizedSample) -> Vec<DayOfWeek> {
        sample
            .at
            .map(|at| DayOfWeek(at.with_timezone(&self.offset).weekday()))
            .into_iter()
            .collect()
    }
}
