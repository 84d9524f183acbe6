// Library interface for ChronoShift modules
// The CLI binary and integration tests both build on these

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod error;
pub mod estimation;
pub mod export;
pub mod logging;
pub mod normalizer;
pub mod samples;
pub mod shift_plan;
pub mod stats;
pub mod store;

// Re-export commonly used types for convenience
pub use aggregate::{find_peak_window, BestWindow, GroupSummary, Grouping, MealRecencyBand};
pub use clock::{add_minutes, ClockTime, ClockWindow};
pub use config::{AppConfig, EstimationConfig};
pub use error::{ChronoShiftError, InputError, Result, StoreError};
pub use estimation::{DietCorrelation, EstimationRequest, PeakEstimate, PerformanceEstimator};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use normalizer::{Evidence, NormalizedSample, SampleNormalizer, SampleSource, SourceKind};
pub use samples::{FeatureRecord, SessionRecord};
pub use shift_plan::{ShiftDirection, ShiftPlan, ShiftPlanDay, ShiftPlanGenerator, ShiftPlanRequest};
pub use store::{MemorySampleStore, SampleStore, SqliteSampleStore};
