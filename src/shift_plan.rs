//! Multi-day wake-time shift planning
//!
//! Walks a wake time from its current value toward a target by at most one
//! step per day, and derives the behavioural windows (light, meals, exercise,
//! nap) for each day from that day's wake and bed times.
//!
//! The generator is a pure function of its request and the start date: the
//! caller decides what "today" is in the user's timezone.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::{ClockTime, ClockWindow};
use crate::error::{InputError, Result};

/// Which way the sleep-wake cycle moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    /// Wake earlier each day
    Advance,
    /// Wake later each day
    Delay,
}

impl fmt::Display for ShiftDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftDirection::Advance => write!(f, "advance"),
            ShiftDirection::Delay => write!(f, "delay"),
        }
    }
}

impl FromStr for ShiftDirection {
    type Err = InputError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "advance" | "earlier" => Ok(ShiftDirection::Advance),
            "delay" | "later" => Ok(ShiftDirection::Delay),
            _ => Err(InputError::invalid_field(
                "direction",
                format!("expected 'advance' or 'delay', got '{}'", s),
            )),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_sleep_need_minutes() -> u32 {
    540
}

fn default_days() -> u32 {
    7
}

/// Plan request as received from a client.
///
/// Wake times stay as strings at this boundary so that a malformed value is
/// reported as a malformed time rather than a generic decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPlanRequest {
    /// Opaque timezone label, echoed into each day
    #[serde(default = "default_timezone", alias = "tz")]
    pub timezone: String,
    pub current_wake: String,
    pub target_wake: String,
    #[serde(default = "default_sleep_need_minutes")]
    pub sleep_need_minutes: u32,
    pub direction: ShiftDirection,
    #[serde(default = "default_days")]
    pub days: u32,
}

impl ShiftPlanRequest {
    pub fn new(
        current_wake: impl Into<String>,
        target_wake: impl Into<String>,
        direction: ShiftDirection,
    ) -> Self {
        Self {
            timezone: default_timezone(),
            current_wake: current_wake.into(),
            target_wake: target_wake.into(),
            sleep_need_minutes: default_sleep_need_minutes(),
            direction,
            days: default_days(),
        }
    }

    /// Decode a JSON request body, reporting absent required fields by name
    pub fn from_json(body: &str) -> Result<Self> {
        Self::from_json_with_defaults(body, default_sleep_need_minutes(), default_days())
    }

    /// Decode a JSON request body, filling an omitted `sleepNeedMinutes` or
    /// `days` with the given values
    pub fn from_json_with_defaults(body: &str, sleep_need_minutes: u32, days: u32) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(body)?;

        for field in ["currentWake", "targetWake", "direction"] {
            if value.get(field).map_or(true, |v| v.is_null()) {
                return Err(InputError::MissingField {
                    field: field.to_string(),
                }
                .into());
            }
        }

        if let Some(object) = value.as_object_mut() {
            for (field, fallback) in [("sleepNeedMinutes", sleep_need_minutes), ("days", days)] {
                if object.get(field).map_or(true, |v| v.is_null()) {
                    object.insert(field.to_string(), fallback.into());
                }
            }
        }

        serde_json::from_value(value)
            .map_err(|e| InputError::invalid_field("request", e.to_string()).into())
    }
}

/// Meal timing guidance; the shape differs by direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MealGuidance {
    Advance {
        breakfast_by: ClockTime,
        lunch: ClockWindow,
        dinner_end_by: ClockTime,
    },
    Delay {
        breakfast: ClockWindow,
        lunch: ClockWindow,
        dinner_end_by: ClockTime,
    },
}

impl MealGuidance {
    pub fn dinner_end_by(&self) -> ClockTime {
        match self {
            MealGuidance::Advance { dinner_end_by, .. } | MealGuidance::Delay { dinner_end_by, .. } => {
                *dinner_end_by
            }
        }
    }
}

impl fmt::Display for MealGuidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealGuidance::Advance {
                breakfast_by,
                lunch,
                dinner_end_by,
            } => write!(
                f,
                "breakfast by {}, lunch {}, dinner done by {}",
                breakfast_by, lunch, dinner_end_by
            ),
            MealGuidance::Delay {
                breakfast,
                lunch,
                dinner_end_by,
            } => write!(
                f,
                "breakfast {}, lunch {}, dinner done by {}",
                breakfast, lunch, dinner_end_by
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NapGuidance {
    pub allowed: bool,
    pub latest: ClockTime,
    pub max_minutes: u32,
}

/// One day of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPlanDay {
    pub date: NaiveDate,
    pub timezone: String,
    pub wake: ClockTime,
    pub bed: ClockTime,
    pub light_seek: Vec<ClockWindow>,
    pub light_avoid: Vec<ClockWindow>,
    pub exercise_window: ClockWindow,
    pub meals: MealGuidance,
    pub nap: NapGuidance,
}

/// Plan response body: `{ "plan": [...] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPlan {
    pub plan: Vec<ShiftPlanDay>,
}

impl ShiftPlan {
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Index of the first day whose wake time equals `target`
    pub fn arrival_day(&self, target: ClockTime) -> Option<usize> {
        self.plan.iter().position(|day| day.wake == target)
    }
}

/// Generator limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftPlanConfig {
    /// Largest wake-time move per day, in minutes (default: 30)
    pub max_daily_step_minutes: u32,

    /// Longest plan accepted, in days (default: 366)
    pub max_plan_days: u32,
}

impl Default for ShiftPlanConfig {
    fn default() -> Self {
        ShiftPlanConfig {
            max_daily_step_minutes: 30,
            max_plan_days: 366,
        }
    }
}

// Window offsets in minutes, relative to wake or bed.
const ADVANCE_LIGHT_SEEK: (i64, i64) = (15, 60);
const DELAY_LIGHT_SEEK: (i64, i64) = (540, 600);
const ADVANCE_LIGHT_AVOID: (i64, i64) = (-180, 0);
const DELAY_LIGHT_AVOID: (i64, i64) = (-90, 0);
const ADVANCE_EXERCISE: (i64, i64) = (120, 240);
const DELAY_EXERCISE: (i64, i64) = (540, 660);
const ADVANCE_BREAKFAST_BY: i64 = 90;
const ADVANCE_DINNER_END_BEFORE_BED: i64 = -180;
const DELAY_DINNER_END_BEFORE_BED: i64 = -120;
const NAP_LATEST_AFTER_WAKE: i64 = 390;
const NAP_MAX_MINUTES: u32 = 20;

const ADVANCE_LUNCH: ClockWindow = ClockWindow(ClockTime::at(12, 0), ClockTime::at(13, 30));
const DELAY_BREAKFAST: ClockWindow = ClockWindow(ClockTime::at(8, 0), ClockTime::at(10, 0));
const DELAY_LUNCH: ClockWindow = ClockWindow(ClockTime::at(12, 30), ClockTime::at(14, 0));

/// Shift plan generator
pub struct ShiftPlanGenerator {
    config: ShiftPlanConfig,
}

impl Default for ShiftPlanGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShiftPlanGenerator {
    /// Create generator with default limits
    pub fn new() -> Self {
        ShiftPlanGenerator {
            config: ShiftPlanConfig::default(),
        }
    }

    /// Create generator with custom limits
    pub fn with_config(config: ShiftPlanConfig) -> Self {
        ShiftPlanGenerator { config }
    }

    /// Generate a plan whose first day is `start_date`.
    ///
    /// Either the whole plan is returned or an error; there are no partial
    /// plans.
    pub fn generate(&self, request: &ShiftPlanRequest, start_date: NaiveDate) -> Result<ShiftPlan> {
        let current: ClockTime = request.current_wake.parse()?;
        let target: ClockTime = request.target_wake.parse()?;
        self.validate(request)?;

        let initial_distance = Self::remaining_minutes(current, target, request.direction);
        if initial_distance > 720 {
            tracing::warn!(
                current = %current,
                target = %target,
                direction = %request.direction,
                minutes = initial_distance,
                "Requested direction takes the long way around the clock"
            );
        }

        let mut plan = Vec::with_capacity(request.days as usize);
        let mut wake = current;

        for day_index in 0..request.days {
            let step = self.daily_step(wake, target, request.direction);
            wake = wake.add_minutes(step)?;

            let date = start_date
                .checked_add_days(Days::new(u64::from(day_index)))
                .ok_or_else(|| InputError::invalid_field("days", "plan runs past the calendar range"))?;

            let day = Self::build_day(request, date, wake)?;
            tracing::debug!(day = day_index, date = %date, wake = %day.wake, bed = %day.bed, step, "Planned day");
            plan.push(day);
        }

        tracing::info!(
            days = plan.len(),
            direction = %request.direction,
            from = %current,
            to = %target,
            final_wake = %wake,
            "Shift plan generated"
        );

        Ok(ShiftPlan { plan })
    }

    fn validate(&self, request: &ShiftPlanRequest) -> Result<()> {
        if !(1..=1440).contains(&request.sleep_need_minutes) {
            return Err(InputError::invalid_field(
                "sleepNeedMinutes",
                format!("must be between 1 and 1440, got {}", request.sleep_need_minutes),
            )
            .into());
        }
        if request.days > self.config.max_plan_days {
            return Err(InputError::invalid_field(
                "days",
                format!("must be at most {}, got {}", self.config.max_plan_days, request.days),
            )
            .into());
        }
        if self.config.max_daily_step_minutes == 0 {
            return Err(InputError::invalid_field("max_daily_step_minutes", "must be positive").into());
        }
        Ok(())
    }

    /// Distance still to travel, measured in the requested direction
    fn remaining_minutes(wake: ClockTime, target: ClockTime, direction: ShiftDirection) -> i64 {
        match direction {
            ShiftDirection::Advance => wake.minutes_earlier_to(target),
            ShiftDirection::Delay => wake.minutes_later_to(target),
        }
    }

    /// Signed wake-time change for one day: capped, and exact on arrival
    fn daily_step(&self, wake: ClockTime, target: ClockTime, direction: ShiftDirection) -> i64 {
        let cap = i64::from(self.config.max_daily_step_minutes);
        let magnitude = Self::remaining_minutes(wake, target, direction).min(cap);
        match direction {
            ShiftDirection::Advance => -magnitude,
            ShiftDirection::Delay => magnitude,
        }
    }

    fn build_day(request: &ShiftPlanRequest, date: NaiveDate, wake: ClockTime) -> Result<ShiftPlanDay> {
        let bed = wake.add_minutes(-i64::from(request.sleep_need_minutes))?;

        let (light_seek, light_avoid, exercise_window, meals) = match request.direction {
            ShiftDirection::Advance => (
                ClockWindow::around(wake, ADVANCE_LIGHT_SEEK.0, ADVANCE_LIGHT_SEEK.1)?,
                ClockWindow::around(bed, ADVANCE_LIGHT_AVOID.0, ADVANCE_LIGHT_AVOID.1)?,
                ClockWindow::around(wake, ADVANCE_EXERCISE.0, ADVANCE_EXERCISE.1)?,
                MealGuidance::Advance {
                    breakfast_by: wake.add_minutes(ADVANCE_BREAKFAST_BY)?,
                    lunch: ADVANCE_LUNCH,
                    dinner_end_by: bed.add_minutes(ADVANCE_DINNER_END_BEFORE_BED)?,
                },
            ),
            ShiftDirection::Delay => (
                ClockWindow::around(wake, DELAY_LIGHT_SEEK.0, DELAY_LIGHT_SEEK.1)?,
                ClockWindow::around(bed, DELAY_LIGHT_AVOID.0, DELAY_LIGHT_AVOID.1)?,
                ClockWindow::around(wake, DELAY_EXERCISE.0, DELAY_EXERCISE.1)?,
                MealGuidance::Delay {
                    breakfast: DELAY_BREAKFAST,
                    lunch: DELAY_LUNCH,
                    dinner_end_by: bed.add_minutes(DELAY_DINNER_END_BEFORE_BED)?,
                },
            ),
        };

        Ok(ShiftPlanDay {
            date,
            timezone: request.timezone.clone(),
            wake,
            bed,
            light_seek: vec![light_seek],
            light_avoid: vec![light_avoid],
            exercise_window,
            meals,
            nap: NapGuidance {
                allowed: true,
                latest: wake.add_minutes(NAP_LATEST_AFTER_WAKE)?,
                max_minutes: NAP_MAX_MINUTES,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChronoShiftError;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_single_advance_day_matches_reference_scenario() {
        let mut request = ShiftPlanRequest::new("08:30", "06:30", ShiftDirection::Advance);
        request.days = 1;

        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        assert_eq!(plan.len(), 1);

        let day = &plan.plan[0];
        assert_eq!(day.wake, t("08:00"));
        assert_eq!(day.bed, t("23:00"));
        assert_eq!(day.light_seek, vec![ClockWindow(t("08:15"), t("09:00"))]);
        assert_eq!(day.light_avoid, vec![ClockWindow(t("20:00"), t("23:00"))]);
        assert_eq!(day.exercise_window, ClockWindow(t("10:00"), t("12:00")));
        assert_eq!(
            day.meals,
            MealGuidance::Advance {
                breakfast_by: t("09:30"),
                lunch: ClockWindow(t("12:00"), t("13:30")),
                dinner_end_by: t("20:00"),
            }
        );
        assert_eq!(day.nap.latest, t("14:30"));
        assert_eq!(day.nap.max_minutes, 20);
        assert!(day.nap.allowed);
        assert_eq!(day.date, start());
    }

    #[test]
    fn test_advance_arrives_exactly_and_holds() {
        let request = ShiftPlanRequest::new("08:30", "06:30", ShiftDirection::Advance);
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();

        let wakes: Vec<String> = plan.plan.iter().map(|d| d.wake.to_string()).collect();
        assert_eq!(wakes, vec!["08:00", "07:30", "07:00", "06:30", "06:30", "06:30", "06:30"]);
        assert_eq!(plan.arrival_day(t("06:30")), Some(3));
    }

    #[test]
    fn test_long_way_round_follows_requested_direction() {
        // 07:00 is 23 hours earlier than 06:00
        let mut request = ShiftPlanRequest::new("06:00", "07:00", ShiftDirection::Advance);
        request.days = 50;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();

        let mut previous = t("06:00");
        for day in &plan.plan[..46] {
            assert_eq!(previous.minutes_earlier_to(day.wake), 30);
            assert_ne!(previous, t("07:00"));
            previous = day.wake;
        }
        assert_eq!(plan.arrival_day(t("07:00")), Some(45));
        assert!(plan.plan[45..].iter().all(|d| d.wake == t("07:00")));
        assert_eq!(plan.plan[0].wake, t("05:30"));
    }

    #[test]
    fn test_long_way_round_delay_with_partial_step() {
        // 23:50 later from 00:10 is 1420 minutes: 47 full steps then 10
        let mut request = ShiftPlanRequest::new("00:10", "23:50", ShiftDirection::Delay);
        request.days = 49;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();

        assert_eq!(plan.plan[0].wake, t("00:40"));
        assert_eq!(plan.plan[46].wake, t("23:40"));
        assert_eq!(plan.plan[47].wake, t("23:50"));
        assert_eq!(plan.plan[48].wake, t("23:50"));
        assert_eq!(plan.arrival_day(t("23:50")), Some(47));
    }

    #[test]
    fn test_partial_final_step_does_not_overshoot() {
        let mut request = ShiftPlanRequest::new("07:00", "07:50", ShiftDirection::Delay);
        request.days = 3;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();

        let wakes: Vec<ClockTime> = plan.plan.iter().map(|d| d.wake).collect();
        assert_eq!(wakes, vec![t("07:30"), t("07:50"), t("07:50")]);
    }

    #[test]
    fn test_delay_windows() {
        let mut request = ShiftPlanRequest::new("06:00", "08:00", ShiftDirection::Delay);
        request.days = 1;
        request.sleep_need_minutes = 480;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        let day = &plan.plan[0];

        assert_eq!(day.wake, t("06:30"));
        assert_eq!(day.bed, t("22:30"));
        assert_eq!(day.light_seek, vec![ClockWindow(t("15:30"), t("16:30"))]);
        assert_eq!(day.light_avoid, vec![ClockWindow(t("21:00"), t("22:30"))]);
        assert_eq!(day.exercise_window, ClockWindow(t("15:30"), t("17:30")));
        assert_eq!(
            day.meals,
            MealGuidance::Delay {
                breakfast: ClockWindow(t("08:00"), t("10:00")),
                lunch: ClockWindow(t("12:30"), t("14:00")),
                dinner_end_by: t("20:30"),
            }
        );
    }

    #[test]
    fn test_midnight_straddling_shift_follows_direction() {
        // 23:30 -> 00:30 is one hour later across midnight
        let mut request = ShiftPlanRequest::new("23:30", "00:30", ShiftDirection::Delay);
        request.days = 3;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        let wakes: Vec<ClockTime> = plan.plan.iter().map(|d| d.wake).collect();
        assert_eq!(wakes, vec![t("00:00"), t("00:30"), t("00:30")]);
    }

    #[test]
    fn test_dates_increment_from_start() {
        let request = ShiftPlanRequest::new("07:00", "06:00", ShiftDirection::Advance);
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        assert_eq!(plan.plan[6].date, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert!(plan.plan.iter().all(|d| d.timezone == "UTC"));
    }

    #[test]
    fn test_malformed_time_fails_whole_request() {
        let request = ShiftPlanRequest::new("8.30", "06:30", ShiftDirection::Advance);
        let err = ShiftPlanGenerator::new().generate(&request, start()).unwrap_err();
        assert!(matches!(
            err,
            ChronoShiftError::MalformedInput(InputError::MalformedTime { .. })
        ));
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        let mut request = ShiftPlanRequest::new("08:30", "06:30", ShiftDirection::Advance);
        request.sleep_need_minutes = 0;
        assert!(ShiftPlanGenerator::new().generate(&request, start()).is_err());

        request.sleep_need_minutes = 540;
        request.days = 10_000;
        assert!(ShiftPlanGenerator::new().generate(&request, start()).is_err());
    }

    #[test]
    fn test_zero_days_is_empty_plan() {
        let mut request = ShiftPlanRequest::new("08:30", "06:30", ShiftDirection::Advance);
        request.days = 0;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_custom_step_cap() {
        let generator = ShiftPlanGenerator::with_config(ShiftPlanConfig {
            max_daily_step_minutes: 15,
            ..ShiftPlanConfig::default()
        });
        let mut request = ShiftPlanRequest::new("08:00", "07:00", ShiftDirection::Advance);
        request.days = 2;
        let plan = generator.generate(&request, start()).unwrap();
        assert_eq!(plan.plan[1].wake, t("07:30"));
    }

    #[test]
    fn test_request_json_defaults_and_missing_fields() {
        let request = ShiftPlanRequest::from_json(
            r#"{"tz":"Europe/Paris","currentWake":"08:30","targetWake":"06:30","direction":"advance"}"#,
        )
        .unwrap();
        assert_eq!(request.timezone, "Europe/Paris");
        assert_eq!(request.sleep_need_minutes, 540);
        assert_eq!(request.days, 7);

        let err = ShiftPlanRequest::from_json(r#"{"currentWake":"08:30","direction":"advance"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ChronoShiftError::MalformedInput(InputError::MissingField { ref field }) if field == "targetWake"
        ));
    }

    #[test]
    fn test_request_json_uses_supplied_defaults() {
        let body = r#"{"currentWake": "08:30", "targetWake": "06:30", "direction": "advance"}"#;
        let request = ShiftPlanRequest::from_json_with_defaults(body, 480, 3).unwrap();
        assert_eq!(request.sleep_need_minutes, 480);
        assert_eq!(request.days, 3);

        let body = r#"{"currentWake": "08:30", "targetWake": "06:30", "direction": "advance",
                       "sleepNeedMinutes": 420, "days": null}"#;
        let request = ShiftPlanRequest::from_json_with_defaults(body, 480, 3).unwrap();
        assert_eq!(request.sleep_need_minutes, 420);
        assert_eq!(request.days, 3);
    }

    #[test]
    fn test_day_serializes_with_wire_names() {
        let mut request = ShiftPlanRequest::new("08:30", "06:30", ShiftDirection::Advance);
        request.days = 1;
        let plan = ShiftPlanGenerator::new().generate(&request, start()).unwrap();
        let json = serde_json::to_value(&plan).unwrap();

        let day = &json["plan"][0];
        assert_eq!(day["date"], "2024-03-01");
        assert_eq!(day["wake"], "08:00");
        assert_eq!(day["light_seek"][0][0], "08:15");
        assert_eq!(day["meals"]["breakfast_by"], "09:30");
        assert_eq!(day["nap"]["maxMinutes"], 20);

        let decoded: ShiftPlan = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, plan);
    }
}
