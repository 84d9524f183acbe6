//! Rendering of plans and estimates
//!
//! Plans go out as JSON (the wire shape), CSV (one row per day), or a
//! terminal table. Estimates go out as JSON or short coloured text.

use colored::*;
use serde::Serialize;
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};
use thiserror::Error;

use crate::clock::ClockWindow;
use crate::estimation::{DietCorrelation, PeakEstimate, WeekdayProfile};
use crate::shift_plan::{ShiftPlan, ShiftPlanDay};

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output format for plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Json,
    Csv,
    Table,
}

impl std::str::FromStr for PlanFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(PlanFormat::Json),
            "csv" => Ok(PlanFormat::Csv),
            "table" => Ok(PlanFormat::Table),
            _ => Err(format!("Unsupported plan format: {}", s)),
        }
    }
}

/// Flat per-day row shared by the CSV and table renderings
#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Wake")]
    wake: String,
    #[tabled(rename = "Bed")]
    bed: String,
    #[tabled(rename = "Seek light")]
    light_seek: String,
    #[tabled(rename = "Avoid light")]
    light_avoid: String,
    #[tabled(rename = "Exercise")]
    exercise: String,
    #[tabled(rename = "Meals")]
    meals: String,
    #[tabled(rename = "Nap by")]
    nap_latest: String,
    #[tabled(rename = "Nap max")]
    nap_max_minutes: u32,
    #[tabled(skip)]
    timezone: String,
}

fn join_windows(windows: &[ClockWindow]) -> String {
    windows
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<&ShiftPlanDay> for PlanRow {
    fn from(day: &ShiftPlanDay) -> Self {
        PlanRow {
            date: day.date.format("%Y-%m-%d").to_string(),
            wake: day.wake.to_string(),
            bed: day.bed.to_string(),
            light_seek: join_windows(&day.light_seek),
            light_avoid: join_windows(&day.light_avoid),
            exercise: day.exercise_window.to_string(),
            meals: day.meals.to_string(),
            nap_latest: day.nap.latest.to_string(),
            nap_max_minutes: day.nap.max_minutes,
            timezone: day.timezone.clone(),
        }
    }
}

/// Write the `{ "plan": [...] }` body
pub fn write_plan_json<W: Write>(plan: &ShiftPlan, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, plan)?;
    Ok(())
}

/// Write one CSV row per day
pub fn write_plan_csv<W: Write>(plan: &ShiftPlan, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for day in &plan.plan {
        csv_writer.serialize(PlanRow::from(day))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Terminal table of the plan
pub fn plan_table(plan: &ShiftPlan) -> String {
    let rows: Vec<PlanRow> = plan.plan.iter().map(PlanRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Write a plan in the requested format
pub fn write_plan<W: Write>(plan: &ShiftPlan, format: PlanFormat, mut writer: W) -> Result<(), ExportError> {
    match format {
        PlanFormat::Json => {
            write_plan_json(plan, &mut writer)?;
            writeln!(writer)?;
        }
        PlanFormat::Csv => write_plan_csv(plan, writer)?,
        PlanFormat::Table => writeln!(writer, "{}", plan_table(plan))?,
    }
    Ok(())
}

/// Short human summary of a peak estimate
pub fn peak_text(estimate: &PeakEstimate) -> String {
    match (&estimate.best_window, &estimate.status) {
        (Some(window), _) => format!(
            "{} {} (median score {:.2}, {} sessions, {} data)",
            "Peak window:".green().bold(),
            window.to_string().bold(),
            window.median_score,
            window.sample_count,
            format!("{:?}", estimate.source).to_lowercase()
        ),
        (None, Some(status)) => format!("{} {}", "Unavailable:".yellow().bold(), status),
        (None, None) => "Unavailable".yellow().to_string(),
    }
}

/// Short human summary of a diet correlation
pub fn diet_text(correlation: &DietCorrelation) -> String {
    if let Some(status) = &correlation.status {
        return format!("{} {}", "Unavailable:".yellow().bold(), status);
    }

    let mut lines = vec![format!("{}", "Performance by time since last meal".cyan().bold())];
    for (rank, band) in correlation.summary.iter().enumerate() {
        lines.push(format!(
            "  {}. {:<8} median {:>6.2}  ({} sessions)",
            rank + 1,
            band.key.label(),
            band.median_score,
            band.sample_count
        ));
    }
    if !correlation.by_meal_type.is_empty() {
        lines.push(format!("{}", "By last meal type".cyan().bold()));
        for group in &correlation.by_meal_type {
            lines.push(format!(
                "  {:<10} median {:>6.2}  ({} sessions)",
                group.key, group.median_score, group.sample_count
            ));
        }
    }
    lines.join("\n")
}

/// Short human summary of a weekday profile
pub fn weekday_text(profile: &WeekdayProfile) -> String {
    if let Some(status) = &profile.status {
        return format!("{} {}", "Unavailable:".yellow().bold(), status);
    }

    let mut lines = Vec::with_capacity(profile.days.len() + 1);
    if let Some(best) = profile.best_day {
        lines.push(format!("{} {}", "Best day:".green().bold(), best.0));
    }
    for day in &profile.days {
        lines.push(format!(
            "  {}  median {:>6.2}  ({} sessions)",
            day.key.0, day.median_score, day.sample_count
        ));
    }
    lines.join("\n")
}
