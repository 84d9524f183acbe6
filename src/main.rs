use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chronoshift::config::AppConfig;
use chronoshift::estimation::{EstimationRequest, PerformanceEstimator};
use chronoshift::export::{self, PlanFormat};
use chronoshift::logging::init_logging;
use chronoshift::shift_plan::{ShiftDirection, ShiftPlanGenerator, ShiftPlanRequest};
use chronoshift::store::{MemorySampleStore, SampleStore, SqliteSampleStore};

/// ChronoShift - circadian realignment planner and peak-performance estimator
#[derive(Parser)]
#[command(name = "chronoshift")]
#[command(version)]
#[command(about = "Shift your wake time and find your best hours", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Where estimation commands read samples from
#[derive(clap::Args)]
struct SourceArgs {
    /// User whose history is analysed
    #[arg(short, long)]
    user: String,

    /// SQLite sample store (defaults to `database_path` from config)
    #[arg(long, value_name = "FILE", conflicts_with = "samples")]
    db: Option<PathBuf>,

    /// JSON sample file keyed by user id
    #[arg(long, value_name = "FILE")]
    samples: Option<PathBuf>,

    /// Records fetched per source (capped by config)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Minutes east of UTC for raw session timestamps
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset: i32,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a day-by-day wake-time shift plan
    Plan {
        /// JSON request body (overrides the individual flags)
        #[arg(short, long, value_name = "FILE")]
        request: Option<PathBuf>,

        /// Current wake time (HH:mm)
        #[arg(long)]
        current: Option<String>,

        /// Target wake time (HH:mm)
        #[arg(long)]
        target: Option<String>,

        /// advance (earlier) or delay (later)
        #[arg(long)]
        direction: Option<String>,

        /// Sleep need in minutes
        #[arg(long)]
        sleep_need: Option<u32>,

        /// Number of days to plan
        #[arg(long)]
        days: Option<u32>,

        /// Timezone label echoed into each day
        #[arg(long, default_value = "UTC")]
        tz: String,

        /// First plan day (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Output format (json, csv, table)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// Estimate the best 2-hour time-of-day window
    Peak(SourceArgs),

    /// Correlate performance with time since last meal
    Diet(SourceArgs),

    /// Compare performance across weekdays
    Weekday(SourceArgs),

    /// Show or create the configuration file
    Config {
        /// Print the active configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

#[derive(Clone, Copy)]
enum Estimate {
    Peak,
    Diet,
    Weekday,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;

    match cli.command {
        Commands::Plan {
            request,
            current,
            target,
            direction,
            sleep_need,
            days,
            tz,
            start_date,
            format,
        } => {
            let request = match request {
                Some(path) => {
                    let body = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read request: {}", path.display()))?;
                    ShiftPlanRequest::from_json_with_defaults(
                        &body,
                        config.plan.default_sleep_need_minutes,
                        config.plan.default_days,
                    )
                    .map_err(|e| anyhow::anyhow!(e.user_message()))?
                }
                None => {
                    let current = current.context("--current is required without --request")?;
                    let target = target.context("--target is required without --request")?;
                    let direction: ShiftDirection = direction
                        .context("--direction is required without --request")?
                        .parse()?;
                    ShiftPlanRequest {
                        timezone: tz,
                        current_wake: current,
                        target_wake: target,
                        sleep_need_minutes: sleep_need.unwrap_or(config.plan.default_sleep_need_minutes),
                        direction,
                        days: days.unwrap_or(config.plan.default_days),
                    }
                }
            };

            let format: PlanFormat = format.parse().map_err(anyhow::Error::msg)?;
            let start = start_date.unwrap_or_else(|| chrono::Local::now().date_naive());

            let plan = ShiftPlanGenerator::with_config(config.plan.generator_config())
                .generate(&request, start)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            export::write_plan(&plan, format, io::stdout().lock())?;
        }

        Commands::Peak(args) => run_estimate(&config, args, Estimate::Peak).await?,
        Commands::Diet(args) => run_estimate(&config, args, Estimate::Diet).await?,
        Commands::Weekday(args) => run_estimate(&config, args, Estimate::Weekday).await?,

        Commands::Config { show, init } => {
            let path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
            if init {
                if path.exists() {
                    anyhow::bail!("Config file already exists: {}", path.display());
                }
                config.save_to_file(&path)?;
                println!("{} {}", "✓ Wrote".green(), path.display());
            }
            if show || !init {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

async fn run_estimate(config: &AppConfig, args: SourceArgs, kind: Estimate) -> Result<()> {
    let request = EstimationRequest {
        user_id: args.user.clone(),
        limit: args.limit,
        utc_offset_minutes: args.utc_offset,
    };
    let json = match args.format.to_lowercase().as_str() {
        "json" => true,
        "text" => false,
        other => anyhow::bail!("Unsupported output format: {}", other),
    };

    if let Some(path) = &args.samples {
        let store = MemorySampleStore::from_json_file(path)
            .with_context(|| format!("Failed to load samples: {}", path.display()))?;
        return report(PerformanceEstimator::with_config(store, config.estimation.clone()), &request, kind, json).await;
    }

    let db_path = args
        .db
        .as_deref()
        .or(config.database_path.as_deref())
        .context("No sample source: pass --db or --samples, or set database_path in config")?;
    let store = open_store(db_path)?;
    report(PerformanceEstimator::with_config(store, config.estimation.clone()), &request, kind, json).await
}

fn open_store(path: &Path) -> Result<SqliteSampleStore> {
    SqliteSampleStore::open(path).with_context(|| format!("Failed to open sample store: {}", path.display()))
}

async fn report<S: SampleStore>(
    estimator: PerformanceEstimator<S>,
    request: &EstimationRequest,
    kind: Estimate,
    json: bool,
) -> Result<()> {
    let rendered = match kind {
        Estimate::Peak => {
            let estimate = estimator.estimate_peak(request).await?;
            if json {
                serde_json::to_string_pretty(&estimate)?
            } else {
                export::peak_text(&estimate)
            }
        }
        Estimate::Diet => {
            let correlation = estimator.diet_correlation(request).await?;
            if json {
                serde_json::to_string_pretty(&correlation)?
            } else {
                export::diet_text(&correlation)
            }
        }
        Estimate::Weekday => {
            let profile = estimator.weekday_profile(request).await?;
            if json {
                serde_json::to_string_pretty(&profile)?
            } else {
                export::weekday_text(&profile)
            }
        }
    };

    println!("{}", rendered);
    Ok(())
}
