use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::PathBuf;

use zonetrack::aggregation::{AggregationEngine, SummaryWindow};
use zonetrack::classifier::ActivityZoneClassifier;
use zonetrack::config::AppConfig;
use zonetrack::database::Database;
use zonetrack::display::{format_duration, format_zone_times, label_with_range, paint, zone_color};
use zonetrack::ingest::ingest_exports;
use zonetrack::logging::init_logging;
use zonetrack::models::{ZoneBands, ZoneConfiguration, ZoneKey, ZoneMethod, ZoneTimes};
use zonetrack::recompute::{recompute_user_zones, update_zone_configuration, RecomputeSummary};
use zonetrack::store::{ActivityRepository, ConfigurationStore};
use zonetrack::streams::{parse_exports, StreamSet};
use zonetrack::zones::{Sex, ThresholdEstimator, ZoneCalculator};

/// zonetrack - Heart-rate zone tracking CLI
///
/// Classifies activity heart-rate streams into training zones and reports
/// time in zone over rolling windows.
#[derive(Parser)]
#[command(name = "zonetrack")]
#[command(version)]
#[command(about = "Heart-rate zone tracking CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// User to act on (defaults to settings.default_user)
    #[arg(short, long)]
    user: Option<String>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current zone configuration and derived bands
    Zones {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update the zone configuration and recompute every activity
    SetZones {
        /// Maximum heart rate (bpm)
        #[arg(long)]
        max_hr: Option<u16>,

        /// Estimate maximum heart rate from age instead
        #[arg(long, conflicts_with = "max_hr")]
        age: Option<u8>,

        /// Sex for the age estimate (male, female)
        #[arg(long, default_value = "male")]
        sex: Sex,

        /// Resting heart rate (bpm)
        #[arg(long)]
        resting_hr: Option<u16>,

        /// Zone method (percentage, karvonen, fixed)
        #[arg(short, long)]
        method: Option<ZoneMethod>,

        /// Five zone thresholds in percent, e.g. 60,70,80,90,100
        #[arg(long, value_delimiter = ',')]
        thresholds: Option<Vec<u8>>,

        /// Five zone minima in bpm for the fixed method
        #[arg(long, value_delimiter = ',')]
        cutoffs: Option<Vec<u16>>,
    },

    /// Import provider activity exports (JSON)
    Import {
        /// Input file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Classify a stream file against the current zones without storing it
    Classify {
        /// `key_by_type` stream JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Time in zone over a rolling window
    Summary {
        /// Window length in days (7, 30, 90, 365 by default)
        #[arg(short, long)]
        days: Option<u32>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zone breakdown of one activity
    Activity {
        /// Local activity id
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute zone records with the stored configuration
    Recompute,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;

    let user = cli
        .user
        .clone()
        .unwrap_or_else(|| config.settings.default_user.clone());

    let db_path = config.database_path();
    let mut db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?
        .with_default_configuration(config.zones.clone());

    match cli.command {
        Commands::Zones { json } => {
            let zone_config = db.zone_configuration(&user)?;
            let bands = ZoneCalculator::derive_bands(&zone_config)?;

            if json {
                let payload = serde_json::json!({
                    "configuration": zone_config,
                    "zones": bands,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{}", format!("Heart rate zones for {}", user).bold());
                print_configuration(&zone_config);
                print_bands(&bands);
            }
        }

        Commands::SetZones {
            max_hr,
            age,
            sex,
            resting_hr,
            method,
            thresholds,
            cutoffs,
        } => {
            let mut zone_config = db.zone_configuration(&user)?;

            if let Some(age) = age {
                zone_config.max_hr = Some(ThresholdEstimator::estimate_max_hr_from_age(age, sex)?);
            } else if let Some(max_hr) = max_hr {
                zone_config.max_hr = Some(max_hr);
            }
            if let Some(resting_hr) = resting_hr {
                zone_config.resting_hr = Some(resting_hr);
            }
            if let Some(method) = method {
                zone_config.method = method;
            }
            if let Some(thresholds) = thresholds {
                zone_config.thresholds = five(thresholds, "--thresholds")?;
            }
            if let Some(cutoffs) = cutoffs {
                zone_config.method = ZoneMethod::FixedOffset {
                    cutoffs: five(cutoffs, "--cutoffs")?,
                };
            }

            let summary = update_zone_configuration(&mut db, &user, &zone_config, &config.recompute)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            println!("{}", "✓ Heart rate zone settings updated".green().bold());
            print_bands(&ZoneCalculator::derive_bands(&zone_config)?);
            print_recompute(&summary);
        }

        Commands::Import { file } => {
            println!("{}", "Importing activities...".green().bold());
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let exports = parse_exports(&content)?;

            let summary = ingest_exports(&mut db, &user, exports);
            println!("{}", summary.to_string_pretty());
            for (provider_id, reason) in &summary.failed {
                println!("  {} {}: {}", "✗".red(), provider_id, reason);
            }
        }

        Commands::Classify { file } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let streams: StreamSet = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse streams in {}", file.display()))?;
            let Some(samples) = streams.samples() else {
                bail!("{} has no usable heart-rate data", file.display());
            };

            let bands = ZoneCalculator::derive_bands(&db.zone_configuration(&user)?)?;
            let record = ActivityZoneClassifier::classify(&bands, &samples)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            println!("{}", format!("{} samples classified", samples.len()).bold());
            print_zone_times(&record.times, Some(&bands));
        }

        Commands::Summary { days, json } => {
            let days = SummaryWindow::normalized(
                days,
                &config.dashboard.allowed_windows,
                config.dashboard.default_window_days,
            );
            let summary = AggregationEngine::window_summary(&db, &user, &SummaryWindow::last_days(days))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{}",
                    format!(
                        "Last {} days: {} activities, {}",
                        summary.days,
                        summary.activity_count,
                        format_duration(summary.times.total)
                    )
                    .bold()
                );
                let bands = ZoneCalculator::derive_bands(&db.zone_configuration(&user)?).ok();
                print_zone_times(&summary.times, bands.as_ref());
            }
        }

        Commands::Activity { id, json } => {
            let Some(activity) = db.activity(&id)? else {
                bail!("Activity {} not found", id);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&activity)?);
                return Ok(());
            }

            println!("{}", activity.name.bold());
            println!("  Sport: {}", activity.sport);
            println!("  Start: {}", activity.start_date.format("%Y-%m-%d %H:%M UTC"));
            if let Some(distance) = activity.distance {
                println!("  Distance: {:.2} km", distance / 1000.0);
            }
            if let Some(moving) = activity.moving_time {
                println!("  Moving time: {}", format_duration(u64::from(moving)));
            }
            if let (Some(avg), Some(max)) = (activity.average_hr, activity.max_hr) {
                println!("  Heart rate: avg {:.0} / max {:.0} bpm", avg, max);
            }

            match &activity.zone_record {
                Some(record) => print_zone_times(&record.times, record.zone_ranges.as_ref()),
                None => println!("{}", "  No zone data for this activity".dimmed()),
            }
        }

        Commands::Recompute => {
            let summary = recompute_user_zones(&mut db, &user, &config.recompute)?;
            print_recompute(&summary);
        }
    }

    Ok(())
}

fn five<T: Copy + std::fmt::Debug>(values: Vec<T>, flag: &str) -> Result<[T; 5]> {
    match <[T; 5]>::try_from(values) {
        Ok(array) => Ok(array),
        Err(values) => bail!("{} needs exactly five values, got {:?}", flag, values),
    }
}

fn print_configuration(config: &ZoneConfiguration) {
    println!("  Method: {}", config.method);
    if let Some(max_hr) = config.max_hr {
        println!("  Max HR: {} bpm", max_hr);
    }
    if let Some(resting_hr) = config.resting_hr {
        println!("  Resting HR: {} bpm", resting_hr);
    }
    println!("  Thresholds: {:?}", config.thresholds);
}

fn print_bands(bands: &ZoneBands) {
    for key in ZoneKey::ALL.iter().rev() {
        println!(
            "  {} {}",
            paint(*key, "■"),
            label_with_range(*key, bands)
        );
    }
}

fn print_zone_times(times: &ZoneTimes, bands: Option<&ZoneBands>) {
    let formatted = format_zone_times(times);
    let percentages = times.percentages();

    for key in ZoneKey::ALL {
        let label = match bands {
            Some(bands) => label_with_range(key, bands),
            None => zonetrack::display::zone_label(key).to_string(),
        };
        let percent = percentages
            .get(&key)
            .map(|p| format!("{:>5}%", p))
            .unwrap_or_else(|| "    -".to_string());

        println!(
            "  {:<38} {:>8} {}  {}",
            paint(key, &label),
            formatted[&key],
            percent,
            zone_color(key).dimmed()
        );
    }
    println!("  {:<38} {:>8}", "Total".bold(), format_duration(times.total));
}

fn print_recompute(summary: &RecomputeSummary) {
    println!("{}", summary.to_string_pretty());
    for (activity_id, reason) in &summary.failed {
        println!("  {} {}: {}", "✗".red(), activity_id, reason);
    }
}
