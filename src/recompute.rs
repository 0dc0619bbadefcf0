//! Zone record recomputation after a configuration change.
//!
//! A pass derives bands once, classifies every heart-rate activity of the
//! user in parallel against that snapshot and writes all results back in a
//! single replacement. A failing activity is reported and its stale record
//! cleared; it never aborts the pass.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::ActivityZoneClassifier;
use crate::error::Result;
use crate::models::{HeartRateSample, ZoneBands, ZoneConfiguration, ZoneTimeRecord};
use crate::store::ZoneStore;
use crate::zones::ZoneCalculator;

/// Options for a recompute pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeConfig {
    /// Show a progress bar while classifying
    pub show_progress: bool,
}

/// Outcome of one recompute pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecomputeSummary {
    pub user_id: String,
    /// Heart-rate activities considered
    pub total: usize,
    /// Activities that received a fresh record
    pub recomputed: usize,
    /// Activities without a usable stream
    pub skipped_no_data: usize,
    /// Activities that failed classification, with the reason
    pub failed: Vec<(String, String)>,
    pub duration_ms: u128,
}

impl RecomputeSummary {
    pub fn is_fully_successful(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn to_string_pretty(&self) -> String {
        format!(
            "Zone Recompute Summary\n  \
             User: {}\n  \
             Activities: {}\n  \
             Recomputed: {}\n  \
             No HR Data: {}\n  \
             Failed: {}\n  \
             Total Time: {:.2}s",
            self.user_id,
            self.total,
            self.recomputed,
            self.skipped_no_data,
            self.failed.len(),
            self.duration_ms as f64 / 1000.0
        )
    }
}

enum Outcome {
    Classified(ZoneTimeRecord),
    NoData,
    Failed(String),
}

/// Validate, persist and apply a new zone configuration.
///
/// An invalid configuration is rejected before anything is written. The
/// configuration is stored in the same write as the recomputed records, so
/// a failed write leaves the previous configuration in place.
pub fn update_zone_configuration<S>(
    store: &mut S,
    user_id: &str,
    config: &ZoneConfiguration,
    options: &RecomputeConfig,
) -> Result<RecomputeSummary>
where
    S: ZoneStore + ?Sized,
{
    config.validate_for_update()?;
    let bands = ZoneCalculator::derive_bands(config)?;

    let start_time = Instant::now();
    let (mut summary, updates) = classify_all(store, user_id, &bands, options)?;
    store.apply_zone_configuration(user_id, config, &updates)?;
    info!(user_id, method = %config.method, max_hr = ?config.max_hr, "Zone configuration updated");

    summary.duration_ms = start_time.elapsed().as_millis();
    log_finished(&summary);
    Ok(summary)
}

/// Recompute every heart-rate activity of a user with the stored configuration
pub fn recompute_user_zones<S>(store: &mut S, user_id: &str, options: &RecomputeConfig) -> Result<RecomputeSummary>
where
    S: ZoneStore + ?Sized,
{
    let config = store.zone_configuration(user_id)?;
    let bands = ZoneCalculator::derive_bands(&config)?;

    let start_time = Instant::now();
    let (mut summary, updates) = classify_all(store, user_id, &bands, options)?;
    store.replace_zone_records(user_id, &updates)?;

    summary.duration_ms = start_time.elapsed().as_millis();
    log_finished(&summary);
    Ok(summary)
}

type RecordUpdates = Vec<(String, Option<ZoneTimeRecord>)>;

fn classify_all<S>(
    store: &S,
    user_id: &str,
    bands: &ZoneBands,
    options: &RecomputeConfig,
) -> Result<(RecomputeSummary, RecordUpdates)>
where
    S: ZoneStore + ?Sized,
{
    let activities = store.heart_rate_activities(user_id)?;
    info!(user_id, activities = activities.len(), "Starting zone recompute");

    // Storage reads stay on this thread; only classification fans out
    let inputs: Vec<(String, std::result::Result<Option<Vec<HeartRateSample>>, String>)> = activities
        .into_iter()
        .map(|activity| {
            let samples = store
                .heart_rate_samples(&activity.id)
                .map_err(|e| e.to_string());
            (activity.id, samples)
        })
        .collect();

    let progress = options.show_progress.then(|| {
        let pb = ProgressBar::new(inputs.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("classifying");
        pb
    });

    let outcomes: Vec<(String, Outcome)> = inputs
        .into_par_iter()
        .map(|(activity_id, samples)| {
            let outcome = match samples {
                Ok(Some(samples)) if !samples.is_empty() => {
                    match ActivityZoneClassifier::classify(bands, &samples) {
                        Ok(record) => Outcome::Classified(record),
                        Err(e) => Outcome::Failed(e.to_string()),
                    }
                }
                Ok(_) => Outcome::NoData,
                Err(e) => Outcome::Failed(e),
            };
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            (activity_id, outcome)
        })
        .collect();

    if let Some(pb) = progress {
        pb.finish_with_message("Complete");
    }

    let mut summary = RecomputeSummary {
        user_id: user_id.to_string(),
        total: outcomes.len(),
        ..Default::default()
    };
    let mut updates = Vec::with_capacity(outcomes.len());

    for (activity_id, outcome) in outcomes {
        let record = match outcome {
            Outcome::Classified(record) => {
                debug!(activity_id = %activity_id, total_seconds = record.times.total, "Recomputed zones");
                summary.recomputed += 1;
                Some(record)
            }
            Outcome::NoData => {
                debug!(activity_id = %activity_id, "No heart-rate samples, clearing record");
                summary.skipped_no_data += 1;
                None
            }
            Outcome::Failed(reason) => {
                warn!(activity_id = %activity_id, error = %reason, "Zone classification failed");
                summary.failed.push((activity_id.clone(), reason));
                None
            }
        };
        updates.push((activity_id, record));
    }

    Ok((summary, updates))
}

fn log_finished(summary: &RecomputeSummary) {
    info!(
        user_id = %summary.user_id,
        recomputed = summary.recomputed,
        skipped = summary.skipped_no_data,
        failed = summary.failed.len(),
        duration_ms = summary.duration_ms as u64,
        "Zone recompute finished"
    );
}
