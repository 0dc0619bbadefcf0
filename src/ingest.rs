//! Storing provider activities and classifying them on arrival.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::ActivityZoneClassifier;
use crate::error::Result;
use crate::models::{HeartRateSample, ZoneTimeRecord};
use crate::store::ZoneStore;
use crate::streams::ProviderExport;
use crate::zones::ZoneCalculator;

/// What happened to one provider activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    /// Provider id already stored; nothing written
    AlreadyImported { activity_id: String },
    /// Stored; `classified` tells whether a zone record was attached
    Imported { activity_id: String, classified: bool },
}

/// Totals for a batch of exports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub imported: usize,
    pub classified: usize,
    pub skipped: usize,
    /// Provider id and reason for activities that could not be stored
    pub failed: Vec<(i64, String)>,
    pub duration_ms: u128,
}

impl IngestSummary {
    pub fn to_string_pretty(&self) -> String {
        format!(
            "Import Summary\n  \
             Imported: {}\n  \
             With Zones: {}\n  \
             Already Present: {}\n  \
             Failed: {}\n  \
             Total Time: {:.2}s",
            self.imported,
            self.classified,
            self.skipped,
            self.failed.len(),
            self.duration_ms as f64 / 1000.0
        )
    }
}

/// Store one provider activity for `user_id`.
///
/// Activities flagged without heart rate keep no stream. A stream that
/// cannot be classified is still stored, without a zone record.
pub fn ingest_activity<S>(store: &mut S, user_id: &str, export: ProviderExport) -> Result<IngestOutcome>
where
    S: ZoneStore + ?Sized,
{
    let provider_id = export.activity.id;
    if let Some(existing) = store.activity_by_provider_id(provider_id)? {
        debug!(provider_id, activity_id = %existing.id, "Activity already imported");
        return Ok(IngestOutcome::AlreadyImported { activity_id: existing.id });
    }

    let mut activity = export.activity.into_activity(user_id);
    let samples = if activity.has_heart_rate {
        export.streams.as_ref().and_then(|streams| streams.samples())
    } else {
        None
    };

    if let Some(samples) = &samples {
        activity.zone_record = classify_for_user(&*store, user_id, &activity.id, samples)?;
    }

    store.insert_activity(&activity, samples.as_deref())?;

    let classified = activity.zone_record.is_some();
    info!(
        provider_id,
        activity_id = %activity.id,
        samples = samples.as_ref().map_or(0, Vec::len),
        classified,
        "Imported activity"
    );

    Ok(IngestOutcome::Imported {
        activity_id: activity.id,
        classified,
    })
}

fn classify_for_user<S>(
    store: &S,
    user_id: &str,
    activity_id: &str,
    samples: &[HeartRateSample],
) -> Result<Option<ZoneTimeRecord>>
where
    S: ZoneStore + ?Sized,
{
    let config = store.zone_configuration(user_id)?;
    let bands = match ZoneCalculator::derive_bands(&config) {
        Ok(bands) => bands,
        Err(e) => {
            warn!(user_id, error = %e, "Stored zone configuration is unusable, importing without zones");
            return Ok(None);
        }
    };

    match ActivityZoneClassifier::classify(&bands, samples) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(activity_id, error = %e, "Heart-rate stream rejected, importing without zones");
            Ok(None)
        }
    }
}

/// Ingest a batch. Storage failures are recorded per activity.
pub fn ingest_exports<S>(store: &mut S, user_id: &str, exports: Vec<ProviderExport>) -> IngestSummary
where
    S: ZoneStore + ?Sized,
{
    let start_time = Instant::now();
    let mut summary = IngestSummary::default();

    for export in exports {
        let provider_id = export.activity.id;
        match ingest_activity(store, user_id, export) {
            Ok(IngestOutcome::AlreadyImported { .. }) => summary.skipped += 1,
            Ok(IngestOutcome::Imported { classified, .. }) => {
                summary.imported += 1;
                if classified {
                    summary.classified += 1;
                }
            }
            Err(e) => {
                warn!(provider_id, error = %e, "Failed to import activity");
                summary.failed.push((provider_id, e.to_string()));
            }
        }
    }

    summary.duration_ms = start_time.elapsed().as_millis();
    summary
}
