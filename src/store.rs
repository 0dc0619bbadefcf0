//! Collaborator contracts between the zone engine and its storage.
//!
//! The engine only reads configurations, samples and records through these
//! traits. `InMemoryStore` backs tests and short-lived tools; the SQLite
//! adapter lives in `database`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::{DatabaseError, Result};
use crate::models::{Activity, HeartRateSample, ZoneConfiguration, ZoneTimeRecord};

/// Supplies the heart-rate stream of an activity
pub trait SampleProvider {
    /// `Ok(None)` means the activity has no heart-rate data
    fn heart_rate_samples(&self, activity_id: &str) -> Result<Option<Vec<HeartRateSample>>>;
}

/// Per-user zone configuration storage
pub trait ConfigurationStore {
    /// Stored configuration, or `ZoneConfiguration::default()` when the user
    /// has none yet
    fn zone_configuration(&self, user_id: &str) -> Result<ZoneConfiguration>;

    fn save_zone_configuration(&mut self, user_id: &str, config: &ZoneConfiguration) -> Result<()>;
}

/// Activity and zone record storage
pub trait ActivityRepository {
    /// Store a new activity with its optional heart-rate stream
    fn insert_activity(&mut self, activity: &Activity, samples: Option<&[HeartRateSample]>) -> Result<()>;

    fn activity(&self, activity_id: &str) -> Result<Option<Activity>>;

    fn activity_by_provider_id(&self, provider_id: i64) -> Result<Option<Activity>>;

    /// All of a user's activities flagged as having heart-rate data
    fn heart_rate_activities(&self, user_id: &str) -> Result<Vec<Activity>>;

    /// Zone records of a user's heart-rate activities starting within
    /// `[start, end]`
    fn zone_records_in_window(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ZoneTimeRecord>>;

    /// Replace the zone records of the listed activities in one step.
    /// `None` clears a record. Returns the number of activities updated.
    fn replace_zone_records(
        &mut self,
        user_id: &str,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize>;
}

/// Everything the recompute and ingest paths need from a store
pub trait ZoneStore: ConfigurationStore + ActivityRepository + SampleProvider {
    /// Save a user's configuration together with the records computed from
    /// it. Either both land or neither does. Returns the number of
    /// activities updated.
    fn apply_zone_configuration(
        &mut self,
        user_id: &str,
        config: &ZoneConfiguration,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize>;
}

/// Map-backed store
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    configurations: HashMap<String, ZoneConfiguration>,
    activities: BTreeMap<String, Activity>,
    samples: HashMap<String, Vec<HeartRateSample>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }
}

impl SampleProvider for InMemoryStore {
    fn heart_rate_samples(&self, activity_id: &str) -> Result<Option<Vec<HeartRateSample>>> {
        Ok(self.samples.get(activity_id).cloned())
    }
}

impl ConfigurationStore for InMemoryStore {
    fn zone_configuration(&self, user_id: &str) -> Result<ZoneConfiguration> {
        Ok(self.configurations.get(user_id).cloned().unwrap_or_default())
    }

    fn save_zone_configuration(&mut self, user_id: &str, config: &ZoneConfiguration) -> Result<()> {
        self.configurations.insert(user_id.to_string(), config.clone());
        Ok(())
    }
}

impl ActivityRepository for InMemoryStore {
    fn insert_activity(&mut self, activity: &Activity, samples: Option<&[HeartRateSample]>) -> Result<()> {
        let provider_taken = activity.provider_id.is_some()
            && self
                .activities
                .values()
                .any(|existing| existing.provider_id == activity.provider_id);
        if provider_taken || self.activities.contains_key(&activity.id) {
            return Err(DatabaseError::Duplicate {
                table: "activities".to_string(),
                key: activity.id.clone(),
            }
            .into());
        }

        self.activities.insert(activity.id.clone(), activity.clone());
        if let Some(samples) = samples {
            self.samples.insert(activity.id.clone(), samples.to_vec());
        }
        Ok(())
    }

    fn activity(&self, activity_id: &str) -> Result<Option<Activity>> {
        Ok(self.activities.get(activity_id).cloned())
    }

    fn activity_by_provider_id(&self, provider_id: i64) -> Result<Option<Activity>> {
        Ok(self
            .activities
            .values()
            .find(|activity| activity.provider_id == Some(provider_id))
            .cloned())
    }

    fn heart_rate_activities(&self, user_id: &str) -> Result<Vec<Activity>> {
        Ok(self
            .activities
            .values()
            .filter(|activity| activity.user_id == user_id && activity.has_heart_rate)
            .cloned()
            .collect())
    }

    fn zone_records_in_window(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ZoneTimeRecord>> {
        Ok(self
            .activities
            .values()
            .filter(|activity| {
                activity.user_id == user_id
                    && activity.has_heart_rate
                    && activity.start_date >= start
                    && activity.start_date <= end
            })
            .filter_map(|activity| activity.zone_record.clone())
            .collect())
    }

    fn replace_zone_records(
        &mut self,
        user_id: &str,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize> {
        self.check_owned(user_id, updates)?;

        for (activity_id, record) in updates {
            if let Some(activity) = self.activities.get_mut(activity_id) {
                activity.zone_record = record.clone();
            }
        }
        Ok(updates.len())
    }
}

impl ZoneStore for InMemoryStore {
    fn apply_zone_configuration(
        &mut self,
        user_id: &str,
        config: &ZoneConfiguration,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize> {
        self.check_owned(user_id, updates)?;
        self.save_zone_configuration(user_id, config)?;
        self.replace_zone_records(user_id, updates)
    }
}

impl InMemoryStore {
    /// Every target must exist and belong to the user, so a bad id leaves
    /// the store untouched
    fn check_owned(&self, user_id: &str, updates: &[(String, Option<ZoneTimeRecord>)]) -> Result<()> {
        for (activity_id, _) in updates {
            match self.activities.get(activity_id) {
                Some(activity) if activity.user_id == user_id => {}
                _ => {
                    return Err(DatabaseError::NotFound {
                        table: "activities".to_string(),
                        id: activity_id.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }
}
