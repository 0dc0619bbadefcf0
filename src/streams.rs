//! Provider activity exports: summary payloads and `key_by_type` streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ZoneTrackError};
use crate::models::{Activity, HeartRateSample};

/// Timestamp layout used by the provider for `start_date`
pub const PROVIDER_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

mod provider_date {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::PROVIDER_DATE_FORMAT;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(PROVIDER_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, PROVIDER_DATE_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Activity summary as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderActivity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub sport: String,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub moving_time: Option<u32>,
    #[serde(default)]
    pub elapsed_time: Option<u32>,
    #[serde(with = "provider_date")]
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub has_heartrate: bool,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
}

impl ProviderActivity {
    /// Local activity owned by `user_id`, without a zone record yet
    pub fn into_activity(self, user_id: &str) -> Activity {
        Activity {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            provider_id: Some(self.id),
            name: self.name,
            sport: self.sport,
            distance: self.distance,
            moving_time: self.moving_time,
            elapsed_time: self.elapsed_time,
            start_date: self.start_date,
            average_hr: self.average_heartrate,
            max_hr: self.max_heartrate,
            has_heart_rate: self.has_heartrate,
            zone_record: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

/// Streams keyed by type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSet {
    #[serde(default)]
    pub time: Stream<u32>,
    #[serde(default)]
    pub heartrate: Stream<u16>,
}

impl StreamSet {
    pub fn new(time: Vec<u32>, heartrate: Vec<u16>) -> Self {
        Self {
            time: Stream { data: time },
            heartrate: Stream { data: heartrate },
        }
    }

    /// Paired samples, or `None` when either stream is empty or the lengths
    /// differ
    pub fn samples(&self) -> Option<Vec<HeartRateSample>> {
        let (time, hr) = (&self.time.data, &self.heartrate.data);
        if time.is_empty() || hr.is_empty() {
            return None;
        }
        if time.len() != hr.len() {
            tracing::warn!(
                time_points = time.len(),
                heartrate_points = hr.len(),
                "Stream lengths differ, treating as no heart-rate data"
            );
            return None;
        }

        Some(
            time.iter()
                .zip(hr)
                .map(|(&elapsed, &bpm)| HeartRateSample::new(elapsed, bpm))
                .collect(),
        )
    }
}

/// One exported activity with its optional streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderExport {
    pub activity: ProviderActivity,
    #[serde(default)]
    pub streams: Option<StreamSet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExportFile {
    Many(Vec<ProviderExport>),
    One(ProviderExport),
}

/// Parse an export file holding one activity or an array of them
pub fn parse_exports(json: &str) -> Result<Vec<ProviderExport>> {
    let parsed: ExportFile = serde_json::from_str(json).map_err(|e| {
        ZoneTrackError::Validation(format!("Unrecognized activity export: {}", e))
    })?;

    Ok(match parsed {
        ExportFile::Many(exports) => exports,
        ExportFile::One(export) => vec![export],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SUMMARY: &str = r#"{
        "id": 11223344,
        "name": "Lunch Run",
        "type": "Run",
        "distance": 8012.4,
        "moving_time": 2710,
        "elapsed_time": 2795,
        "start_date": "2024-05-14T11:32:07Z",
        "has_heartrate": true,
        "average_heartrate": 151.2,
        "max_heartrate": 174.0,
        "kudos_count": 3
    }"#;

    #[test]
    fn test_parse_activity_summary() {
        let activity: ProviderActivity = serde_json::from_str(SUMMARY).unwrap();

        assert_eq!(activity.id, 11223344);
        assert_eq!(activity.sport, "Run");
        assert_eq!(
            activity.start_date,
            Utc.with_ymd_and_hms(2024, 5, 14, 11, 32, 7).unwrap()
        );
        assert!(activity.has_heartrate);

        let local = activity.into_activity("athlete-7");
        assert_eq!(local.provider_id, Some(11223344));
        assert_eq!(local.user_id, "athlete-7");
        assert_eq!(local.max_hr, Some(174.0));
        assert!(Uuid::parse_str(&local.id).is_ok());
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = r#"{"id": 1, "name": "Yoga", "type": "Yoga", "start_date": "2024-01-02T06:00:00Z"}"#;
        let activity: ProviderActivity = serde_json::from_str(json).unwrap();

        assert!(!activity.has_heartrate);
        assert_eq!(activity.distance, None);
        assert_eq!(activity.average_heartrate, None);
    }

    #[test]
    fn test_rejects_other_date_layouts() {
        let json = r#"{"id": 1, "name": "x", "type": "Run", "start_date": "2024-01-02 06:00:00"}"#;
        assert!(serde_json::from_str::<ProviderActivity>(json).is_err());
    }

    #[test]
    fn test_key_by_type_streams() {
        let json = r#"{
            "time": {"data": [0, 1, 2, 5], "series_type": "distance"},
            "heartrate": {"data": [92, 95, 101, 110]}
        }"#;
        let streams: StreamSet = serde_json::from_str(json).unwrap();
        let samples = streams.samples().unwrap();

        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3], HeartRateSample::new(5, 110));
    }

    #[test]
    fn test_unusable_streams_mean_no_data() {
        assert_eq!(StreamSet::new(vec![0, 1, 2], vec![100, 101]).samples(), None);
        assert_eq!(StreamSet::new(vec![], vec![]).samples(), None);
        assert_eq!(StreamSet::new(vec![0, 1], vec![]).samples(), None);

        let heartrate_only: StreamSet =
            serde_json::from_str(r#"{"heartrate": {"data": [120, 121]}}"#).unwrap();
        assert_eq!(heartrate_only.samples(), None);
    }

    #[test]
    fn test_parse_single_and_array_exports() {
        let single = format!(r#"{{"activity": {}, "streams": null}}"#, SUMMARY);
        assert_eq!(parse_exports(&single).unwrap().len(), 1);

        let many = format!(
            r#"[{{"activity": {0}}}, {{"activity": {0}, "streams": {{"time": {{"data": [0]}}, "heartrate": {{"data": [80]}}}}}}]"#,
            SUMMARY
        );
        let exports = parse_exports(&many).unwrap();
        assert_eq!(exports.len(), 2);
        assert!(exports[0].streams.is_none());
        assert_eq!(exports[1].streams.as_ref().unwrap().samples().unwrap().len(), 1);

        assert!(parse_exports("{\"nope\": 1}").is_err());
    }
}
