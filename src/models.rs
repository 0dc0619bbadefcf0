use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Lowest maximum heart rate accepted when a user edits their zones
pub const MIN_MAX_HR: u16 = 100;

/// Highest maximum heart rate accepted when a user edits their zones
pub const MAX_MAX_HR: u16 = 230;

/// Default zone thresholds as percent of max HR (or heart-rate reserve)
pub const DEFAULT_THRESHOLDS: [u8; 5] = [60, 70, 80, 90, 100];

/// Default zone minima for the fixed-offset method (20 bpm steps, zone 4 at 180, zone 5 at 200)
pub const DEFAULT_FIXED_CUTOFFS: [u16; 5] = [120, 140, 160, 180, 200];

/// Time-in-zone bucket. `Below` is the implicit band under zone 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKey {
    Zone1,
    Zone2,
    Zone3,
    Zone4,
    Zone5,
    Below,
}

impl ZoneKey {
    /// Every bucket, in display order
    pub const ALL: [ZoneKey; 6] = [
        ZoneKey::Zone1,
        ZoneKey::Zone2,
        ZoneKey::Zone3,
        ZoneKey::Zone4,
        ZoneKey::Zone5,
        ZoneKey::Below,
    ];

    /// The five bounded training zones, lightest first
    pub const ZONES: [ZoneKey; 5] = [
        ZoneKey::Zone1,
        ZoneKey::Zone2,
        ZoneKey::Zone3,
        ZoneKey::Zone4,
        ZoneKey::Zone5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKey::Zone1 => "zone1",
            ZoneKey::Zone2 => "zone2",
            ZoneKey::Zone3 => "zone3",
            ZoneKey::Zone4 => "zone4",
            ZoneKey::Zone5 => "zone5",
            ZoneKey::Below => "below",
        }
    }

    /// Zone number (1-5), `None` for the below-zone-1 bucket
    pub fn number(&self) -> Option<u8> {
        match self {
            ZoneKey::Zone1 => Some(1),
            ZoneKey::Zone2 => Some(2),
            ZoneKey::Zone3 => Some(3),
            ZoneKey::Zone4 => Some(4),
            ZoneKey::Zone5 => Some(5),
            ZoneKey::Below => None,
        }
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zone1" => Ok(ZoneKey::Zone1),
            "zone2" => Ok(ZoneKey::Zone2),
            "zone3" => Ok(ZoneKey::Zone3),
            "zone4" => Ok(ZoneKey::Zone4),
            "zone5" => Ok(ZoneKey::Zone5),
            "below" => Ok(ZoneKey::Below),
            _ => Err(format!("Unknown zone: {}", s)),
        }
    }
}

/// One heart-rate reading within an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Seconds since activity start
    pub elapsed_seconds: u32,

    /// Heart rate in beats per minute
    pub heart_rate: u16,
}

impl HeartRateSample {
    pub fn new(elapsed_seconds: u32, heart_rate: u16) -> Self {
        Self {
            elapsed_seconds,
            heart_rate,
        }
    }
}

impl From<(u32, u16)> for HeartRateSample {
    fn from((elapsed_seconds, heart_rate): (u32, u16)) -> Self {
        Self::new(elapsed_seconds, heart_rate)
    }
}

/// Zone boundary derivation method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneMethod {
    /// Percent of maximum heart rate
    Percentage,
    /// Percent of heart-rate reserve, offset by resting heart rate
    Karvonen,
    /// Absolute zone minima in bpm
    FixedOffset { cutoffs: [u16; 5] },
}

impl Default for ZoneMethod {
    fn default() -> Self {
        ZoneMethod::Percentage
    }
}

impl fmt::Display for ZoneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneMethod::Percentage => write!(f, "percentage"),
            ZoneMethod::Karvonen => write!(f, "karvonen"),
            ZoneMethod::FixedOffset { cutoffs } => write!(f, "fixed_offset {:?}", cutoffs),
        }
    }
}

impl FromStr for ZoneMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "percentage" | "percent" | "max_hr" => Ok(ZoneMethod::Percentage),
            "karvonen" | "hrr" => Ok(ZoneMethod::Karvonen),
            "fixed" | "fixed_offset" => Ok(ZoneMethod::FixedOffset {
                cutoffs: DEFAULT_FIXED_CUTOFFS,
            }),
            _ => Err(format!("Invalid zone method: {}", s)),
        }
    }
}

/// Per-user heart-rate zone settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfiguration {
    /// Maximum heart rate (bpm)
    pub max_hr: Option<u16>,

    /// Resting heart rate (bpm), required for Karvonen
    pub resting_hr: Option<u16>,

    /// Boundary derivation method
    #[serde(default)]
    pub method: ZoneMethod,

    /// Upper threshold of zones 1-5, in percent
    #[serde(default = "default_thresholds")]
    pub thresholds: [u8; 5],
}

fn default_thresholds() -> [u8; 5] {
    DEFAULT_THRESHOLDS
}

impl Default for ZoneConfiguration {
    fn default() -> Self {
        Self {
            max_hr: Some(180),
            resting_hr: Some(60),
            method: ZoneMethod::Percentage,
            thresholds: DEFAULT_THRESHOLDS,
        }
    }
}

impl ZoneConfiguration {
    /// Percentage-of-max configuration with default thresholds
    pub fn percentage(max_hr: u16) -> Self {
        Self {
            max_hr: Some(max_hr),
            resting_hr: None,
            method: ZoneMethod::Percentage,
            thresholds: DEFAULT_THRESHOLDS,
        }
    }

    /// Karvonen configuration with default thresholds
    pub fn karvonen(max_hr: u16, resting_hr: u16) -> Self {
        Self {
            max_hr: Some(max_hr),
            resting_hr: Some(resting_hr),
            method: ZoneMethod::Karvonen,
            thresholds: DEFAULT_THRESHOLDS,
        }
    }

    /// Range check applied when a user edits their settings.
    ///
    /// Band derivation itself only needs a positive max HR; the 100-230 bpm
    /// window guards the update path.
    pub fn validate_for_update(&self) -> Result<(), ConfigurationError> {
        let max_hr = self.max_hr.ok_or(ConfigurationError::MissingMaxHr)?;
        if !(MIN_MAX_HR..=MAX_MAX_HR).contains(&max_hr) {
            return Err(ConfigurationError::MaxHrOutOfRange {
                value: max_hr,
                min: MIN_MAX_HR,
                max: MAX_MAX_HR,
            });
        }
        Ok(())
    }
}

/// Inclusive-min / exclusive-max bpm range for one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBand {
    pub min: u16,
    pub max: u16,
}

impl ZoneBand {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }
}

/// The five contiguous zone bands derived from a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBands {
    pub zone1: ZoneBand,
    pub zone2: ZoneBand,
    pub zone3: ZoneBand,
    pub zone4: ZoneBand,
    pub zone5: ZoneBand,
}

impl ZoneBands {
    pub fn from_array(bands: [ZoneBand; 5]) -> Self {
        let [zone1, zone2, zone3, zone4, zone5] = bands;
        Self {
            zone1,
            zone2,
            zone3,
            zone4,
            zone5,
        }
    }

    pub fn to_array(&self) -> [ZoneBand; 5] {
        [self.zone1, self.zone2, self.zone3, self.zone4, self.zone5]
    }

    /// Band for a bounded zone; `None` for `Below`
    pub fn band(&self, key: ZoneKey) -> Option<ZoneBand> {
        match key {
            ZoneKey::Zone1 => Some(self.zone1),
            ZoneKey::Zone2 => Some(self.zone2),
            ZoneKey::Zone3 => Some(self.zone3),
            ZoneKey::Zone4 => Some(self.zone4),
            ZoneKey::Zone5 => Some(self.zone5),
            ZoneKey::Below => None,
        }
    }
}

/// Seconds accumulated per zone.
///
/// Missing keys in stored JSON deserialize as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneTimes {
    pub zone1: u64,
    pub zone2: u64,
    pub zone3: u64,
    pub zone4: u64,
    pub zone5: u64,
    pub below: u64,
    pub total: u64,
}

impl ZoneTimes {
    pub fn get(&self, key: ZoneKey) -> u64 {
        match key {
            ZoneKey::Zone1 => self.zone1,
            ZoneKey::Zone2 => self.zone2,
            ZoneKey::Zone3 => self.zone3,
            ZoneKey::Zone4 => self.zone4,
            ZoneKey::Zone5 => self.zone5,
            ZoneKey::Below => self.below,
        }
    }

    fn slot_mut(&mut self, key: ZoneKey) -> &mut u64 {
        match key {
            ZoneKey::Zone1 => &mut self.zone1,
            ZoneKey::Zone2 => &mut self.zone2,
            ZoneKey::Zone3 => &mut self.zone3,
            ZoneKey::Zone4 => &mut self.zone4,
            ZoneKey::Zone5 => &mut self.zone5,
            ZoneKey::Below => &mut self.below,
        }
    }

    /// Add seconds to a zone bucket and to the total. Both saturate at
    /// `u64::MAX`.
    pub fn add(&mut self, key: ZoneKey, seconds: u64) {
        let slot = self.slot_mut(key);
        *slot = slot.saturating_add(seconds);
        self.total = self.total.saturating_add(seconds);
    }

    /// Sum of the six zone buckets (ignores the stored `total`)
    pub fn zone_sum(&self) -> u64 {
        ZoneKey::ALL
            .iter()
            .fold(0u64, |sum, key| sum.saturating_add(self.get(*key)))
    }

    /// Percent of `total` per zone, rounded to one decimal.
    ///
    /// Empty when `total` is zero.
    pub fn percentages(&self) -> BTreeMap<ZoneKey, Decimal> {
        let mut percentages = BTreeMap::new();
        if self.total == 0 {
            return percentages;
        }

        let total = Decimal::from(self.total);
        for key in ZoneKey::ALL {
            let share = Decimal::from(self.get(key)) * Decimal::ONE_HUNDRED / total;
            percentages.insert(
                key,
                share.round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven),
            );
        }
        percentages
    }
}

/// Percentages are written as JSON numbers. Reading goes through the
/// `Decimal` deserializer, which takes numbers and strings alike.
mod percent_map {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::ser::{SerializeMap, Serializer};
    use std::collections::BTreeMap;

    use super::ZoneKey;

    pub fn serialize<S: Serializer>(
        percentages: &BTreeMap<ZoneKey, Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(percentages.len()))?;
        for (key, value) in percentages {
            map.serialize_entry(key, &value.to_f64().unwrap_or_default())?;
        }
        map.end()
    }
}

/// Time-in-zone result for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTimeRecord {
    /// Seconds per zone plus total
    #[serde(default)]
    pub times: ZoneTimes,

    /// Percent of total per zone
    #[serde(default, serialize_with = "percent_map::serialize")]
    pub percentages: BTreeMap<ZoneKey, Decimal>,

    /// Bands the activity was classified against
    #[serde(default)]
    pub zone_ranges: Option<ZoneBands>,
}

impl ZoneTimeRecord {
    /// All-zero record for activities with no attributable interval
    pub fn empty(bands: ZoneBands) -> Self {
        Self {
            times: ZoneTimes::default(),
            percentages: BTreeMap::new(),
            zone_ranges: Some(bands),
        }
    }

    pub fn from_times(times: ZoneTimes, bands: ZoneBands) -> Self {
        Self {
            percentages: times.percentages(),
            times,
            zone_ranges: Some(bands),
        }
    }
}

/// Zone totals across the activities of a date window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    /// Window length in days
    pub days: u32,

    /// Window start (inclusive)
    pub start: DateTime<Utc>,

    /// Window end (inclusive)
    pub end: DateTime<Utc>,

    /// Number of zone records folded into the totals
    pub activity_count: usize,

    /// Summed seconds per zone; `total` is the sum of the zone buckets
    pub times: ZoneTimes,

    /// Percent of total per zone, empty when there is no data
    #[serde(serialize_with = "percent_map::serialize")]
    pub percentages: BTreeMap<ZoneKey, Decimal>,
}

/// Locally stored activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Local identifier
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Identifier at the activity provider
    pub provider_id: Option<i64>,

    /// Activity title
    pub name: String,

    /// Sport type as reported by the provider (Run, Ride, ...)
    pub sport: String,

    /// Distance in meters
    pub distance: Option<f64>,

    /// Moving time in seconds
    pub moving_time: Option<u32>,

    /// Elapsed time in seconds
    pub elapsed_time: Option<u32>,

    /// Start of the activity (UTC)
    pub start_date: DateTime<Utc>,

    /// Average heart rate reported by the provider
    pub average_hr: Option<f64>,

    /// Maximum heart rate reported by the provider
    pub max_hr: Option<f64>,

    /// Provider reported a heart-rate stream
    pub has_heart_rate: bool,

    /// Time-in-zone result, if classified
    pub zone_record: Option<ZoneTimeRecord>,
}
