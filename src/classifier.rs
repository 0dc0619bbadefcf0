//! Time-in-zone classification for a single activity.
//!
//! Each interval between consecutive samples is attributed whole to the zone
//! of the sample that ends it. There is no interpolation across a zone
//! boundary.

use crate::error::{DataIntegrityError, Result};
use crate::models::{HeartRateSample, ZoneBands, ZoneTimeRecord, ZoneTimes};
use crate::zones::ZoneCalculator;

/// Stateless time-in-zone classifier
pub struct ActivityZoneClassifier;

impl ActivityZoneClassifier {
    /// Classify a sample sequence against frozen zone bands.
    ///
    /// Sequences with fewer than two samples yield an all-zero record. A
    /// decreasing elapsed time fails with a data integrity error; samples are
    /// never re-sorted or clamped.
    pub fn classify(bands: &ZoneBands, samples: &[HeartRateSample]) -> Result<ZoneTimeRecord> {
        if samples.len() < 2 {
            return Ok(ZoneTimeRecord::empty(*bands));
        }

        let times = Self::accumulate(bands, samples)?;
        debug_assert_eq!(times.zone_sum(), times.total);

        Ok(ZoneTimeRecord::from_times(times, *bands))
    }

    fn accumulate(bands: &ZoneBands, samples: &[HeartRateSample]) -> Result<ZoneTimes> {
        let mut times = ZoneTimes::default();

        for (index, pair) in samples.windows(2).enumerate() {
            let (previous, current) = (pair[0], pair[1]);
            if current.elapsed_seconds < previous.elapsed_seconds {
                return Err(DataIntegrityError::NonMonotonicTime {
                    index: index + 1,
                    previous: previous.elapsed_seconds,
                    current: current.elapsed_seconds,
                }
                .into());
            }

            let delta = u64::from(current.elapsed_seconds - previous.elapsed_seconds);
            times.add(ZoneCalculator::zone_for(current.heart_rate, bands), delta);
        }

        Ok(times)
    }
}
