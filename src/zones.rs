use crate::error::{ConfigurationError, Result};
use crate::models::{ZoneBand, ZoneBands, ZoneConfiguration, ZoneKey, ZoneMethod};

/// Width in percent of the synthetic band under the zone 1 threshold
const ZONE1_SPAN_PERCENT: u8 = 10;

/// A way of turning a zone configuration into five contiguous bands
pub trait BandStrategy {
    /// Derive zone bands from the configuration
    fn derive_bands(&self, config: &ZoneConfiguration) -> Result<ZoneBands>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Zone boundaries as a percent of maximum heart rate
///
/// - Z1: (T1 - 10)% .. T1% of max HR
/// - Zk: T(k-1)% .. Tk% of max HR
/// - Z5 upper bound is max HR itself
pub struct PercentageOfMax;

/// Karvonen: Target HR = ((HRmax - HRrest) x %Intensity) + HRrest
pub struct HeartRateReserve;

/// Fixed absolute zone minima, independent of thresholds
pub struct FixedCutoffs {
    pub cutoffs: [u16; 5],
}

impl BandStrategy for PercentageOfMax {
    fn derive_bands(&self, config: &ZoneConfiguration) -> Result<ZoneBands> {
        let max_hr = ZoneCalculator::require_max_hr(config)?;
        ZoneCalculator::validate_thresholds(&config.thresholds)?;

        let bound = |percent: u8| (u32::from(max_hr) * u32::from(percent) / 100) as u16;
        Ok(ZoneCalculator::bands_from_thresholds(&config.thresholds, max_hr, bound))
    }

    fn name(&self) -> &'static str {
        "percentage"
    }
}

impl BandStrategy for HeartRateReserve {
    fn derive_bands(&self, config: &ZoneConfiguration) -> Result<ZoneBands> {
        let max_hr = ZoneCalculator::require_max_hr(config)?;
        let resting_hr = config.resting_hr.ok_or(ConfigurationError::MissingRestingHr)?;
        if resting_hr >= max_hr {
            return Err(ConfigurationError::RestingHrNotBelowMax {
                resting: resting_hr,
                max: max_hr,
            }
            .into());
        }
        ZoneCalculator::validate_thresholds(&config.thresholds)?;

        let reserve = u32::from(max_hr - resting_hr);
        let bound =
            |percent: u8| resting_hr + (reserve * u32::from(percent) / 100) as u16;
        Ok(ZoneCalculator::bands_from_thresholds(&config.thresholds, max_hr, bound))
    }

    fn name(&self) -> &'static str {
        "karvonen"
    }
}

impl BandStrategy for FixedCutoffs {
    fn derive_bands(&self, config: &ZoneConfiguration) -> Result<ZoneBands> {
        let max_hr = ZoneCalculator::require_max_hr(config)?;
        let cutoffs = self.cutoffs;
        if cutoffs.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigurationError::CutoffsNotIncreasing { cutoffs }.into());
        }

        // Zone 5 stays open-ended above its floor even when max HR is lower
        Ok(ZoneBands::from_array([
            ZoneBand::new(cutoffs[0], cutoffs[1]),
            ZoneBand::new(cutoffs[1], cutoffs[2]),
            ZoneBand::new(cutoffs[2], cutoffs[3]),
            ZoneBand::new(cutoffs[3], cutoffs[4]),
            ZoneBand::new(cutoffs[4], max_hr.max(cutoffs[4])),
        ]))
    }

    fn name(&self) -> &'static str {
        "fixed_offset"
    }
}

/// Zone boundary derivation and lookup
pub struct ZoneCalculator;

impl ZoneCalculator {
    /// Strategy implementing the configured method
    pub fn strategy(method: &ZoneMethod) -> Box<dyn BandStrategy> {
        match method {
            ZoneMethod::Percentage => Box::new(PercentageOfMax),
            ZoneMethod::Karvonen => Box::new(HeartRateReserve),
            ZoneMethod::FixedOffset { cutoffs } => Box::new(FixedCutoffs { cutoffs: *cutoffs }),
        }
    }

    /// Derive the five zone bands for a configuration.
    ///
    /// Fails with a configuration error when max HR is missing, when Karvonen
    /// lacks a usable resting HR, or when the thresholds would produce an
    /// empty zone.
    pub fn derive_bands(config: &ZoneConfiguration) -> Result<ZoneBands> {
        let strategy = Self::strategy(&config.method);
        let bands = strategy.derive_bands(config)?;
        Self::check_ordering(&bands)?;

        tracing::debug!(
            method = strategy.name(),
            zone1_min = bands.zone1.min,
            zone5_min = bands.zone5.min,
            zone5_max = bands.zone5.max,
            "Derived zone bands"
        );
        Ok(bands)
    }

    /// Zone for a heart rate using half-open bands: [zone_k.min, zone_{k+1}.min)
    pub fn zone_for(hr: u16, bands: &ZoneBands) -> ZoneKey {
        if hr < bands.zone1.min {
            ZoneKey::Below
        } else if hr < bands.zone2.min {
            ZoneKey::Zone1
        } else if hr < bands.zone3.min {
            ZoneKey::Zone2
        } else if hr < bands.zone4.min {
            ZoneKey::Zone3
        } else if hr < bands.zone5.min {
            ZoneKey::Zone4
        } else {
            ZoneKey::Zone5
        }
    }

    // Helper methods for calculations and validation

    fn bands_from_thresholds<F>(thresholds: &[u8; 5], max_hr: u16, bound: F) -> ZoneBands
    where
        F: Fn(u8) -> u16,
    {
        let floor = thresholds[0] - ZONE1_SPAN_PERCENT;
        let edges = [
            bound(floor),
            bound(thresholds[0]),
            bound(thresholds[1]),
            bound(thresholds[2]),
            bound(thresholds[3]),
        ];

        ZoneBands::from_array([
            ZoneBand::new(edges[0], edges[1]),
            ZoneBand::new(edges[1], edges[2]),
            ZoneBand::new(edges[2], edges[3]),
            ZoneBand::new(edges[3], edges[4]),
            ZoneBand::new(edges[4], max_hr),
        ])
    }

    fn require_max_hr(config: &ZoneConfiguration) -> Result<u16> {
        match config.max_hr {
            None => Err(ConfigurationError::MissingMaxHr.into()),
            Some(0) => Err(ConfigurationError::NonPositiveMaxHr.into()),
            Some(max_hr) => Ok(max_hr),
        }
    }

    fn validate_thresholds(thresholds: &[u8; 5]) -> Result<()> {
        for (index, &value) in thresholds.iter().enumerate() {
            if !(ZONE1_SPAN_PERCENT..=100).contains(&value) {
                return Err(ConfigurationError::ThresholdOutOfRange {
                    zone: index as u8 + 1,
                    value,
                }
                .into());
            }
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigurationError::ThresholdsNotIncreasing {
                thresholds: *thresholds,
            }
            .into());
        }
        Ok(())
    }

    /// Zones 1-4 must be non-empty; zone 5 may collapse onto max HR
    fn check_ordering(bands: &ZoneBands) -> Result<()> {
        let all = bands.to_array();
        for (index, band) in all.iter().enumerate().take(4) {
            if band.min >= band.max {
                return Err(ConfigurationError::DegenerateBand {
                    zone: index as u8 + 1,
                    min: band.min,
                    max: band.max,
                }
                .into());
            }
        }
        if all[4].min > all[4].max {
            return Err(ConfigurationError::DegenerateBand {
                zone: 5,
                min: all[4].min,
                max: all[4].max,
            }
            .into());
        }
        Ok(())
    }
}

/// Sex used by the age-based max HR estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            _ => Err(format!("Invalid sex: {}", s)),
        }
    }
}

/// Threshold estimation utilities
pub struct ThresholdEstimator;

impl ThresholdEstimator {
    /// Estimate max heart rate from age (220 - age, or 226 - age for women)
    pub fn estimate_max_hr_from_age(age: u8, sex: Sex) -> Result<u16> {
        if !(10..=100).contains(&age) {
            return Err(crate::error::ZoneTrackError::Validation(format!(
                "Age must be between 10 and 100, got {}",
                age
            )));
        }
        let base: u16 = match sex {
            Sex::Male => 220,
            Sex::Female => 226,
        };
        Ok(base - u16::from(age))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZoneTrackError;
    use crate::models::DEFAULT_FIXED_CUTOFFS;
    use proptest::prelude::*;

    fn config_error(result: Result<ZoneBands>) -> ConfigurationError {
        match result {
            Err(ZoneTrackError::Configuration(err)) => err,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_percentage_zones_max_hr_200() {
        let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::percentage(200)).unwrap();

        assert_eq!(bands.zone1, ZoneBand::new(100, 120)); // 50% .. 60%
        assert_eq!(bands.zone2, ZoneBand::new(120, 140));
        assert_eq!(bands.zone3, ZoneBand::new(140, 160));
        assert_eq!(bands.zone4, ZoneBand::new(160, 180));
        assert_eq!(bands.zone5, ZoneBand::new(180, 200));
    }

    #[test]
    fn test_percentage_zones_floor() {
        let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::percentage(187)).unwrap();

        assert_eq!(bands.zone1.min, 93); // 187 * 0.5 = 93.5 -> 93
        assert_eq!(bands.zone1.max, 112); // 187 * 0.6 = 112.2 -> 112
        assert_eq!(bands.zone2.max, 130); // 187 * 0.7 = 130.9 -> 130
        assert_eq!(bands.zone3.max, 149); // 187 * 0.8 = 149.6 -> 149
        assert_eq!(bands.zone4.max, 168); // 187 * 0.9 = 168.3 -> 168
        assert_eq!(bands.zone5.max, 187);
    }

    #[test]
    fn test_karvonen_zones() {
        let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::karvonen(190, 50)).unwrap();

        // HRR = 140
        assert_eq!(bands.zone1, ZoneBand::new(120, 134)); // 50 + 70, 50 + 84
        assert_eq!(bands.zone2, ZoneBand::new(134, 148));
        assert_eq!(bands.zone3, ZoneBand::new(148, 162));
        assert_eq!(bands.zone4, ZoneBand::new(162, 176));
        assert_eq!(bands.zone5, ZoneBand::new(176, 190));
    }

    #[test]
    fn test_karvonen_floor() {
        let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::karvonen(183, 57)).unwrap();

        // HRR = 126; 126 * 0.5 = 63, 126 * 0.6 = 75.6 -> 75
        assert_eq!(bands.zone1, ZoneBand::new(120, 132));
        assert_eq!(bands.zone2.max, 145); // 57 + 88.2
        assert_eq!(bands.zone5, ZoneBand::new(170, 183)); // 57 + 113.4
    }

    #[test]
    fn test_fixed_offset_zones() {
        let config = ZoneConfiguration {
            method: ZoneMethod::FixedOffset {
                cutoffs: DEFAULT_FIXED_CUTOFFS,
            },
            ..ZoneConfiguration::percentage(190)
        };
        let bands = ZoneCalculator::derive_bands(&config).unwrap();

        assert_eq!(bands.zone1, ZoneBand::new(120, 140));
        assert_eq!(bands.zone4, ZoneBand::new(180, 200));
        // max HR below the zone 5 floor keeps zone 5 anchored at its floor
        assert_eq!(bands.zone5, ZoneBand::new(200, 200));

        let config = ZoneConfiguration {
            max_hr: Some(215),
            ..config
        };
        let bands = ZoneCalculator::derive_bands(&config).unwrap();
        assert_eq!(bands.zone5, ZoneBand::new(200, 215));
    }

    #[test]
    fn test_custom_thresholds() {
        let config = ZoneConfiguration {
            thresholds: [55, 65, 75, 85, 95],
            ..ZoneConfiguration::percentage(200)
        };
        let bands = ZoneCalculator::derive_bands(&config).unwrap();
        assert_eq!(bands.zone1, ZoneBand::new(90, 110));
        assert_eq!(bands.zone5, ZoneBand::new(170, 200));
    }

    #[test]
    fn test_missing_max_hr() {
        let mut config = ZoneConfiguration::default();
        config.max_hr = None;
        assert_eq!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::MissingMaxHr
        );

        config.max_hr = Some(0);
        assert_eq!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::NonPositiveMaxHr
        );
    }

    #[test]
    fn test_karvonen_resting_hr_errors() {
        let mut config = ZoneConfiguration::karvonen(180, 60);
        config.resting_hr = None;
        assert_eq!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::MissingRestingHr
        );

        config.resting_hr = Some(180);
        assert_eq!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::RestingHrNotBelowMax {
                resting: 180,
                max: 180
            }
        );
    }

    #[test]
    fn test_percentage_ignores_missing_resting_hr() {
        let config = ZoneConfiguration {
            resting_hr: None,
            ..ZoneConfiguration::default()
        };
        assert!(ZoneCalculator::derive_bands(&config).is_ok());
    }

    #[test]
    fn test_invalid_thresholds() {
        let config = ZoneConfiguration {
            thresholds: [60, 70, 70, 90, 100],
            ..ZoneConfiguration::default()
        };
        assert!(matches!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::ThresholdsNotIncreasing { .. }
        ));

        let config = ZoneConfiguration {
            thresholds: [5, 70, 80, 90, 100],
            ..ZoneConfiguration::default()
        };
        assert_eq!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::ThresholdOutOfRange { zone: 1, value: 5 }
        );
    }

    #[test]
    fn test_degenerate_karvonen_band() {
        // HRR of 2 bpm cannot separate 10-percent steps
        let config = ZoneConfiguration::karvonen(102, 100);
        assert!(matches!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::DegenerateBand { zone: 1, .. }
        ));
    }

    #[test]
    fn test_invalid_fixed_cutoffs() {
        let config = ZoneConfiguration {
            method: ZoneMethod::FixedOffset {
                cutoffs: [120, 140, 140, 180, 200],
            },
            ..ZoneConfiguration::default()
        };
        assert!(matches!(
            config_error(ZoneCalculator::derive_bands(&config)),
            ConfigurationError::CutoffsNotIncreasing { .. }
        ));
    }

    #[test]
    fn test_zone_lookup_half_open() {
        let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::percentage(200)).unwrap();

        assert_eq!(ZoneCalculator::zone_for(99, &bands), ZoneKey::Below);
        assert_eq!(ZoneCalculator::zone_for(100, &bands), ZoneKey::Zone1);
        assert_eq!(ZoneCalculator::zone_for(119, &bands), ZoneKey::Zone1);
        assert_eq!(ZoneCalculator::zone_for(120, &bands), ZoneKey::Zone2);
        assert_eq!(ZoneCalculator::zone_for(159, &bands), ZoneKey::Zone3);
        assert_eq!(ZoneCalculator::zone_for(160, &bands), ZoneKey::Zone4);
        assert_eq!(ZoneCalculator::zone_for(180, &bands), ZoneKey::Zone5);
        assert_eq!(ZoneCalculator::zone_for(240, &bands), ZoneKey::Zone5);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(ZoneCalculator::strategy(&ZoneMethod::Percentage).name(), "percentage");
        assert_eq!(ZoneCalculator::strategy(&ZoneMethod::Karvonen).name(), "karvonen");
    }

    #[test]
    fn test_max_hr_estimate() {
        assert_eq!(ThresholdEstimator::estimate_max_hr_from_age(30, Sex::Male).unwrap(), 190);
        assert_eq!(ThresholdEstimator::estimate_max_hr_from_age(30, Sex::Female).unwrap(), 196);
        assert!(ThresholdEstimator::estimate_max_hr_from_age(5, Sex::Male).is_err());
        assert_eq!("F".parse::<Sex>().unwrap(), Sex::Female);
    }

    proptest! {
        #[test]
        fn test_percentage_bands_contiguous(max_hr in 100u16..=230u16) {
            let bands = ZoneCalculator::derive_bands(&ZoneConfiguration::percentage(max_hr)).unwrap();
            let all = bands.to_array();

            prop_assert!(all[0].min < all[0].max);
            for k in 0..4 {
                prop_assert_eq!(all[k].max, all[k + 1].min);
                prop_assert!(all[k].min < all[k].max);
            }
            prop_assert!(all[4].min <= all[4].max);
            prop_assert_eq!(all[4].max, max_hr);
        }

        #[test]
        fn test_karvonen_bands_contiguous(max_hr in 100u16..=230u16, resting in 30u16..90u16) {
            let config = ZoneConfiguration::karvonen(max_hr, resting);
            let bands = ZoneCalculator::derive_bands(&config).unwrap();
            let all = bands.to_array();

            for k in 0..4 {
                prop_assert_eq!(all[k].max, all[k + 1].min);
                prop_assert!(all[k].min < all[k].max);
            }
            prop_assert!(all[0].min >= resting);
            prop_assert_eq!(all[4].max, max_hr);
        }

        #[test]
        fn test_valid_configs_never_produce_empty_low_zones(
            max_hr in 100u16..=230u16,
            start in 10u8..=60u8,
            step in 5u8..=10u8,
        ) {
            let thresholds = [start, start + step, start + 2 * step, start + 3 * step, start + 4 * step];
            let config = ZoneConfiguration {
                thresholds,
                ..ZoneConfiguration::percentage(max_hr)
            };
            match ZoneCalculator::derive_bands(&config) {
                Ok(bands) => {
                    let all = bands.to_array();
                    for k in 0..4 {
                        prop_assert_eq!(all[k].max, all[k + 1].min);
                    }
                }
                Err(err) => prop_assert!(matches!(err, ZoneTrackError::Configuration(_))),
            }
        }
    }
}
