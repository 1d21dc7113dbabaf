//! Immutable lane configuration handed to the engine at startup.

use core::time::Duration;

use crate::hardware::AnalogChannel;
use crate::pins::{PIN_COUNT, PinName};

/// Default calibrated machine cycle time.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_millis(8_500);

/// Ball-entry detector tuning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectorConfig {
    /// Consecutive high samples required to confirm a ball.
    pub threshold: u16,
    /// Minimum spacing between accepted detections.
    pub debounce: Duration,
    /// Entry sensor polling period.
    pub poll_interval: Duration,
}

impl DetectorConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: 10,
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical wiring and calibration for one lane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LaneConfig {
    /// Analog channel sensing each pin, indexed by [`PinName::as_index`].
    pub pin_channels: [AnalogChannel; PIN_COUNT],
    /// Machine home-position sensor. `None` when the lane has no such sensor,
    /// in which case every position wait falls back immediately.
    pub home_sensor: Option<AnalogChannel>,
    /// Calibrated duration of one mechanical machine cycle. Reported by
    /// `status` only; cycles are timed from the home sensor.
    pub cycle_time: Duration,
    pub detector: DetectorConfig,
}

impl LaneConfig {
    /// Factory wiring: B10..B13 on the outer pins, B20 on the head pin, B21 home.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pin_channels: [
                AnalogChannel::B10,
                AnalogChannel::B11,
                AnalogChannel::B20,
                AnalogChannel::B12,
                AnalogChannel::B13,
            ],
            home_sensor: Some(AnalogChannel::B21),
            cycle_time: DEFAULT_CYCLE_TIME,
            detector: DetectorConfig::new(),
        }
    }

    #[must_use]
    pub const fn channel_for(&self, pin: PinName) -> AnalogChannel {
        self.pin_channels[pin.as_index()]
    }

    #[must_use]
    pub const fn with_home_sensor(mut self, home_sensor: Option<AnalogChannel>) -> Self {
        self.home_sensor = home_sensor;
        self
    }

    #[must_use]
    pub const fn with_cycle_time(mut self, cycle_time: Duration) -> Self {
        self.cycle_time = cycle_time;
        self
    }

    #[must_use]
    pub const fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Applies `(pin label, channel label)` pairs from lane settings.
    ///
    /// Pairs naming an unknown pin or channel are skipped; the number skipped
    /// is returned.
    pub fn apply_sensor_labels<'a, I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ignored = 0;
        for (pin, channel) in pairs {
            match (PinName::from_label(pin), AnalogChannel::from_label(channel)) {
                (Some(pin), Some(channel)) => self.pin_channels[pin.as_index()] = channel,
                _ => ignored += 1,
            }
        }
        ignored
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wiring_matches_factory_lane() {
        let config = LaneConfig::new();
        assert_eq!(config.channel_for(PinName::CenterFive), AnalogChannel::B20);
        assert_eq!(config.channel_for(PinName::RightTwo), AnalogChannel::B13);
        assert_eq!(config.home_sensor, Some(AnalogChannel::B21));
        assert_eq!(config.cycle_time, Duration::from_millis(8_500));
        assert_eq!(config.detector.threshold, 10);
    }

    #[test]
    fn sensor_labels_skip_unknown_names() {
        let mut config = LaneConfig::new();
        let ignored = config.apply_sensor_labels([
            ("lTwo", "B13"),
            ("rTwo", "B10"),
            ("kingpin", "B11"),
            ("cFive", "Z9"),
        ]);
        assert_eq!(ignored, 2);
        assert_eq!(config.channel_for(PinName::LeftTwo), AnalogChannel::B13);
        assert_eq!(config.channel_for(PinName::RightTwo), AnalogChannel::B10);
        assert_eq!(config.channel_for(PinName::CenterFive), AnalogChannel::B20);
    }

    #[test]
    fn builder_overrides_optional_capabilities() {
        let config = LaneConfig::new()
            .with_home_sensor(None)
            .with_cycle_time(Duration::from_secs(7));
        assert!(config.home_sensor.is_none());
        assert_eq!(config.cycle_time, Duration::from_secs(7));
    }
}
