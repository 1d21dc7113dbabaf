//! Embassy time source for the lane engine.
//!
//! `pinsetter-core` works in `core::time::Duration`; this module wraps
//! [`embassy_time::Instant`] so the engine can add durations to it and measure
//! elapsed time without knowing about the tick rate.

use core::ops::Add;
use core::time::Duration;

use embassy_time::{Duration as EmbassyDuration, Instant, Timer};
use pinsetter_core::hardware::Clock;
use pinsetter_core::telemetry::TelemetryInstant;

/// Monotonic instant used throughout the firmware.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    /// Time since boot.
    #[must_use]
    pub fn since_boot(self) -> Duration {
        Duration::from_micros(self.0.as_micros())
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = FirmwareInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + to_embassy(rhs))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let elapsed = self.0.saturating_duration_since(earlier.0);
        Duration::from_micros(elapsed.as_micros())
    }
}

/// Converts a core duration into embassy ticks, saturating on overflow.
#[must_use]
pub fn to_embassy(duration: Duration) -> EmbassyDuration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    EmbassyDuration::from_micros(micros)
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant(Instant::now())
    }

    async fn sleep(&self, duration: Duration) {
        Timer::after(to_embassy(duration)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_core_durations() {
        let start = FirmwareInstant::from_micros(1_000);
        let later = start + Duration::from_millis(25);
        assert_eq!(later, FirmwareInstant::from_micros(26_000));
        assert_eq!(later.since_boot(), Duration::from_micros(26_000));
    }

    #[test]
    fn elapsed_saturates_at_zero() {
        let early = FirmwareInstant::from_micros(500);
        let late = FirmwareInstant::from_micros(2_500);
        assert_eq!(
            late.saturating_duration_since(early),
            Duration::from_micros(2_000)
        );
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }
}
