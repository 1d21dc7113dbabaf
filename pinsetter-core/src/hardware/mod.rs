//! Hardware capabilities consumed by the pinsetter engine.
//!
//! The engine never touches registers. Firmware and the emulator implement
//! [`SensorBank`], [`EntrySensor`], and [`Clock`] for their platform and hand
//! the instances to the core at construction time.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use crate::pins::{ALL_PINS, PinName};
use crate::telemetry::TelemetryInstant;

/// Voltage at or above which a pin or position sensor counts as triggered.
pub const SENSOR_TRIGGER_VOLTS: f32 = 4.0;

/// Returns `true` when a reading crosses the trigger threshold.
#[must_use]
pub fn is_triggered(volts: f32) -> bool {
    volts >= SENSOR_TRIGGER_VOLTS
}

/// Board labels for the six analog sense inputs (bank digit, input digit).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AnalogChannel {
    B10,
    B11,
    B12,
    B13,
    B20,
    B21,
}

impl AnalogChannel {
    pub const ALL: [AnalogChannel; 6] = [
        AnalogChannel::B10,
        AnalogChannel::B11,
        AnalogChannel::B12,
        AnalogChannel::B13,
        AnalogChannel::B20,
        AnalogChannel::B21,
    ];

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            AnalogChannel::B10 => 0,
            AnalogChannel::B11 => 1,
            AnalogChannel::B12 => 2,
            AnalogChannel::B13 => 3,
            AnalogChannel::B20 => 4,
            AnalogChannel::B21 => 5,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            AnalogChannel::B10 => "B10",
            AnalogChannel::B11 => "B11",
            AnalogChannel::B12 => "B12",
            AnalogChannel::B13 => "B13",
            AnalogChannel::B20 => "B20",
            AnalogChannel::B21 => "B21",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for AnalogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Digital output lines driven by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OutputLine {
    /// Hold-down solenoid for a pin. Driving it low keeps the pin out of the
    /// next set.
    Solenoid(PinName),
    /// Machine reset relay, pulsed low to start a mechanical cycle.
    ResetRelay,
}

impl OutputLine {
    /// Every output line, solenoids first.
    pub const ALL: [OutputLine; 6] = [
        OutputLine::Solenoid(ALL_PINS[0].name),
        OutputLine::Solenoid(ALL_PINS[1].name),
        OutputLine::Solenoid(ALL_PINS[2].name),
        OutputLine::Solenoid(ALL_PINS[3].name),
        OutputLine::Solenoid(ALL_PINS[4].name),
        OutputLine::ResetRelay,
    ];
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLine::Solenoid(pin) => write!(f, "solenoid:{pin}"),
            OutputLine::ResetRelay => f.write_str("reset-relay"),
        }
    }
}

/// Logic level applied to an output line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

/// Errors reported by hardware capabilities.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorError {
    /// The capability failed to initialize and is running degraded.
    Unavailable,
    /// The converter or bus rejected the transfer.
    Bus,
    /// The read did not complete in time.
    Timeout,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SensorError::Unavailable => "unavailable",
            SensorError::Bus => "bus error",
            SensorError::Timeout => "timeout",
        })
    }
}

/// Analog sense inputs plus the solenoid and relay outputs.
pub trait SensorBank {
    /// Reads the voltage present on an analog channel.
    fn read_voltage(&mut self, channel: AnalogChannel) -> Result<f32, SensorError>;

    /// Drives an output line to the requested level.
    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError>;

    /// Returns every output to its idle (high) state, ignoring failures.
    fn release_all(&mut self) {
        for line in OutputLine::ALL {
            let _ = self.drive(line, Level::High);
        }
    }
}

/// Ball-entry beam at the pit end of the lane.
pub trait EntrySensor {
    fn is_high(&mut self) -> Result<bool, SensorError>;
}

/// Monotonic time source with an async delay.
#[allow(async_fn_in_trait)]
pub trait Clock {
    type Instant: Copy + Ord + Add<Duration, Output = Self::Instant> + TelemetryInstant;

    fn now(&self) -> Self::Instant;

    async fn sleep(&self, duration: Duration);

    /// Elapsed time since `earlier`, saturating at zero.
    fn elapsed_since(&self, earlier: Self::Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Reason a hardware bank failed to come up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitFault {
    AnalogFrontEnd,
    OutputDriver,
}

impl fmt::Display for InitFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitFault::AnalogFrontEnd => "analog front-end",
            InitFault::OutputDriver => "output driver",
        })
    }
}

/// A sensor bank that either initialized or is running degraded.
///
/// Degraded banks fail every read with [`SensorError::Unavailable`] and
/// silently drop writes, so the engine keeps its conservative defaults.
#[derive(Debug)]
pub enum Hardware<B> {
    Ready(B),
    Degraded(InitFault),
}

impl<B> Hardware<B> {
    /// Wraps an initialization result.
    pub fn from_init(result: Result<B, InitFault>) -> Self {
        match result {
            Ok(bank) => Hardware::Ready(bank),
            Err(fault) => Hardware::Degraded(fault),
        }
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Hardware::Ready(_))
    }

    #[must_use]
    pub const fn fault(&self) -> Option<InitFault> {
        match self {
            Hardware::Ready(_) => None,
            Hardware::Degraded(fault) => Some(*fault),
        }
    }

    pub fn bank(&self) -> Option<&B> {
        match self {
            Hardware::Ready(bank) => Some(bank),
            Hardware::Degraded(_) => None,
        }
    }

    pub fn bank_mut(&mut self) -> Option<&mut B> {
        match self {
            Hardware::Ready(bank) => Some(bank),
            Hardware::Degraded(_) => None,
        }
    }
}

impl<B: SensorBank> SensorBank for Hardware<B> {
    fn read_voltage(&mut self, channel: AnalogChannel) -> Result<f32, SensorError> {
        match self {
            Hardware::Ready(bank) => bank.read_voltage(channel),
            Hardware::Degraded(_) => Err(SensorError::Unavailable),
        }
    }

    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError> {
        match self {
            Hardware::Ready(bank) => bank.drive(line, level),
            Hardware::Degraded(_) => Ok(()),
        }
    }

    fn release_all(&mut self) {
        if let Hardware::Ready(bank) = self {
            bank.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBank(f32);

    impl SensorBank for FixedBank {
        fn read_voltage(&mut self, _: AnalogChannel) -> Result<f32, SensorError> {
            Ok(self.0)
        }

        fn drive(&mut self, _: OutputLine, _: Level) -> Result<(), SensorError> {
            Err(SensorError::Bus)
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_triggered(4.0));
        assert!(is_triggered(4.8));
        assert!(!is_triggered(3.99));
    }

    #[test]
    fn channel_labels_round_trip_case_insensitively() {
        assert_eq!(AnalogChannel::from_label("b21"), Some(AnalogChannel::B21));
        assert_eq!(AnalogChannel::from_label("B99"), None);
    }

    #[test]
    fn degraded_hardware_fails_reads_and_swallows_writes() {
        let mut hardware: Hardware<FixedBank> = Hardware::from_init(Err(InitFault::AnalogFrontEnd));
        assert!(!hardware.is_ready());
        assert_eq!(hardware.fault(), Some(InitFault::AnalogFrontEnd));
        assert_eq!(
            hardware.read_voltage(AnalogChannel::B10),
            Err(SensorError::Unavailable)
        );
        assert_eq!(hardware.drive(OutputLine::ResetRelay, Level::Low), Ok(()));
    }

    #[test]
    fn ready_hardware_forwards_to_the_bank() {
        let mut hardware = Hardware::Ready(FixedBank(4.2));
        assert_eq!(hardware.read_voltage(AnalogChannel::B20), Ok(4.2));
        assert_eq!(
            hardware.drive(OutputLine::Solenoid(PinName::LeftTwo), Level::High),
            Err(SensorError::Bus)
        );
    }
}
