//! Simulated lane hardware for the host emulator.
//!
//! Pin sensors read high while a pin is down. Releasing the reset relay sets a
//! fresh rack and starts the machine cycle; the home sensor trips once the
//! cycle has run for `home_delay`. A solenoid driven low while the rack is set
//! keeps its pin out of the set, so the sensor reads it as down.

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use pinsetter_core::config::LaneConfig;
use pinsetter_core::hardware::{
    AnalogChannel, Clock, EntrySensor, Level, OutputLine, SensorBank, SensorError,
};
use pinsetter_core::pins::{ALL_PINS, ControlMap, PIN_COUNT, PinName};

/// Voltage reported by a triggered sensor.
pub const HIGH_VOLTS: f32 = 4.7;

/// Voltage reported by an idle sensor.
pub const LOW_VOLTS: f32 = 0.2;

/// Machine cycle length until the home sensor trips.
pub const DEFAULT_HOME_DELAY: Duration = Duration::from_secs(4);

/// How the emulator clock advances.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockMode {
    /// Sleeps block the thread.
    RealTime,
    /// Sleeps advance a virtual clock instantly.
    Virtual,
}

impl ClockMode {
    pub fn label(self) -> &'static str {
        match self {
            ClockMode::RealTime => "real-time",
            ClockMode::Virtual => "virtual",
        }
    }
}

/// Host clock measuring time since the session started.
#[derive(Clone)]
pub struct HostClock {
    started: Instant,
    skew: Rc<Cell<Duration>>,
    mode: ClockMode,
}

impl HostClock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            started: Instant::now(),
            skew: Rc::new(Cell::new(Duration::ZERO)),
            mode,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }
}

impl Clock for HostClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        match self.mode {
            ClockMode::RealTime => self.started.elapsed() + self.skew.get(),
            ClockMode::Virtual => self.skew.get(),
        }
    }

    async fn sleep(&self, duration: Duration) {
        match self.mode {
            ClockMode::RealTime => thread::sleep(duration),
            ClockMode::Virtual => self.skew.set(self.skew.get() + duration),
        }
    }
}

/// Pin deck, machine and solenoids of one emulated lane.
pub struct SimulatedLane {
    clock: HostClock,
    config: LaneConfig,
    /// Indexed by [`PinName::as_index`]; `true` while the pin is down.
    down: [bool; PIN_COUNT],
    home_delay: Duration,
    relay_low: bool,
    home_at: Option<Duration>,
    pub resets: u32,
}

impl SimulatedLane {
    /// A standing rack with the machine parked at home.
    pub fn new(clock: HostClock, config: LaneConfig, home_delay: Duration) -> Self {
        Self {
            clock,
            config,
            down: [false; PIN_COUNT],
            home_delay,
            relay_low: false,
            home_at: Some(Duration::ZERO),
            resets: 0,
        }
    }

    /// Knocks down every pin marked in `knocked`. Returns the pins that fell.
    pub fn knock(&mut self, knocked: &[PinName]) -> usize {
        let mut fell = 0;
        for pin in knocked {
            let slot = &mut self.down[pin.as_index()];
            if !*slot {
                *slot = true;
                fell += 1;
            }
        }
        fell
    }

    /// Pins as the deck holds them (1 = standing).
    pub fn deck(&self) -> ControlMap {
        let mut bits = [0; PIN_COUNT];
        for (bit, down) in bits.iter_mut().zip(self.down) {
            *bit = u8::from(!down);
        }
        ControlMap::from_bits(bits)
    }

    pub fn is_home(&self) -> bool {
        self.home_at.is_some_and(|at| self.clock.now() >= at)
    }

    fn pin_on(&self, channel: AnalogChannel) -> Option<PinName> {
        ALL_PINS
            .iter()
            .map(|pin| pin.name)
            .find(|pin| self.config.channel_for(*pin) == channel)
    }

    fn volts(triggered: bool) -> f32 {
        if triggered { HIGH_VOLTS } else { LOW_VOLTS }
    }
}

impl SensorBank for SimulatedLane {
    fn read_voltage(&mut self, channel: AnalogChannel) -> Result<f32, SensorError> {
        if self.config.home_sensor == Some(channel) {
            return Ok(Self::volts(self.is_home()));
        }
        let down = self
            .pin_on(channel)
            .is_some_and(|pin| self.down[pin.as_index()]);
        Ok(Self::volts(down))
    }

    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError> {
        match (line, level) {
            (OutputLine::ResetRelay, Level::Low) => {
                self.relay_low = true;
                self.home_at = None;
            }
            (OutputLine::ResetRelay, Level::High) if self.relay_low => {
                self.relay_low = false;
                self.resets += 1;
                self.down = [false; PIN_COUNT];
                self.home_at = Some(self.clock.now() + self.home_delay);
            }
            (OutputLine::Solenoid(pin), Level::Low) => self.down[pin.as_index()] = true,
            _ => {}
        }
        Ok(())
    }
}

/// Entry beam broken for a fixed number of samples, as by one rolling ball.
pub struct BeamPulse {
    remaining: u16,
}

impl BeamPulse {
    pub fn new(samples: u16) -> Self {
        Self { remaining: samples }
    }

    pub fn is_spent(&self) -> bool {
        self.remaining == 0
    }
}

impl EntrySensor for BeamPulse {
    fn is_high(&mut self) -> Result<bool, SensorError> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.remaining -= 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;

    fn lane() -> (HostClock, SimulatedLane) {
        let clock = HostClock::new(ClockMode::Virtual);
        let lane = SimulatedLane::new(clock.clone(), LaneConfig::new(), DEFAULT_HOME_DELAY);
        (clock, lane)
    }

    #[test]
    fn virtual_clock_only_moves_on_sleep() {
        let clock = HostClock::new(ClockMode::Virtual);
        assert_eq!(clock.now(), Duration::ZERO);
        block_on(clock.sleep(Duration::from_millis(250)));
        assert_eq!(clock.now(), Duration::from_millis(250));
    }

    #[test]
    fn knocked_pins_read_high_on_their_channel() {
        let (_, mut lane) = lane();
        assert_eq!(lane.knock(&[PinName::CenterFive, PinName::CenterFive]), 1);

        let head = lane.read_voltage(AnalogChannel::B20).expect("read");
        let corner = lane.read_voltage(AnalogChannel::B10).expect("read");
        assert!(head > 4.0);
        assert!(corner < 1.0);
        assert_eq!(lane.deck(), ControlMap::from_bits([1, 1, 0, 1, 1]));
    }

    #[test]
    fn relay_release_sets_a_rack_and_homes_later() {
        let (clock, mut lane) = lane();
        lane.knock(&[PinName::LeftTwo, PinName::RightTwo]);
        assert!(lane.is_home());

        lane.drive(OutputLine::ResetRelay, Level::Low).expect("drive");
        assert!(!lane.is_home());
        lane.drive(OutputLine::ResetRelay, Level::High).expect("drive");
        assert_eq!(lane.deck(), ControlMap::all_standing());
        assert_eq!(lane.resets, 1);

        block_on(clock.sleep(DEFAULT_HOME_DELAY - Duration::from_millis(1)));
        assert!(lane.read_voltage(AnalogChannel::B21).expect("read") < 1.0);
        block_on(clock.sleep(Duration::from_millis(1)));
        assert!(lane.read_voltage(AnalogChannel::B21).expect("read") > 4.0);
    }

    #[test]
    fn held_solenoid_keeps_the_pin_out_of_the_set() {
        let (_, mut lane) = lane();
        lane.drive(OutputLine::Solenoid(PinName::LeftThree), Level::Low)
            .expect("drive");
        lane.drive(OutputLine::Solenoid(PinName::LeftThree), Level::High)
            .expect("drive");
        assert_eq!(lane.deck(), ControlMap::from_bits([1, 0, 1, 1, 1]));
    }

    #[test]
    fn beam_pulse_runs_out() {
        let mut beam = BeamPulse::new(2);
        assert_eq!(beam.is_high(), Ok(true));
        assert_eq!(beam.is_high(), Ok(true));
        assert!(beam.is_spent());
        assert_eq!(beam.is_high(), Ok(false));
    }
}
