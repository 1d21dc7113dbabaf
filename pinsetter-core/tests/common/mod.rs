#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use pinsetter_core::config::LaneConfig;
use pinsetter_core::hardware::{
    AnalogChannel, Clock, EntrySensor, Hardware, Level, OutputLine, SensorBank, SensorError,
};
use pinsetter_core::orchestrator::PinsetterCore;
use pinsetter_core::pins::PinName;
use pinsetter_core::telemetry::TelemetryRecorder;

pub const HIGH_VOLTS: f32 = 4.6;
pub const LOW_VOLTS: f32 = 0.3;

/// Virtual clock; sleeping advances time instantly.
#[derive(Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<Duration>>,
}

impl MockClock {
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for MockClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.now.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// One recorded output write.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Drive {
    pub at: Duration,
    pub line: OutputLine,
    pub level: Level,
}

/// Scripted lane hardware.
pub struct MockLane {
    clock: MockClock,
    /// Absolute time at which each analog channel starts reading high.
    high_from: [Option<Duration>; 6],
    failing_channels: Vec<AnalogChannel>,
    failing_outputs: Vec<OutputLine>,
    /// Home sensor trips this long after the reset relay is released.
    home_after_reset: Option<Duration>,
    relay_released_at: Option<Duration>,
    pub drives: Vec<Drive>,
    pub reads: usize,
}

impl MockLane {
    pub fn new(clock: &MockClock) -> Self {
        Self {
            clock: clock.clone(),
            high_from: [None; 6],
            failing_channels: Vec::new(),
            failing_outputs: Vec::new(),
            home_after_reset: Some(Duration::from_secs(4)),
            relay_released_at: None,
            drives: Vec::new(),
            reads: 0,
        }
    }

    /// Pin sensor for `pin` goes high `after` from now.
    pub fn knock(mut self, pin: PinName, after: Duration) -> Self {
        let channel = LaneConfig::new().channel_for(pin);
        self.high_from[channel.as_index()] = Some(self.clock.now() + after);
        self
    }

    pub fn knock_all(self, after: Duration) -> Self {
        [
            PinName::LeftTwo,
            PinName::LeftThree,
            PinName::CenterFive,
            PinName::RightThree,
            PinName::RightTwo,
        ]
        .into_iter()
        .fold(self, |lane, pin| lane.knock(pin, after))
    }

    /// Clears every scripted pin fall, as if the machine set a fresh rack.
    pub fn stand_rack(&mut self) {
        for slot in &mut self.high_from[..5] {
            *slot = None;
        }
    }

    pub fn home_after_reset(mut self, delay: Option<Duration>) -> Self {
        self.home_after_reset = delay;
        self
    }

    pub fn failing_channel(mut self, channel: AnalogChannel) -> Self {
        self.failing_channels.push(channel);
        self
    }

    pub fn failing_output(mut self, line: OutputLine) -> Self {
        self.failing_outputs.push(line);
        self
    }

    /// Every write to `line` at `level`, in order.
    pub fn writes(&self, line: OutputLine, level: Level) -> Vec<Duration> {
        self.drives
            .iter()
            .filter(|drive| drive.line == line && drive.level == level)
            .map(|drive| drive.at)
            .collect()
    }

    /// Lines driven low at least once.
    pub fn lines_driven_low(&self) -> Vec<OutputLine> {
        let mut lines: Vec<OutputLine> = Vec::new();
        for drive in &self.drives {
            if drive.level == Level::Low && !lines.contains(&drive.line) {
                lines.push(drive.line);
            }
        }
        lines
    }

    /// How long `line` was held low by its first low pulse.
    pub fn first_low_pulse(&self, line: OutputLine) -> Option<Duration> {
        let start = self
            .drives
            .iter()
            .position(|drive| drive.line == line && drive.level == Level::Low)?;
        let low = self.drives[start].at;
        let high = self.drives[start + 1..]
            .iter()
            .find(|drive| drive.line == line && drive.level == Level::High)?;
        Some(high.at - low)
    }
}

impl SensorBank for MockLane {
    fn read_voltage(&mut self, channel: AnalogChannel) -> Result<f32, SensorError> {
        self.reads += 1;
        if self.failing_channels.contains(&channel) {
            return Err(SensorError::Bus);
        }

        let now = self.clock.now();
        if channel == AnalogChannel::B21 {
            let home = match (self.home_after_reset, self.relay_released_at) {
                (Some(delay), Some(released)) => now >= released + delay,
                _ => false,
            };
            return Ok(if home { HIGH_VOLTS } else { LOW_VOLTS });
        }

        let high = self.high_from[channel.as_index()].is_some_and(|from| now >= from);
        Ok(if high { HIGH_VOLTS } else { LOW_VOLTS })
    }

    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError> {
        let at = self.clock.now();
        self.drives.push(Drive { at, line, level });
        if self.failing_outputs.contains(&line) {
            return Err(SensorError::Bus);
        }
        if line == OutputLine::ResetRelay && level == Level::High {
            self.relay_released_at = Some(at);
        }
        Ok(())
    }
}

/// Entry beam that reads high for a fixed number of samples.
pub struct ScriptedEntry {
    pub highs_remaining: u32,
    pub samples: Rc<Cell<u32>>,
}

impl ScriptedEntry {
    pub fn new(highs: u32) -> Self {
        Self {
            highs_remaining: highs,
            samples: Rc::new(Cell::new(0)),
        }
    }
}

impl EntrySensor for ScriptedEntry {
    fn is_high(&mut self) -> Result<bool, SensorError> {
        self.samples.set(self.samples.get() + 1);
        if self.highs_remaining == 0 {
            return Ok(false);
        }
        self.highs_remaining -= 1;
        Ok(true)
    }
}

pub type TestLane = PinsetterCore<MockLane, MockClock, TelemetryRecorder<Duration>>;

pub fn lane(bank: MockLane, clock: &MockClock) -> TestLane {
    lane_with_config(bank, clock, LaneConfig::new())
}

pub fn lane_with_config(bank: MockLane, clock: &MockClock, config: LaneConfig) -> TestLane {
    PinsetterCore::new(
        Hardware::Ready(bank),
        clock.clone(),
        config,
        TelemetryRecorder::new(),
    )
}

pub fn bank(lane: &TestLane) -> &MockLane {
    lane.hardware().bank().expect("mock lane is ready")
}

pub fn bank_mut(lane: &mut TestLane) -> &mut MockLane {
    lane.hardware_mut().bank_mut().expect("mock lane is ready")
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
