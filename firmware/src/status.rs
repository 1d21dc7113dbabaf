#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared counters for the firmware target.
//!
//! The detection task and the USB task update these atomics; the console reads
//! them when rendering `status` without touching the lane lock.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Sentinel stored while no ball has been scored yet.
const NO_BALL: u8 = u8::MAX;

static BALLS_DETECTED: AtomicU32 = AtomicU32::new(0);
static BALLS_IGNORED: AtomicU32 = AtomicU32::new(0);
static LAST_BALL_VALUE: AtomicU8 = AtomicU8::new(NO_BALL);
static TELEMETRY_FAULTS: AtomicU32 = AtomicU32::new(0);
static CONSOLE_ATTACHED: AtomicBool = AtomicBool::new(false);
static CONSOLE_DROPPED: AtomicU32 = AtomicU32::new(0);

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Records a scored ball.
pub fn record_ball(value: u8) {
    bump(&BALLS_DETECTED);
    LAST_BALL_VALUE.store(value, Ordering::Relaxed);
}

pub fn record_ignored() {
    bump(&BALLS_IGNORED);
}

/// Counts warning and error telemetry.
pub fn record_fault() {
    bump(&TELEMETRY_FAULTS);
}

pub fn set_console_attached(attached: bool) {
    CONSOLE_ATTACHED.store(attached, Ordering::Relaxed);
}

pub fn console_attached() -> bool {
    CONSOLE_ATTACHED.load(Ordering::Relaxed)
}

/// Counts console frames dropped because the host was not reading.
pub fn record_console_drop() {
    bump(&CONSOLE_DROPPED);
}

/// Point-in-time copy of the counters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FirmwareCounters {
    pub balls: u32,
    pub ignored: u32,
    pub last_value: Option<u8>,
    pub faults: u32,
    pub attached: bool,
    pub dropped: u32,
}

impl FirmwareCounters {
    pub fn snapshot() -> Self {
        let last = LAST_BALL_VALUE.load(Ordering::Relaxed);
        Self {
            balls: BALLS_DETECTED.load(Ordering::Relaxed),
            ignored: BALLS_IGNORED.load(Ordering::Relaxed),
            last_value: (last != NO_BALL).then_some(last),
            faults: TELEMETRY_FAULTS.load(Ordering::Relaxed),
            attached: console_attached(),
            dropped: CONSOLE_DROPPED.load(Ordering::Relaxed),
        }
    }

    /// Writes `firmware balls=3 ignored=1 last=5 faults=0 dropped=0`.
    pub fn write_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "firmware balls={} ignored={} last=", self.balls, self.ignored)?;
        match self.last_value {
            Some(value) => write!(writer, "{value}")?,
            None => writer.write_char('-')?,
        }
        write!(writer, " faults={} dropped={}", self.faults, self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_counters() {
        let counters = FirmwareCounters {
            balls: 3,
            ignored: 1,
            last_value: Some(5),
            faults: 0,
            attached: true,
            dropped: 2,
        };
        let mut line: heapless::String<64> = heapless::String::new();
        counters.write_line(&mut line).expect("line fits");
        assert_eq!(
            line.as_str(),
            "firmware balls=3 ignored=1 last=5 faults=0 dropped=2"
        );
    }

    #[test]
    fn scored_balls_update_the_snapshot() {
        let before = FirmwareCounters::snapshot();
        record_ball(7);
        let after = FirmwareCounters::snapshot();
        assert!(after.balls > before.balls);
        assert!(after.last_value.is_some());
    }
}
