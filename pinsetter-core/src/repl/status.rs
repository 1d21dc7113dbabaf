//! Text rendering for lane status and ball events.
//!
//! [`StatusFormatter`] keeps the `status` output identical on the firmware
//! console and the emulator.

use core::fmt;
use core::time::Duration;

use crate::detection::BallEvent;
use crate::orchestrator::LaneStatus;

/// Renders a [`LaneStatus`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    status: &'a LaneStatus,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(status: &'a LaneStatus) -> Self {
        Self { status }
    }

    /// Writes the lane line (e.g. `lane initialized=true detecting=true hold=false`).
    pub fn write_lane_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "lane initialized={} detecting={} hold={}",
            self.status.initialized, self.status.detecting, self.status.suspended
        )?;
        if let Some(fault) = self.status.fault {
            write!(writer, " fault={fault}")?;
        }
        Ok(())
    }

    /// Writes the rack line (e.g. `pins standing=01111 down=lTwo`).
    pub fn write_pins_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "pins standing={} down=", self.status.control)?;
        let mut any = false;
        for pin in self.status.control.down_pins() {
            if any {
                writer.write_char(',')?;
            }
            write!(writer, "{pin}")?;
            any = true;
        }
        if !any {
            writer.write_char('-')?;
        }
        Ok(())
    }

    /// Writes the reset line (e.g. `reset needs-full=false forced=true suppression=+3.2s`).
    pub fn write_reset_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "reset needs-full={} forced={} suppression=",
            self.status.flags.needs_full_reset, self.status.flags.force_full_reset
        )?;
        match self.status.suppression_remaining {
            Some(remaining) => write_duration(writer, remaining),
            None => writer.write_str("off"),
        }
    }

    /// Writes the machine line (e.g. `machine home=B21 cycle=+8.5s detector=10/500ms`).
    pub fn write_machine_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("machine home=")?;
        match self.status.home_sensor {
            Some(channel) => write!(writer, "{channel}")?,
            None => writer.write_str("none")?,
        }
        writer.write_str(" cycle=")?;
        write_duration(writer, self.status.cycle_time)?;
        write!(
            writer,
            " detector={}/{}ms",
            self.status.threshold,
            self.status.debounce.as_millis()
        )
    }

    /// Writes the game line (e.g. `game bowler=0 frame=3 balls=5,3`).
    pub fn write_game_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match &self.status.game {
            Some(context) => write!(writer, "game {context}"),
            None => writer.write_str("game none"),
        }
    }
}

/// Writes a ball event line; `at` is the detection time relative to boot.
pub fn write_ball_event<W: fmt::Write, TInstant>(
    writer: &mut W,
    event: &BallEvent<TInstant>,
    at: Duration,
) -> fmt::Result {
    write!(
        writer,
        "ball pins={} changes={} value={} status={} ends-frame={} t={}ms",
        event.standing,
        event.changes,
        event.value,
        event.status,
        event.ends_frame,
        at.as_millis()
    )
}

#[allow(clippy::cast_possible_truncation)]
fn write_duration<W: fmt::Write>(writer: &mut W, value: Duration) -> fmt::Result {
    if value >= Duration::from_secs(1) {
        let millis = value.as_millis() as u64;
        let seconds = millis / 1_000;
        let tenths = (millis % 1_000) / 100;
        write!(writer, "+{seconds}.{tenths}s")
    } else if value >= Duration::from_millis(1) {
        write!(writer, "+{}ms", value.as_millis())
    } else {
        write!(writer, "+{}us", value.as_micros())
    }
}
