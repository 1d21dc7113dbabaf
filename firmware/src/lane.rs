//! Lane ownership shared by the detection and console tasks.
//!
//! The engine lives behind one async [`Mutex`]. The detection loop takes it for
//! the length of a throw cycle through [`SharedLane`]; the console takes it for
//! commands that need the rack. Ball events go back to the host through
//! [`ConsoleSink`].

use core::fmt::Write as _;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::mutex::Mutex;
use heapless::String;
use pinsetter_core::detection::{BallEvent, BallEventSink, LaneHandle};
use pinsetter_core::hardware::SensorBank;
use pinsetter_core::orchestrator::{PinsetterCore, ThrowOutcome};
use pinsetter_core::repl::status::write_ball_event;

use crate::clock::{EmbassyClock, FirmwareInstant};
use crate::repl::{self, ReplSender};
use crate::status;
use crate::telemetry::FirmwareTelemetry;

#[cfg(target_os = "none")]
pub type LaneMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type LaneMutex = NoopRawMutex;

/// Engine instance bound to the firmware clock and telemetry.
pub type FirmwareLane<B> = PinsetterCore<B, EmbassyClock, FirmwareTelemetry>;

/// Lock guarding the engine.
pub type LaneCell<B> = Mutex<LaneMutex, FirmwareLane<B>>;

/// [`LaneHandle`] that holds the lane lock for one throw cycle.
pub struct SharedLane<'a, B> {
    cell: &'a LaneCell<B>,
}

impl<'a, B> SharedLane<'a, B> {
    pub const fn new(cell: &'a LaneCell<B>) -> Self {
        Self { cell }
    }
}

impl<B: SensorBank> LaneHandle for SharedLane<'_, B> {
    async fn process_throw(&mut self) -> ThrowOutcome {
        let mut lane = self.cell.lock().await;
        lane.process_throw().await
    }
}

/// Line length of a rendered ball event.
const EVENT_LINE_LEN: usize = 96;

/// Publishes ball events to the console and the status counters.
pub struct ConsoleSink<'a> {
    sender: ReplSender<'a, LaneMutex>,
}

impl<'a> ConsoleSink<'a> {
    pub const fn new(sender: ReplSender<'a, LaneMutex>) -> Self {
        Self { sender }
    }

    fn publish(&self, line: &str) {
        if !status::console_attached() {
            return;
        }
        if !repl::try_send_text(&self.sender, line) {
            status::record_console_drop();
        }
    }
}

impl BallEventSink<FirmwareInstant> for ConsoleSink<'_> {
    fn ball_detected(&mut self, event: &BallEvent<FirmwareInstant>) {
        status::record_ball(event.value);
        log_ball(event);

        let mut line: String<EVENT_LINE_LEN> = String::new();
        if write_ball_event(&mut line, event, event.detected_at.since_boot()).is_ok() {
            self.publish(&line);
        }
    }

    fn ball_ignored(&mut self, at: FirmwareInstant) {
        status::record_ignored();
        log_ignored(at);
    }
}

#[cfg(target_os = "none")]
fn log_ball(event: &BallEvent<FirmwareInstant>) {
    defmt::info!(
        "detect: ball value={=u8} status={} ends_frame={} t={}us",
        event.value,
        defmt::Display2Format(&event.status),
        event.ends_frame,
        event.detected_at.into_embassy().as_micros()
    );
}

#[cfg(not(target_os = "none"))]
fn log_ball(event: &BallEvent<FirmwareInstant>) {
    println!(
        "detect: ball value={} status={} ends_frame={} t={}us",
        event.value,
        event.status,
        event.ends_frame,
        event.detected_at.into_embassy().as_micros()
    );
}

#[cfg(target_os = "none")]
fn log_ignored(at: FirmwareInstant) {
    defmt::warn!(
        "detect: ignored confirmation inside debounce t={}us",
        at.into_embassy().as_micros()
    );
}

#[cfg(not(target_os = "none"))]
fn log_ignored(at: FirmwareInstant) {
    println!(
        "detect: ignored confirmation inside debounce t={}us",
        at.into_embassy().as_micros()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::ReplQueue;
    use pinsetter_core::pins::{ChangeVector, ControlMap, PinName, ScanStatus};

    fn event() -> BallEvent<FirmwareInstant> {
        BallEvent {
            standing: ControlMap::all_standing().with_down(PinName::RightTwo),
            changes: ChangeVector::from_bits([0, 0, 0, 0, 1]),
            status: ScanStatus::PartialChange,
            value: 2,
            ends_frame: false,
            detected_at: FirmwareInstant::from_micros(12_000),
        }
    }

    #[test]
    fn ball_events_reach_an_attached_console() {
        let queue: ReplQueue<LaneMutex> = ReplQueue::new();
        let mut sink = ConsoleSink::new(queue.sender());

        status::set_console_attached(true);
        sink.ball_detected(&event());

        let frame = queue.try_receive().expect("event frame");
        let text = core::str::from_utf8(&frame).expect("ascii");
        assert!(
            text.starts_with("ball pins=11110 changes=00001 value=2 status=partial"),
            "{text}"
        );
    }
}
