mod common;

use std::time::Duration;

use embassy_futures::block_on;

use common::{MockClock, MockLane, ScriptedEntry, lane, ms};
use pinsetter_core::config::DetectorConfig;
use pinsetter_core::detection::{BallDetectionLoop, BallEvent, BallEventSink, DetectorControl};
use pinsetter_core::pins::{ChangeVector, ControlMap, PinName, ScanStatus};
use pinsetter_core::telemetry::TelemetryEventKind;

#[derive(Default)]
struct RecordingSink {
    events: Vec<BallEvent<Duration>>,
    ignored: Vec<Duration>,
}

impl BallEventSink<Duration> for RecordingSink {
    fn ball_detected(&mut self, event: &BallEvent<Duration>) {
        self.events.push(*event);
    }

    fn ball_ignored(&mut self, at: Duration) {
        self.ignored.push(at);
    }
}

#[test]
fn accepted_ball_runs_the_throw_cycle() {
    let clock = MockClock::default();
    let mut lane = lane(MockLane::new(&clock).knock(PinName::CenterFive, ms(200)), &clock);
    let control = DetectorControl::new(DetectorConfig::new(), true);

    let mut detection = BallDetectionLoop::new(
        ScriptedEntry::new(10),
        clock.clone(),
        &mut lane,
        RecordingSink::default(),
        &control,
        DetectorConfig::new(),
    );

    let mut event = None;
    for _ in 0..20 {
        event = block_on(detection.poll_once());
        if event.is_some() {
            break;
        }
    }

    let event = event.expect("ball detected");
    assert_eq!(event.detected_at, ms(9));
    assert_eq!(event.value, 5);
    assert_eq!(event.status, ScanStatus::PartialChange);
    assert_eq!(event.changes, ChangeVector::from_bits([0, 0, 1, 0, 0]));
    assert_eq!(
        event.standing,
        ControlMap::all_standing().with_down(PinName::CenterFive)
    );
    assert_eq!(detection.sink().events.len(), 1);
    drop(detection);

    assert_eq!(lane.telemetry().count(TelemetryEventKind::BallDetected), 1);
    assert_eq!(lane.telemetry().count(TelemetryEventKind::PositionReached), 1);
}

#[test]
fn hold_stops_sampling_the_entry_sensor() {
    let clock = MockClock::default();
    let mut lane = lane(MockLane::new(&clock), &clock);
    let control = DetectorControl::new(DetectorConfig::new(), true);
    control.set_hold(true);

    let entry = ScriptedEntry::new(50);
    let samples = entry.samples.clone();
    let mut detection = BallDetectionLoop::new(
        entry,
        clock.clone(),
        &mut lane,
        RecordingSink::default(),
        &control,
        DetectorConfig::new(),
    );

    for _ in 0..50 {
        assert!(block_on(detection.poll_once()).is_none());
    }
    assert_eq!(samples.get(), 0);
    assert_eq!(clock.elapsed(), ms(50));

    control.set_hold(false);
    control.stop();
    assert!(block_on(detection.poll_once()).is_none());
    assert_eq!(samples.get(), 0);
}

#[test]
fn second_confirmation_inside_the_debounce_is_ignored() {
    let clock = MockClock::default();
    let mut lane = lane(MockLane::new(&clock), &clock);
    let control = DetectorControl::new(DetectorConfig::new(), true);
    control.set_debounce(Duration::from_secs(60));

    let mut detection = BallDetectionLoop::new(
        ScriptedEntry::new(20),
        clock.clone(),
        &mut lane,
        RecordingSink::default(),
        &control,
        DetectorConfig::new(),
    );

    for _ in 0..30 {
        let _ = block_on(detection.poll_once());
    }

    assert_eq!(detection.sink().events.len(), 1);
    assert_eq!(detection.sink().ignored.len(), 1);
    drop(detection);

    assert_eq!(lane.telemetry().count(TelemetryEventKind::BallDetected), 1);
}

#[test]
fn threshold_changes_take_effect_on_the_next_poll() {
    let clock = MockClock::default();
    let mut lane = lane(MockLane::new(&clock), &clock);
    let control = DetectorControl::new(DetectorConfig::new(), true);
    control.set_threshold(3);

    let mut detection = BallDetectionLoop::new(
        ScriptedEntry::new(3),
        clock.clone(),
        &mut lane,
        RecordingSink::default(),
        &control,
        DetectorConfig::new(),
    );

    let outcomes: Vec<_> = (0..3).map(|_| block_on(detection.poll_once())).collect();

    assert!(outcomes[..2].iter().all(Option::is_none));
    let event = outcomes[2].expect("third high sample confirms");
    assert_eq!(event.status, ScanStatus::NoChange);
    assert_eq!(event.value, 0);
    drop(detection);

    assert_eq!(
        lane.telemetry().count(TelemetryEventKind::ScanComplete(ScanStatus::NoChange)),
        1
    );
}
