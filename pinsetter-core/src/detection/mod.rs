//! Ball-entry detection.
//!
//! [`BallDetector`] turns raw entry-beam samples into accepted detections,
//! [`BallDetectionLoop`] polls the beam and hands each accepted ball to the
//! lane, and [`DetectorControl`] carries the flags the command path flips
//! while the loop is running.

use core::time::Duration;

use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use crate::config::DetectorConfig;
use crate::hardware::{Clock, EntrySensor, SensorBank};
use crate::orchestrator::{PinsetterCore, ThrowOutcome};
use crate::pins::{ChangeVector, ControlMap, ScanStatus};
use crate::telemetry::{TelemetryInstant, TelemetrySink};

/// Flags shared between the detection loop and the command path.
///
/// Only plain loads and stores are used so the type works on cores without
/// compare-and-swap.
pub struct DetectorControl {
    detecting: AtomicBool,
    suspended: AtomicBool,
    threshold: AtomicU16,
    debounce_ms: AtomicU32,
}

impl DetectorControl {
    #[must_use]
    pub const fn new(config: DetectorConfig, detecting: bool) -> Self {
        Self {
            detecting: AtomicBool::new(detecting),
            suspended: AtomicBool::new(false),
            threshold: AtomicU16::new(config.threshold),
            debounce_ms: AtomicU32::new(saturating_millis(config.debounce)),
        }
    }

    /// Suspends or resumes reacting to balls. A running cycle is not
    /// interrupted.
    pub fn set_hold(&self, hold: bool) {
        self.suspended.store(hold, Ordering::Relaxed);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        self.detecting.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.detecting.store(false, Ordering::Relaxed);
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::Relaxed)
    }

    /// Sets the consecutive-sample threshold; zero is clamped to one.
    pub fn set_threshold(&self, threshold: u16) {
        self.threshold.store(threshold.max(1), Ordering::Relaxed);
    }

    pub fn threshold(&self) -> u16 {
        self.threshold.load(Ordering::Relaxed)
    }

    pub fn set_debounce(&self, debounce: Duration) {
        self.debounce_ms
            .store(saturating_millis(debounce), Ordering::Relaxed);
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(u64::from(self.debounce_ms.load(Ordering::Relaxed)))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
const fn saturating_millis(duration: Duration) -> u32 {
    let millis = duration.as_millis();
    if millis > u32::MAX as u128 {
        u32::MAX
    } else {
        millis as u32
    }
}

/// Detector phases.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectorState {
    Idle,
    /// Counting consecutive high samples.
    Armed,
    /// A ball was accepted on the last sample.
    Detected,
    /// Waiting out the debounce interval after an accepted ball.
    Cooldown,
}

/// Result of feeding one sample to the detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Detection {
    None,
    Accepted,
    /// Threshold reached inside the debounce interval.
    Ignored,
}

/// Consecutive-sample ball detector with debounce.
#[derive(Copy, Clone, Debug)]
pub struct BallDetector<TInstant> {
    state: DetectorState,
    consecutive: u16,
    threshold: u16,
    debounce: Duration,
    last_detection: Option<TInstant>,
}

impl<TInstant> BallDetector<TInstant>
where
    TInstant: TelemetryInstant,
{
    #[must_use]
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            state: DetectorState::Idle,
            consecutive: 0,
            threshold: config.threshold,
            debounce: config.debounce,
            last_detection: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn set_threshold(&mut self, threshold: u16) {
        self.threshold = threshold.max(1);
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    fn within_debounce(&self, now: TInstant) -> bool {
        self.last_detection
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce)
    }

    /// Feeds one beam sample taken at `now`.
    pub fn sample(&mut self, high: bool, now: TInstant) -> Detection {
        if self.state == DetectorState::Detected {
            self.state = DetectorState::Cooldown;
        }
        if self.state == DetectorState::Cooldown && !self.within_debounce(now) {
            self.state = DetectorState::Idle;
        }

        if !high {
            self.consecutive = 0;
            if self.state == DetectorState::Armed {
                self.state = DetectorState::Idle;
            }
            return Detection::None;
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if self.state == DetectorState::Idle {
            self.state = DetectorState::Armed;
        }
        if self.consecutive < self.threshold {
            return Detection::None;
        }

        self.consecutive = 0;
        if self.within_debounce(now) {
            if self.state == DetectorState::Armed {
                self.state = DetectorState::Idle;
            }
            return Detection::Ignored;
        }

        self.last_detection = Some(now);
        self.state = DetectorState::Detected;
        Detection::Accepted
    }
}

/// Exclusive access to the lane for one throw.
#[allow(async_fn_in_trait)]
pub trait LaneHandle {
    /// Runs the full post-throw cycle while holding the lane.
    async fn process_throw(&mut self) -> ThrowOutcome;
}

impl<B, C, T> LaneHandle for PinsetterCore<B, C, T>
where
    B: SensorBank,
    C: Clock,
    T: TelemetrySink<C::Instant>,
{
    async fn process_throw(&mut self) -> ThrowOutcome {
        PinsetterCore::process_throw(self).await
    }
}

impl<L: LaneHandle> LaneHandle for &mut L {
    async fn process_throw(&mut self) -> ThrowOutcome {
        (**self).process_throw().await
    }
}

/// Ball result delivered to the game layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BallEvent<TInstant> {
    pub standing: ControlMap,
    pub changes: ChangeVector,
    pub status: ScanStatus,
    pub value: u8,
    pub ends_frame: bool,
    pub detected_at: TInstant,
}

impl<TInstant> BallEvent<TInstant> {
    pub fn from_outcome(outcome: &ThrowOutcome, detected_at: TInstant) -> Self {
        Self {
            standing: outcome.standing,
            changes: outcome.changes,
            status: outcome.status,
            value: outcome.value(),
            ends_frame: outcome.ends_frame,
            detected_at,
        }
    }
}

/// Receiver for ball events.
pub trait BallEventSink<TInstant> {
    fn ball_detected(&mut self, event: &BallEvent<TInstant>);

    /// A ball reached the threshold inside the debounce interval.
    fn ball_ignored(&mut self, _at: TInstant) {}
}

/// Polls the entry sensor and runs a throw cycle for every accepted ball.
pub struct BallDetectionLoop<'a, E, C, L, S>
where
    C: Clock,
{
    entry: E,
    clock: C,
    lane: L,
    sink: S,
    control: &'a DetectorControl,
    detector: BallDetector<C::Instant>,
    poll_interval: Duration,
}

impl<'a, E, C, L, S> BallDetectionLoop<'a, E, C, L, S>
where
    E: EntrySensor,
    C: Clock,
    L: LaneHandle,
    S: BallEventSink<C::Instant>,
{
    pub fn new(
        entry: E,
        clock: C,
        lane: L,
        sink: S,
        control: &'a DetectorControl,
        config: DetectorConfig,
    ) -> Self {
        Self {
            entry,
            clock,
            lane,
            sink,
            control,
            detector: BallDetector::new(config),
            poll_interval: config.poll_interval,
        }
    }

    pub fn detector(&self) -> &BallDetector<C::Instant> {
        &self.detector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn lane(&self) -> &L {
        &self.lane
    }

    /// One polling iteration. Returns the event when a ball was processed.
    pub async fn poll_once(&mut self) -> Option<BallEvent<C::Instant>> {
        if !self.control.is_detecting() || self.control.is_suspended() {
            self.clock.sleep(self.poll_interval).await;
            return None;
        }

        self.detector.set_threshold(self.control.threshold());
        self.detector.set_debounce(self.control.debounce());

        let high = self.entry.is_high().unwrap_or(false);
        let now = self.clock.now();

        let event = match self.detector.sample(high, now) {
            Detection::Accepted => {
                let outcome = self.lane.process_throw().await;
                let event = BallEvent::from_outcome(&outcome, now);
                self.sink.ball_detected(&event);
                Some(event)
            }
            Detection::Ignored => {
                self.sink.ball_ignored(now);
                None
            }
            Detection::None => None,
        };

        self.clock.sleep(self.poll_interval).await;
        event
    }

    /// Polls forever.
    pub async fn run(&mut self) -> ! {
        loop {
            let _ = self.poll_once().await;
        }
    }
}
