//! Reset sequencing for one lane.
//!
//! [`PinsetterCore`] owns the hardware bank, the pin state store, and the
//! telemetry sink. Every operation that touches the machine takes `&mut self`,
//! so wrapping the core in a single mutex is enough to guarantee that at most
//! one mechanical cycle is in flight.

use core::fmt;
use core::time::Duration;

use crate::config::LaneConfig;
use crate::detection::DetectorControl;
use crate::hardware::{
    AnalogChannel, Clock, Hardware, InitFault, Level, OutputLine, SensorBank, SensorError,
    is_triggered,
};
use crate::pins::{ALL_PINS, ChangeVector, ControlMap, PinStateStore, ResetFlags, ScanStatus};
use crate::rules::{
    FrameContext, ResetReason, decide_reset_reason, ends_frame, is_frame_ending, is_third_ball,
};
use crate::scanner::PinSensorScanner;
use crate::telemetry::{
    TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetrySink, WaitTelemetry,
};

/// Low time of the machine reset relay pulse.
pub const RESET_PULSE: Duration = Duration::from_millis(50);

/// Deadline for the home-position sensor, measured from the reset pulse.
pub const POSITION_TIMEOUT: Duration = Duration::from_secs(8);

/// Home-position polling period.
pub const POSITION_POLL: Duration = Duration::from_millis(10);

/// Consecutive home-sensor read failures that abandon the wait.
pub const MAX_POSITION_ERRORS: u8 = 10;

/// Hold-down pulse applied to every down pin during a partial cycle.
pub const SOLENOID_HOLD: Duration = Duration::from_millis(250);

/// Per-pin hold-down pulse used by a direct pin set.
pub const DIRECT_SOLENOID_HOLD: Duration = Duration::from_millis(150);

/// Fixed wait used by a direct pin set when no home sensor is wired.
pub const DIRECT_FIXED_WAIT: Duration = Duration::from_millis(5_500);

/// Settle time after a direct pin set.
pub const DIRECT_SETTLE: Duration = Duration::from_millis(500);

/// Why a position wait gave up and re-applied the snapshot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitFallbackReason {
    Timeout,
    SensorErrors,
    NoSensor,
    NoResetRecorded,
}

impl fmt::Display for WaitFallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitFallbackReason::Timeout => "timeout",
            WaitFallbackReason::SensorErrors => "sensor-errors",
            WaitFallbackReason::NoSensor => "no-sensor",
            WaitFallbackReason::NoResetRecorded => "no-reset-recorded",
        })
    }
}

/// Result of waiting for the machine to reach its home position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PositionWait {
    /// The home sensor tripped after the given time.
    Reached(Duration),
    /// Third-ball suppression skipped the wait.
    Skipped,
    /// No home sensor; a fixed delay was used instead.
    Fixed(Duration),
    Fallback(WaitFallbackReason),
}

impl fmt::Display for PositionWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionWait::Reached(waited) => write!(f, "reached+{}ms", waited.as_millis()),
            PositionWait::Skipped => f.write_str("skipped"),
            PositionWait::Fixed(waited) => write!(f, "fixed+{}ms", waited.as_millis()),
            PositionWait::Fallback(reason) => write!(f, "fallback:{reason}"),
        }
    }
}

/// Which mechanical cycle an operation ran.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleKind {
    FullReset(ResetReason),
    Partial(PositionWait),
    /// Operator pin set with individual solenoid pulses.
    Direct(PositionWait),
    /// A full reset was queued for the next cycle.
    Deferred,
    /// Nothing moved.
    Idle,
    /// The reset relay could not be driven; outputs were released.
    Faulted(SensorError),
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::FullReset(reason) => write!(f, "full-reset ({reason})"),
            CycleKind::Partial(wait) => write!(f, "partial ({wait})"),
            CycleKind::Direct(wait) => write!(f, "direct ({wait})"),
            CycleKind::Deferred => f.write_str("deferred"),
            CycleKind::Idle => f.write_str("idle"),
            CycleKind::Faulted(error) => write!(f, "faulted ({error})"),
        }
    }
}

/// Everything a processed throw produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ThrowOutcome {
    pub changes: ChangeVector,
    pub status: ScanStatus,
    /// Rack as scanned, before any reset ran.
    pub standing: ControlMap,
    pub reason: ResetReason,
    pub cycle: CycleKind,
    pub ends_frame: bool,
    pub read_faults: u16,
}

impl ThrowOutcome {
    #[must_use]
    pub fn value(&self) -> u8 {
        self.changes.value()
    }
}

/// Reset requested by an operator or the game layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetKind {
    Full,
    Pins,
}

impl ResetKind {
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("full") {
            Some(ResetKind::Full)
        } else if word.eq_ignore_ascii_case("pins") {
            Some(ResetKind::Pins)
        } else {
            None
        }
    }
}

impl fmt::Display for ResetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetKind::Full => "full",
            ResetKind::Pins => "pins",
        })
    }
}

/// Point-in-time view of the lane for status reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneStatus {
    pub initialized: bool,
    pub fault: Option<InitFault>,
    pub detecting: bool,
    pub suspended: bool,
    pub control: ControlMap,
    pub flags: ResetFlags,
    /// Time left before the position wait is re-enabled.
    pub suppression_remaining: Option<Duration>,
    pub home_sensor: Option<AnalogChannel>,
    pub cycle_time: Duration,
    pub threshold: u16,
    pub debounce: Duration,
    pub game: Option<FrameContext>,
}

/// The pinsetter engine for a single lane.
pub struct PinsetterCore<B, C, T>
where
    C: Clock,
{
    hardware: Hardware<B>,
    clock: C,
    telemetry: T,
    config: LaneConfig,
    store: PinStateStore<C::Instant>,
    game: Option<FrameContext>,
}

impl<B, C, T> PinsetterCore<B, C, T>
where
    B: SensorBank,
    C: Clock,
    T: TelemetrySink<C::Instant>,
{
    /// Builds the engine with every pin standing and all outputs idle.
    pub fn new(hardware: Hardware<B>, clock: C, config: LaneConfig, telemetry: T) -> Self {
        let mut core = Self {
            hardware,
            clock,
            telemetry,
            config,
            store: PinStateStore::new(),
            game: None,
        };
        core.hardware.release_all();
        core
    }

    pub fn store(&self) -> &PinStateStore<C::Instant> {
        &self.store
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut T {
        &mut self.telemetry
    }

    pub fn hardware(&self) -> &Hardware<B> {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut Hardware<B> {
        &mut self.hardware
    }

    pub fn game_context(&self) -> Option<&FrameContext> {
        self.game.as_ref()
    }

    /// Replaces the game layer's view of the current frame.
    pub fn set_game_context(&mut self, context: Option<FrameContext>) {
        self.game = context;
        self.record(TelemetryEventKind::GameContextUpdated, TelemetryPayload::none());
    }

    /// Scans the rack after a ball and runs whichever cycle the frame rules pick.
    pub async fn process_throw(&mut self) -> ThrowOutcome {
        self.record(TelemetryEventKind::BallDetected, TelemetryPayload::none());
        if self.store.suppression.refresh(self.clock.now()) {
            self.record(TelemetryEventKind::SuppressionRestored, TelemetryPayload::none());
        }

        let report = PinSensorScanner::new(&mut self.hardware, &self.clock, &self.config)
            .scan(&mut self.store, &mut self.telemetry)
            .await;
        let standing = self.store.control;

        let context = self.game.as_ref();
        let third_ball = is_third_ball(context);
        let frame_ending = is_frame_ending(context);
        let ends_frame = ends_frame(context, report.changes.value(), report.status);
        let external_force = self.store.flags.take_force();

        if third_ball {
            self.store.suppression.arm(self.clock.now());
            self.record(TelemetryEventKind::SuppressionArmed, TelemetryPayload::none());
        }

        let reason = decide_reset_reason(
            report.status.is_strike(),
            frame_ending,
            third_ball,
            external_force,
        );

        let cycle = if reason.requires_full_reset() {
            self.full_reset(reason).await
        } else if report.changes.any() || report.status != ScanStatus::NoChange {
            self.partial_cycle().await
        } else {
            CycleKind::Idle
        };

        ThrowOutcome {
            changes: report.changes,
            status: report.status,
            standing,
            reason,
            cycle,
            ends_frame,
            read_faults: report.read_faults,
        }
    }

    /// Pulses the reset relay and stands the whole rack without waiting for
    /// the machine.
    pub async fn full_reset(&mut self, reason: ResetReason) -> CycleKind {
        // Cleared by `stand_all`; survives if this future is dropped mid-pulse.
        self.store.flags.needs_full_reset = true;
        self.record(TelemetryEventKind::FullReset(reason), TelemetryPayload::none());

        let pulse = self.pulse_reset().await;
        self.store.stand_all();
        let applied = self.drive_solenoids(Level::High);

        match pulse.and(applied) {
            Ok(()) => CycleKind::FullReset(reason),
            Err(error) => {
                self.hardware.release_all();
                CycleKind::Faulted(error)
            }
        }
    }

    /// Runs a partial machine cycle that keeps down pins out of the next set.
    ///
    /// A pending reset flag upgrades the cycle to a full reset.
    pub async fn partial_cycle(&mut self) -> CycleKind {
        if self.store.flags.is_pending() {
            return self.full_reset(ResetReason::ExternalForce).await;
        }

        let snapshot = self.store.control;
        self.record(TelemetryEventKind::PartialCycle, TelemetryPayload::Pins(snapshot));

        if let Err(error) = self.pulse_reset().await {
            self.hardware.release_all();
            return CycleKind::Faulted(error);
        }

        let wait = if self.store.suppression.is_active() {
            PositionWait::Skipped
        } else {
            self.wait_for_position(snapshot).await
        };

        if self.apply_control().await.is_err() {
            self.hardware.release_all();
        }
        CycleKind::Partial(wait)
    }

    /// Sets an arbitrary rack, bypassing the frame rules and suppression.
    pub async fn pin_set(&mut self, target: ControlMap) -> CycleKind {
        self.record(TelemetryEventKind::PinSet, TelemetryPayload::Pins(target));
        self.store.control = target;

        if let Err(error) = self.pulse_reset().await {
            self.hardware.release_all();
            return CycleKind::Faulted(error);
        }

        let wait = if self.config.home_sensor.is_some() {
            self.wait_for_position(target).await
        } else {
            self.clock.sleep(DIRECT_FIXED_WAIT).await;
            PositionWait::Fixed(DIRECT_FIXED_WAIT)
        };

        let mut result = Ok(());
        for pin in target.down_pins() {
            self.record(TelemetryEventKind::SolenoidPulse(pin), TelemetryPayload::none());
            if let Err(error) = self.drive(OutputLine::Solenoid(pin), Level::Low) {
                result = Err(error);
            }
            self.clock.sleep(DIRECT_SOLENOID_HOLD).await;
            if let Err(error) = self.drive(OutputLine::Solenoid(pin), Level::High) {
                result = Err(error);
            }
        }
        self.clock.sleep(DIRECT_SETTLE).await;

        if result.is_err() {
            self.hardware.release_all();
        }
        CycleKind::Direct(wait)
    }

    /// Records `target` as the rack and runs a partial cycle to realize it.
    pub async fn pin_restore(&mut self, target: ControlMap) -> CycleKind {
        self.record(TelemetryEventKind::PinRestore, TelemetryPayload::Pins(target));
        self.store.control = target;
        self.partial_cycle().await
    }

    /// Handles a reset request from outside the throw cycle.
    pub async fn schedule_reset(&mut self, kind: ResetKind, immediate: bool) -> CycleKind {
        match (kind, immediate) {
            (ResetKind::Full, false) => {
                self.store.flags.force_full_reset = true;
                self.record(TelemetryEventKind::ResetDeferred, TelemetryPayload::none());
                CycleKind::Deferred
            }
            _ => self.full_reset(ResetReason::ExternalForce).await,
        }
    }

    /// Stands every pin. Used at shutdown and from the operator console.
    pub async fn emergency_pin_reset(&mut self) -> CycleKind {
        self.record(TelemetryEventKind::EmergencyReset, TelemetryPayload::none());
        self.pin_set(ControlMap::all_standing()).await
    }

    /// Snapshot for status reporting.
    pub fn status(&self, control: &DetectorControl) -> LaneStatus {
        let now = self.clock.now();
        let suppression_remaining = if self.store.suppression.is_active() {
            self.store
                .suppression
                .restore_at()
                .map(|restore_at| restore_at.saturating_duration_since(now))
        } else {
            None
        };

        LaneStatus {
            initialized: self.hardware.is_ready(),
            fault: self.hardware.fault(),
            detecting: control.is_detecting(),
            suspended: control.is_suspended(),
            control: self.store.control,
            flags: self.store.flags,
            suppression_remaining,
            home_sensor: self.config.home_sensor,
            cycle_time: self.config.cycle_time,
            threshold: control.threshold(),
            debounce: control.debounce(),
            game: self.game.clone(),
        }
    }

    async fn pulse_reset(&mut self) -> Result<(), SensorError> {
        let now = self.clock.now();
        self.store.timing.mark_reset(now);
        self.record(TelemetryEventKind::ResetPulse, TelemetryPayload::none());

        self.drive(OutputLine::ResetRelay, Level::Low)?;
        self.clock.sleep(RESET_PULSE).await;
        self.drive(OutputLine::ResetRelay, Level::High)
    }

    async fn wait_for_position(&mut self, snapshot: ControlMap) -> PositionWait {
        let Some(channel) = self.config.home_sensor else {
            return self.position_fallback(snapshot, WaitFallbackReason::NoSensor, Duration::ZERO, 0);
        };
        let Some(reset_at) = self.store.timing.reset_called_at else {
            return self.position_fallback(
                snapshot,
                WaitFallbackReason::NoResetRecorded,
                Duration::ZERO,
                0,
            );
        };

        let mut errors: u8 = 0;
        loop {
            let waited = self.clock.elapsed_since(reset_at);
            if waited >= POSITION_TIMEOUT {
                return self.position_fallback(snapshot, WaitFallbackReason::Timeout, waited, errors);
            }

            match self.hardware.read_voltage(channel) {
                Ok(volts) if is_triggered(volts) => {
                    self.record(
                        TelemetryEventKind::PositionReached,
                        TelemetryPayload::Wait(WaitTelemetry {
                            waited,
                            read_errors: errors,
                        }),
                    );
                    return PositionWait::Reached(waited);
                }
                Ok(_) => errors = 0,
                Err(_) => {
                    errors = errors.saturating_add(1);
                    if errors >= MAX_POSITION_ERRORS {
                        return self.position_fallback(
                            snapshot,
                            WaitFallbackReason::SensorErrors,
                            waited,
                            errors,
                        );
                    }
                }
            }

            self.clock.sleep(POSITION_POLL).await;
        }
    }

    fn position_fallback(
        &mut self,
        snapshot: ControlMap,
        reason: WaitFallbackReason,
        waited: Duration,
        read_errors: u8,
    ) -> PositionWait {
        self.store.control = snapshot;
        self.record(
            TelemetryEventKind::PositionFallback(reason),
            TelemetryPayload::Wait(WaitTelemetry {
                waited,
                read_errors,
            }),
        );
        PositionWait::Fallback(reason)
    }

    /// Drives every solenoid standing, then holds down pins marked down.
    async fn apply_control(&mut self) -> Result<(), SensorError> {
        self.drive_solenoids(Level::High)?;

        let control = self.store.control;
        if control.is_all_standing() {
            return Ok(());
        }

        let mut result = Ok(());
        for pin in control.down_pins() {
            self.record(TelemetryEventKind::SolenoidPulse(pin), TelemetryPayload::none());
            if let Err(error) = self.drive(OutputLine::Solenoid(pin), Level::Low) {
                result = Err(error);
            }
        }
        self.clock.sleep(SOLENOID_HOLD).await;
        for pin in control.down_pins() {
            if let Err(error) = self.drive(OutputLine::Solenoid(pin), Level::High) {
                result = Err(error);
            }
        }
        result
    }

    fn drive_solenoids(&mut self, level: Level) -> Result<(), SensorError> {
        let mut result = Ok(());
        for pin in ALL_PINS {
            if let Err(error) = self.drive(OutputLine::Solenoid(pin.name), level) {
                result = Err(error);
            }
        }
        result
    }

    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError> {
        let result = self.hardware.drive(line, level);
        if let Err(error) = result {
            self.record(TelemetryEventKind::OutputFault(line), TelemetryPayload::Fault(error));
        }
        result
    }

    fn record(&mut self, event: TelemetryEventKind, payload: TelemetryPayload) {
        let now = self.clock.now();
        self.telemetry.record(event, payload, now);
    }
}
