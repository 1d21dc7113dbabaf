//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The engine never prints. Every notable step of a cycle is handed to a
//! [`TelemetrySink`] as a typed event with a monotonic timestamp; the firmware
//! mirrors records to `defmt` and the emulator renders them on the console.
//! [`TelemetryRecorder`] keeps the most recent records in a fixed-size ring so
//! both targets can replay recent history without allocation.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::hardware::{OutputLine, SensorError};
use crate::orchestrator::WaitFallbackReason;
use crate::pins::{ChangeVector, ControlMap, PinName, ScanStatus};
use crate::rules::ResetReason;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

impl TelemetryInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Coarse severity used by front-ends to pick a log level.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Discriminated telemetry events emitted by the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    BallDetected,
    BallIgnored,
    ScanComplete(ScanStatus),
    SensorFault(PinName),
    ResetPulse,
    SolenoidPulse(PinName),
    FullReset(ResetReason),
    PartialCycle,
    PositionReached,
    PositionFallback(WaitFallbackReason),
    SuppressionArmed,
    SuppressionRestored,
    PinSet,
    PinRestore,
    ResetDeferred,
    EmergencyReset,
    OutputFault(OutputLine),
    GameContextUpdated,
}

impl TelemetryEventKind {
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            TelemetryEventKind::SensorFault(_) | TelemetryEventKind::PositionFallback(_) => {
                Severity::Warn
            }
            TelemetryEventKind::OutputFault(_) => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::BallDetected => f.write_str("ball-detected"),
            TelemetryEventKind::BallIgnored => f.write_str("ball-ignored"),
            TelemetryEventKind::ScanComplete(status) => write!(f, "scan-complete {status}"),
            TelemetryEventKind::SensorFault(pin) => write!(f, "sensor-fault {pin}"),
            TelemetryEventKind::ResetPulse => f.write_str("reset-pulse"),
            TelemetryEventKind::SolenoidPulse(pin) => write!(f, "solenoid-pulse {pin}"),
            TelemetryEventKind::FullReset(reason) => write!(f, "full-reset {reason}"),
            TelemetryEventKind::PartialCycle => f.write_str("partial-cycle"),
            TelemetryEventKind::PositionReached => f.write_str("position-reached"),
            TelemetryEventKind::PositionFallback(reason) => {
                write!(f, "position-fallback {reason}")
            }
            TelemetryEventKind::SuppressionArmed => f.write_str("suppression-armed"),
            TelemetryEventKind::SuppressionRestored => f.write_str("suppression-restored"),
            TelemetryEventKind::PinSet => f.write_str("pin-set"),
            TelemetryEventKind::PinRestore => f.write_str("pin-restore"),
            TelemetryEventKind::ResetDeferred => f.write_str("reset-deferred"),
            TelemetryEventKind::EmergencyReset => f.write_str("emergency-reset"),
            TelemetryEventKind::OutputFault(line) => write!(f, "output-fault {line}"),
            TelemetryEventKind::GameContextUpdated => f.write_str("game-context"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Summary of a completed pin scan.
    Scan(ScanTelemetry),
    /// Outcome of a home-position wait.
    Wait(WaitTelemetry),
    /// Rack configuration the event applied.
    Pins(ControlMap),
    /// Hardware error behind a fault event.
    Fault(SensorError),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Scan(scan) => write!(
                f,
                "changes={} elapsed={}ms faults={}",
                scan.changes,
                scan.elapsed.as_millis(),
                scan.read_faults
            ),
            TelemetryPayload::Wait(wait) => write!(
                f,
                "waited={}ms errors={}",
                wait.waited.as_millis(),
                wait.read_errors
            ),
            TelemetryPayload::Pins(map) => write!(f, "pins={map}"),
            TelemetryPayload::Fault(error) => write!(f, "error={error}"),
        }
    }
}

/// Scan summary payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanTelemetry {
    pub changes: ChangeVector,
    pub elapsed: Duration,
    pub read_faults: u16,
}

/// Position wait payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WaitTelemetry {
    pub waited: Duration,
    pub read_errors: u8,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Destination for engine telemetry.
pub trait TelemetrySink<TInstant: Copy> {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId;
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of retained records matching `event`.
    pub fn count(&self, event: TelemetryEventKind) -> usize {
        self.oldest_first()
            .filter(|record| record.event == event)
            .count()
    }

    /// Elapsed time between the two most recent records of `event`.
    pub fn interval_between_last(&self, event: TelemetryEventKind) -> Option<Duration> {
        let mut matches = self.oldest_first().filter(|record| record.event == event);
        let mut previous = matches.next()?;
        let mut latest = matches.next()?;
        for record in matches {
            previous = latest;
            latest = record;
        }
        Some(latest.timestamp.saturating_duration_since(previous.timestamp))
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<TInstant, const CAPACITY: usize> TelemetrySink<TInstant>
    for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}
