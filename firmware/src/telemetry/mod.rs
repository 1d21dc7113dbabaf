//! Telemetry sink for the firmware target.
//!
//! Records land in the shared [`TelemetryRecorder`] ring and are mirrored to
//! defmt (or stdout on the host) as they arrive, so a probe session shows the
//! cycle as it happens.

use core::fmt::Write;

use heapless::String;
use pinsetter_core::telemetry::{
    EventId, Severity, TelemetryEventKind, TelemetryPayload, TelemetryRecorder, TelemetrySink,
};

use crate::clock::FirmwareInstant;
use crate::status;

/// Longest rendered log line; longer lines are cut.
const LOG_LINE_LEN: usize = 96;

/// Ring buffer plus log mirroring.
pub struct FirmwareTelemetry {
    recorder: TelemetryRecorder<FirmwareInstant>,
}

impl FirmwareTelemetry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &TelemetryRecorder<FirmwareInstant> {
        &self.recorder
    }
}

impl Default for FirmwareTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink<FirmwareInstant> for FirmwareTelemetry {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: FirmwareInstant,
    ) -> EventId {
        let id = self.recorder.record(event, payload, timestamp);

        let severity = event.severity();
        if severity != Severity::Info {
            status::record_fault();
        }

        let line = render(event, payload);
        let micros = timestamp.into_embassy().as_micros();
        emit_log(severity, line.as_str(), micros);
        id
    }
}

fn render(event: TelemetryEventKind, payload: TelemetryPayload) -> String<LOG_LINE_LEN> {
    let mut line = String::new();
    // Overflow only truncates the mirrored line; the ring keeps the full record.
    let _ = write!(line, "{event}");
    if !matches!(payload, TelemetryPayload::None) {
        let _ = write!(line, " {payload}");
    }
    line
}

#[cfg(target_os = "none")]
fn emit_log(severity: Severity, line: &str, timestamp_us: u64) {
    match severity {
        Severity::Info => defmt::info!("telemetry:lane {} t={}us", line, timestamp_us),
        Severity::Warn => defmt::warn!("telemetry:lane {} t={}us", line, timestamp_us),
        Severity::Error => defmt::error!("telemetry:lane {} t={}us", line, timestamp_us),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(severity: Severity, line: &str, timestamp_us: u64) {
    let level = match severity {
        Severity::Info => "INFO",
        Severity::Warn => "WARN",
        Severity::Error => "ERROR",
    };
    println!("{level} telemetry:lane {line} t={timestamp_us}us");
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use pinsetter_core::pins::{ChangeVector, ScanStatus};
    use pinsetter_core::telemetry::ScanTelemetry;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from_micros(value)
    }

    #[test]
    fn records_into_the_ring() {
        let mut telemetry = FirmwareTelemetry::new();

        let first = telemetry.record(
            TelemetryEventKind::BallDetected,
            TelemetryPayload::None,
            micros(100),
        );
        let second = telemetry.record(
            TelemetryEventKind::BallDetected,
            TelemetryPayload::None,
            micros(350),
        );

        assert_eq!((first, second), (0, 1));
        assert_eq!(telemetry.recorder().len(), 2);
        assert_eq!(
            telemetry
                .recorder()
                .interval_between_last(TelemetryEventKind::BallDetected),
            Some(Duration::from_micros(250))
        );
    }

    #[test]
    fn renders_event_and_payload() {
        let line = render(
            TelemetryEventKind::ScanComplete(ScanStatus::PartialChange),
            TelemetryPayload::Scan(ScanTelemetry {
                changes: ChangeVector::from_bits([0, 0, 1, 0, 0]),
                elapsed: Duration::from_millis(1_025),
                read_faults: 0,
            }),
        );
        assert_eq!(
            line.as_str(),
            "scan-complete partial changes=00100 elapsed=1025ms faults=0"
        );
    }
}
