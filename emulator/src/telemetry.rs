use std::mem;
use std::time::Duration;

use pinsetter_core::telemetry::{
    EventId, Severity, TelemetryEventKind, TelemetryPayload, TelemetryRecorder, TelemetrySink,
};

/// Telemetry line waiting to be shown to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryLine {
    pub severity: Severity,
    pub text: String,
}

/// Keeps the engine's history and queues a rendered line per event.
#[derive(Default)]
pub struct EmulatorTelemetry {
    recorder: TelemetryRecorder<Duration>,
    pending: Vec<TelemetryLine>,
}

impl EmulatorTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self) -> &TelemetryRecorder<Duration> {
        &self.recorder
    }

    /// Takes every line queued since the last call.
    pub fn drain(&mut self) -> Vec<TelemetryLine> {
        mem::take(&mut self.pending)
    }
}

impl TelemetrySink<Duration> for EmulatorTelemetry {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Duration,
    ) -> EventId {
        let id = self.recorder.record(event, payload, timestamp);

        let mut text = format!("[+{:>6} ms] {event}", timestamp.as_millis());
        if !matches!(payload, TelemetryPayload::None) {
            text.push(' ');
            text.push_str(&payload.to_string());
        }
        self.pending.push(TelemetryLine {
            severity: event.severity(),
            text,
        });
        id
    }
}
