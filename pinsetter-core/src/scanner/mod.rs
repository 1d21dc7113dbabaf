//! Post-throw pin scan.
//!
//! A scan samples every pin sensor on a fixed period inside a three second
//! compliance window, marking pins down in the [`PinStateStore`] as their
//! sensors trip. Pins never stand back up during a scan.

use core::time::Duration;

use crate::config::LaneConfig;
use crate::hardware::{Clock, SensorBank, is_triggered};
use crate::pins::{ChangeVector, PinName, PinStateStore, ScanStatus};
use crate::telemetry::{ScanTelemetry, TelemetryEventKind, TelemetryPayload, TelemetrySink};

/// Mechanical settling window every scan honours.
pub const COMPLIANCE_WINDOW: Duration = Duration::from_secs(3);

/// Delay between sensor sweeps.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(25);

/// Earliest point at which a settled scan may finish.
pub const EARLY_EXIT_AFTER: Duration = Duration::from_secs(1);

/// Consecutive unchanged sweeps required for an early exit.
pub const REQUIRED_STABLE_SWEEPS: u8 = 10;

/// Order in which pin sensors are swept.
pub const SCAN_ORDER: [PinName; 5] = [
    PinName::CenterFive,
    PinName::RightTwo,
    PinName::RightThree,
    PinName::LeftThree,
    PinName::LeftTwo,
];

/// Result of a completed scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanReport {
    pub changes: ChangeVector,
    pub status: ScanStatus,
    pub elapsed: Duration,
    pub read_faults: u16,
}

/// Samples pin sensors for one throw.
pub struct PinSensorScanner<'a, B, C> {
    bank: &'a mut B,
    clock: &'a C,
    config: &'a LaneConfig,
}

impl<'a, B, C> PinSensorScanner<'a, B, C>
where
    B: SensorBank,
    C: Clock,
{
    pub fn new(bank: &'a mut B, clock: &'a C, config: &'a LaneConfig) -> Self {
        Self {
            bank,
            clock,
            config,
        }
    }

    /// Runs a scan, updating `store.control` and `store.changes` in place.
    pub async fn scan<T>(
        &mut self,
        store: &mut PinStateStore<C::Instant>,
        telemetry: &mut T,
    ) -> ScanReport
    where
        T: TelemetrySink<C::Instant>,
    {
        let started = self.clock.now();
        store.changes.clear();

        if store.control.is_all_down() {
            self.clock.sleep(COMPLIANCE_WINDOW).await;
            store.changes = ChangeVector::all();
            return self.finish(store, ScanStatus::Strike, started, 0, telemetry);
        }

        let mut stable_sweeps: u8 = 0;
        let mut read_faults: u16 = 0;

        while self.clock.elapsed_since(started) <= COMPLIANCE_WINDOW {
            let previous = store.control;
            self.clock.sleep(SAMPLE_PERIOD).await;

            for pin in SCAN_ORDER {
                match self.bank.read_voltage(self.config.channel_for(pin)) {
                    Ok(volts) => {
                        if is_triggered(volts) && store.control.knock_down(pin) {
                            store.changes.mark(pin);
                        }
                    }
                    Err(error) => {
                        read_faults = read_faults.saturating_add(1);
                        telemetry.record(
                            TelemetryEventKind::SensorFault(pin),
                            TelemetryPayload::Fault(error),
                            self.clock.now(),
                        );
                    }
                }
            }

            if store.control == previous {
                stable_sweeps = stable_sweeps.saturating_add(1);
            } else {
                stable_sweeps = 0;
            }

            if store.control.is_all_down() {
                let elapsed = self.clock.elapsed_since(started);
                if let Some(remaining) = COMPLIANCE_WINDOW.checked_sub(elapsed)
                    && !remaining.is_zero()
                {
                    self.clock.sleep(remaining).await;
                }
                return self.finish(store, ScanStatus::Strike, started, read_faults, telemetry);
            }

            if stable_sweeps >= REQUIRED_STABLE_SWEEPS
                && self.clock.elapsed_since(started) >= EARLY_EXIT_AFTER
                && store.changes.any()
            {
                break;
            }

            self.clock.sleep(SAMPLE_PERIOD).await;
        }

        let status = if store.changes.any() {
            ScanStatus::PartialChange
        } else {
            ScanStatus::NoChange
        };
        self.finish(store, status, started, read_faults, telemetry)
    }

    fn finish<T>(
        &self,
        store: &PinStateStore<C::Instant>,
        status: ScanStatus,
        started: C::Instant,
        read_faults: u16,
        telemetry: &mut T,
    ) -> ScanReport
    where
        T: TelemetrySink<C::Instant>,
    {
        let report = ScanReport {
            changes: store.changes,
            status,
            elapsed: self.clock.elapsed_since(started),
            read_faults,
        };
        telemetry.record(
            TelemetryEventKind::ScanComplete(status),
            TelemetryPayload::Scan(ScanTelemetry {
                changes: report.changes,
                elapsed: report.elapsed,
                read_faults,
            }),
            self.clock.now(),
        );
        report
    }
}
