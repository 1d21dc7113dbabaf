use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_sync::mutex::Mutex;
use pinsetter_core::config::{DetectorConfig, LaneConfig};
use pinsetter_core::detection::DetectorControl;
use pinsetter_core::hardware::Hardware;
use pinsetter_core::orchestrator::PinsetterCore;
use static_cell::StaticCell;

use crate::clock::EmbassyClock;
use crate::hw::{EntryBeam, LaneBoard};
use crate::lane::{LaneCell, LaneMutex};
use crate::repl::ReplQueue;
use crate::telemetry::FirmwareTelemetry;
use crate::usb;

mod detect_task;
mod repl_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Board wiring plus the default detector tuning.
const LANE_CONFIG: LaneConfig = LaneConfig::new();

pub(super) type Board = LaneBoard<'static>;

pub(super) static DETECTOR: DetectorControl = DetectorControl::new(DetectorConfig::new(), true);
pub(super) static REPL_RX_QUEUE: ReplQueue<LaneMutex> = ReplQueue::new();
pub(super) static REPL_TX_QUEUE: ReplQueue<LaneMutex> = ReplQueue::new();
static LANE: StaticCell<LaneCell<Board>> = StaticCell::new();
static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        ADC1,
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PA7,
        PA8,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PB8,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    // Outputs idle high so nothing moves while the rest comes up.
    let solenoids = [
        Output::new(PB3, Level::High, Speed::Low),
        Output::new(PB4, Level::High, Speed::Low),
        Output::new(PB5, Level::High, Speed::Low),
        Output::new(PB6, Level::High, Speed::Low),
        Output::new(PB7, Level::High, Speed::Low),
    ];
    let relay = Output::new(PB8, Level::High, Speed::Low);
    let channels = [
        PA0.degrade_adc(),
        PA1.degrade_adc(),
        PA4.degrade_adc(),
        PA5.degrade_adc(),
        PA6.degrade_adc(),
        PA7.degrade_adc(),
    ];

    let board = LaneBoard::new(Adc::new(ADC1), channels, solenoids, relay);
    if let Err(fault) = &board {
        defmt::error!(
            "hw: lane board degraded ({})",
            defmt::Display2Format(fault)
        );
    }

    let lane = PinsetterCore::new(
        Hardware::from_init(board),
        EmbassyClock,
        LANE_CONFIG,
        FirmwareTelemetry::new(),
    );
    let lane: &'static LaneCell<Board> = LANE.init(Mutex::new(lane));

    let entry = EntryBeam::new(Input::new(PA8, Pull::Down));

    spawner.spawn(
        detect_task::run(entry, lane, LANE_CONFIG.detector)
            .expect("failed to spawn detection task"),
    );
    spawner.spawn(repl_task::run(lane).expect("failed to spawn REPL task"));

    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    spawner.spawn(usb_task::run(USB, PA12, PA11, storage).expect("failed to spawn USB task"));

    core::future::pending::<()>().await;
}
