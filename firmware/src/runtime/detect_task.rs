use pinsetter_core::config::DetectorConfig;
use pinsetter_core::detection::BallDetectionLoop;

use super::{Board, DETECTOR, REPL_TX_QUEUE};
use crate::clock::EmbassyClock;
use crate::hw::EntryBeam;
use crate::lane::{ConsoleSink, LaneCell, SharedLane};

#[embassy_executor::task]
pub async fn run(
    entry: EntryBeam<'static>,
    lane: &'static LaneCell<Board>,
    config: DetectorConfig,
) -> ! {
    let sink = ConsoleSink::new(REPL_TX_QUEUE.sender());
    let mut detection = BallDetectionLoop::new(
        entry,
        EmbassyClock,
        SharedLane::new(lane),
        sink,
        &DETECTOR,
        config,
    );

    defmt::info!(
        "detect: polling entry beam every {}ms",
        config.poll_interval.as_millis()
    );
    detection.run().await
}
