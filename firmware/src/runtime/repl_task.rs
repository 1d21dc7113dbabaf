use core::fmt::Write as _;

use super::{Board, DETECTOR, REPL_RX_QUEUE, REPL_TX_QUEUE};
use crate::lane::LaneCell;
use crate::repl::{self, ReplSession};

#[embassy_executor::task]
pub async fn run(lane: &'static LaneCell<Board>) -> ! {
    let rx = REPL_RX_QUEUE.receiver();
    let tx = REPL_TX_QUEUE.sender();
    let mut session = ReplSession::new(&DETECTOR);

    loop {
        let frame = rx.receive().await;
        for byte in frame {
            match session.ingest(byte) {
                Ok(Some(line)) => {
                    defmt::debug!("repl: `{}`", line.as_str());
                    let response = session.respond(&line, lane).await;
                    repl::send_text(&tx, &response).await;
                }
                Ok(None) => {}
                Err(error) => {
                    defmt::warn!("repl: {}", defmt::Display2Format(&error));
                    let mut message = repl::ReplResponse::new();
                    let _ = write!(message, "ERR {error}");
                    repl::send_text(&tx, &message).await;
                }
            }
        }
    }
}
