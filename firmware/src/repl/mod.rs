//! Operator console session over USB CDC.
//!
//! Bytes from the host are assembled into lines by [`ReplSession::ingest`];
//! complete lines are parsed and run through the shared
//! [`CommandExecutor`], taking the lane lock only for commands that move the
//! machine or read the rack. Responses are chunked into [`ReplFrame`]s for the
//! USB task.

use core::fmt::{self, Write as _};
use core::str;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::mutex::Mutex;
use heapless::{String, Vec};
use pinsetter_core::detection::DetectorControl;
use pinsetter_core::hardware::{Clock, SensorBank};
use pinsetter_core::orchestrator::PinsetterCore;
use pinsetter_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use pinsetter_core::telemetry::TelemetrySink;

use crate::status::FirmwareCounters;

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Size of one USB packet worth of console data.
pub const FRAME_LEN: usize = 64;

/// Capacity of a rendered response; `help` is the longest.
pub const RESPONSE_LEN: usize = 1024;

/// Frames buffered in each direction.
pub const REPL_QUEUE_DEPTH: usize = 8;

/// One USB packet of console bytes.
pub type ReplFrame = Vec<u8, FRAME_LEN>;

/// A complete console line.
pub type ReplLine = String<MAX_LINE_LEN>;

/// Rendered command response.
pub type ReplResponse = String<RESPONSE_LEN>;

/// Queue carrying console frames between the USB and REPL tasks.
pub type ReplQueue<M> = Channel<M, ReplFrame, REPL_QUEUE_DEPTH>;

/// Sending half of a [`ReplQueue`].
pub type ReplSender<'a, M> = Sender<'a, M, ReplFrame, REPL_QUEUE_DEPTH>;

/// Errors surfaced while assembling a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplError {
    /// Encountered non-UTF-8 data in the assembled line buffer.
    InvalidUtf8,
    /// Input exceeded [`MAX_LINE_LEN`]; the line was discarded.
    LineOverflow,
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
            ReplError::LineOverflow => f.write_str("line too long"),
        }
    }
}

/// Console state for one attached host.
pub struct ReplSession<'a> {
    executor: CommandExecutor<'a>,
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl<'a> ReplSession<'a> {
    #[must_use]
    pub fn new(control: &'a DetectorControl) -> Self {
        Self {
            executor: CommandExecutor::new(control),
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Drops any partial line, e.g. when the host reconnects.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Feeds a single byte. CR or LF completes the line.
    pub fn ingest(&mut self, byte: u8) -> Result<Option<ReplLine>, ReplError> {
        match byte {
            b'\r' | b'\n' => self.take_line(),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            value => {
                if self.overflowed {
                    return Ok(None);
                }
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                    return Err(ReplError::LineOverflow);
                }
                Ok(None)
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<ReplLine>, ReplError> {
        if self.overflowed {
            self.reset();
            return Ok(None);
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let result = str::from_utf8(self.buffer.as_slice())
            .map_err(|_| ReplError::InvalidUtf8)
            .map(|line| {
                let mut owned = ReplLine::new();
                // Same capacity as the buffer; cannot overflow.
                let _ = owned.push_str(line);
                owned
            });
        self.buffer.clear();
        result.map(Some)
    }

    /// Runs one line and renders the response.
    pub async fn respond<M, B, C, T>(
        &self,
        line: &str,
        lane: &Mutex<M, PinsetterCore<B, C, T>>,
    ) -> ReplResponse
    where
        M: RawMutex,
        B: SensorBank,
        C: Clock,
        T: TelemetrySink<C::Instant>,
    {
        let mut response = ReplResponse::new();
        let result = self.execute(line, lane).await;
        if render(&result, &mut response).is_err() {
            response.clear();
            let _ = response.push_str("ERR response too long");
        }
        response
    }

    async fn execute<M, B, C, T>(
        &self,
        line: &str,
        lane: &Mutex<M, PinsetterCore<B, C, T>>,
    ) -> Result<CommandOutcome, CommandError>
    where
        M: RawMutex,
        B: SensorBank,
        C: Clock,
        T: TelemetrySink<C::Instant>,
    {
        let command = CommandExecutor::parse(line)?;
        if command.needs_lane() {
            let mut lane = lane.lock().await;
            self.executor.execute(command, &mut *lane).await
        } else {
            self.executor.execute_detached(&command)
        }
    }
}

fn render(
    result: &Result<CommandOutcome, CommandError>,
    response: &mut ReplResponse,
) -> fmt::Result {
    match result {
        Ok(outcome) => {
            outcome.write_lines(response)?;
            if matches!(outcome, CommandOutcome::Status(_)) {
                response.write_char('\n')?;
                FirmwareCounters::snapshot().write_line(response)?;
            }
            Ok(())
        }
        Err(error) => write!(response, "ERR {error}"),
    }
}

/// Splits `text` into frames with CRLF line endings and a trailing CRLF.
pub fn frames(text: &str) -> impl Iterator<Item = ReplFrame> + '_ {
    let mut bytes = text
        .bytes()
        .flat_map(|byte| {
            let expanded: [Option<u8>; 2] = if byte == b'\n' {
                [Some(b'\r'), Some(b'\n')]
            } else {
                [Some(byte), None]
            };
            expanded.into_iter().flatten()
        })
        .chain([b'\r', b'\n'])
        .peekable();

    core::iter::from_fn(move || {
        bytes.peek()?;
        let mut frame = ReplFrame::new();
        while !frame.is_full() {
            match bytes.next() {
                Some(byte) => {
                    let _ = frame.push(byte);
                }
                None => break,
            }
        }
        Some(frame)
    })
}

/// Queues `text` for the host, waiting for room.
pub async fn send_text<M: RawMutex>(sender: &ReplSender<'_, M>, text: &str) {
    for frame in frames(text) {
        sender.send(frame).await;
    }
}

/// Queues `text` without waiting; returns `false` when frames were dropped.
pub fn try_send_text<M: RawMutex>(sender: &ReplSender<'_, M>, text: &str) -> bool {
    frames(text).all(|frame| sender.try_send(frame).is_ok())
}
