//! Console command dispatcher.
//!
//! Detector commands only flip [`DetectorControl`] flags and run without the
//! lane. Everything that moves the machine or reads the rack goes through
//! [`CommandExecutor::execute`], which needs `&mut PinsetterCore`, so callers
//! must hold the lane lock for the duration.

use core::fmt;
use core::time::Duration;

use super::catalog::{self, COMMANDS, CommandTag};
use super::grammar::{self, Command, DetectCommand, FrameCommand, ParseError};
use super::status::StatusFormatter;
use crate::detection::DetectorControl;
use crate::hardware::{Clock, SensorBank};
use crate::orchestrator::{CycleKind, LaneStatus, PinsetterCore};
use crate::rules::{FrameContext, FrameContextError};
use crate::telemetry::TelemetrySink;

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    /// A machine operation ran (or was queued).
    Cycle { command: CommandTag, cycle: CycleKind },
    Hold(bool),
    Detecting(bool),
    Threshold(u16),
    Debounce(Duration),
    GameContext(Option<FrameContext>),
    Status(LaneStatus),
    Pong,
    Help(Option<CommandTag>),
}

/// Errors surfaced while executing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    Parse(ParseError),
    Frame(FrameContextError),
    Unsupported(&'static str),
}

impl From<ParseError> for CommandError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<FrameContextError> for CommandError {
    fn from(error: FrameContextError) -> Self {
        Self::Frame(error)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::Frame(error) => error.fmt(f),
            CommandError::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

/// Dispatches parsed commands against the detector flags and the lane.
#[derive(Clone, Copy)]
pub struct CommandExecutor<'a> {
    control: &'a DetectorControl,
}

impl<'a> CommandExecutor<'a> {
    #[must_use]
    pub const fn new(control: &'a DetectorControl) -> Self {
        Self { control }
    }

    #[must_use]
    pub fn control(&self) -> &'a DetectorControl {
        self.control
    }

    /// Parses a line without executing it.
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        grammar::parse(line).map_err(CommandError::Parse)
    }

    /// Runs a command that does not need the lane.
    pub fn execute_detached(&self, command: &Command) -> Result<CommandOutcome, CommandError> {
        match command {
            Command::Hold(hold) => {
                self.control.set_hold(*hold);
                Ok(CommandOutcome::Hold(*hold))
            }
            Command::Detect(DetectCommand::Start) => {
                self.control.start();
                Ok(CommandOutcome::Detecting(true))
            }
            Command::Detect(DetectCommand::Stop) => {
                self.control.stop();
                Ok(CommandOutcome::Detecting(false))
            }
            Command::Detect(DetectCommand::Threshold(threshold)) => {
                self.control.set_threshold(*threshold);
                Ok(CommandOutcome::Threshold(self.control.threshold()))
            }
            Command::Detect(DetectCommand::Debounce(debounce)) => {
                self.control.set_debounce(*debounce);
                Ok(CommandOutcome::Debounce(self.control.debounce()))
            }
            Command::Ping => Ok(CommandOutcome::Pong),
            Command::Help(topic) => Ok(CommandOutcome::Help(*topic)),
            _ => Err(CommandError::Unsupported("command needs the lane")),
        }
    }

    /// Runs any command with exclusive access to the lane.
    pub async fn execute<B, C, T>(
        &self,
        command: Command,
        lane: &mut PinsetterCore<B, C, T>,
    ) -> Result<CommandOutcome, CommandError>
    where
        B: SensorBank,
        C: Clock,
        T: TelemetrySink<C::Instant>,
    {
        let tag = command.tag();
        let cycle = match command {
            Command::Reset { kind, immediate } => lane.schedule_reset(kind, immediate).await,
            Command::PinSet(target) => lane.pin_set(target).await,
            Command::Restore(target) => lane.pin_restore(target).await,
            Command::Emergency => lane.emergency_pin_reset().await,
            Command::Frame(update) => {
                let context = frame_context(update)?;
                lane.set_game_context(context.clone());
                return Ok(CommandOutcome::GameContext(context));
            }
            Command::Status => return Ok(CommandOutcome::Status(lane.status(self.control))),
            other => return self.execute_detached(&other),
        };

        Ok(CommandOutcome::Cycle {
            command: tag,
            cycle,
        })
    }
}

fn frame_context(update: FrameCommand) -> Result<Option<FrameContext>, FrameContextError> {
    match update {
        FrameCommand::Clear => Ok(None),
        FrameCommand::Set {
            bowler,
            frame,
            balls,
        } => {
            let index = frame
                .checked_sub(1)
                .ok_or(FrameContextError::FrameOutOfRange)?;
            FrameContext::with_balls(bowler, index, &balls).map(Some)
        }
    }
}

impl CommandOutcome {
    /// Renders the outcome as newline-separated lines.
    pub fn write_lines<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self {
            CommandOutcome::Cycle { command, cycle } => {
                write!(writer, "OK {} {cycle}", catalog::spec_for(*command).name)
            }
            CommandOutcome::Hold(hold) => {
                writer.write_str(if *hold { "OK hold on" } else { "OK hold off" })
            }
            CommandOutcome::Detecting(detecting) => writer.write_str(if *detecting {
                "OK detect start"
            } else {
                "OK detect stop"
            }),
            CommandOutcome::Threshold(threshold) => {
                write!(writer, "OK detect threshold={threshold}")
            }
            CommandOutcome::Debounce(debounce) => {
                write!(writer, "OK detect debounce={}ms", debounce.as_millis())
            }
            CommandOutcome::GameContext(Some(context)) => write!(writer, "OK frame {context}"),
            CommandOutcome::GameContext(None) => writer.write_str("OK frame cleared"),
            CommandOutcome::Status(status) => {
                let formatter = StatusFormatter::new(status);
                formatter.write_lane_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_pins_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_reset_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_machine_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_game_line(writer)
            }
            CommandOutcome::Pong => writer.write_str("pong"),
            CommandOutcome::Help(Some(tag)) => {
                let spec = catalog::spec_for(*tag);
                write!(writer, "usage: {}\n{}", spec.usage, spec.summary)
            }
            CommandOutcome::Help(None) => {
                for (index, spec) in COMMANDS.iter().enumerate() {
                    if index > 0 {
                        writer.write_char('\n')?;
                    }
                    write!(writer, "{} - {}", spec.usage, spec.summary)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    #[test]
    fn detached_commands_flip_detector_flags() {
        let control = DetectorControl::new(DetectorConfig::new(), true);
        let executor = CommandExecutor::new(&control);

        let hold = CommandExecutor::parse("hold on").expect("parse hold");
        assert_eq!(executor.execute_detached(&hold), Ok(CommandOutcome::Hold(true)));
        assert!(control.is_suspended());

        let stop = CommandExecutor::parse("detect stop").expect("parse stop");
        assert_eq!(
            executor.execute_detached(&stop),
            Ok(CommandOutcome::Detecting(false))
        );
        assert!(!control.is_detecting());

        let threshold = CommandExecutor::parse("detect threshold 0").expect("parse threshold");
        assert_eq!(
            executor.execute_detached(&threshold),
            Ok(CommandOutcome::Threshold(1))
        );
    }

    #[test]
    fn lane_commands_are_refused_without_the_lane() {
        let control = DetectorControl::new(DetectorConfig::new(), true);
        let executor = CommandExecutor::new(&control);
        let reset = CommandExecutor::parse("reset now").expect("parse reset");
        assert!(matches!(
            executor.execute_detached(&reset),
            Err(CommandError::Unsupported(_))
        ));
    }

    #[test]
    fn frame_numbers_are_one_based() {
        let context = frame_context(FrameCommand::Set {
            bowler: 2,
            frame: 10,
            balls: heapless::Vec::from_slice(&[15]).expect("one ball"),
        })
        .expect("valid frame")
        .expect("context present");
        assert!(context.is_final_frame());

        assert_eq!(
            frame_context(FrameCommand::Set {
                bowler: 0,
                frame: 0,
                balls: heapless::Vec::new(),
            }),
            Err(FrameContextError::FrameOutOfRange)
        );
    }

    #[test]
    fn renders_help_and_pong() {
        let mut rendered: heapless::String<1024> = heapless::String::new();
        CommandOutcome::Help(None)
            .write_lines(&mut rendered)
            .expect("help fits");
        assert_eq!(rendered.lines().count(), COMMANDS.len());

        let mut pong: heapless::String<8> = heapless::String::new();
        CommandOutcome::Pong.write_lines(&mut pong).expect("pong fits");
        assert_eq!(pong.as_str(), "pong");
    }
}
