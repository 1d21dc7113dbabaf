#![allow(clippy::module_name_repetitions)]

//! Parser for operator console lines.
//!
//! The command keyword is resolved through the [`catalog`](super::catalog)
//! and the remaining text is parsed with `winnow` combinators straight over
//! the `&str`, so nothing here allocates.

use core::fmt;
use core::time::Duration;

use heapless::Vec;
use winnow::ascii::{Caseless, dec_uint, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::catalog::{self, CommandTag};
use crate::orchestrator::ResetKind;
use crate::pins::{ControlMap, PIN_COUNT, PinName};
use crate::rules::MAX_BALLS_PER_FRAME;

/// Console parse failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand,
    /// The keyword was recognized but its arguments were not; `offset` is the
    /// byte position in the trimmed line where parsing stopped.
    InvalidArguments { command: CommandTag, offset: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand => f.write_str("unknown command (try `help`)"),
            ParseError::InvalidArguments { command, offset } => write!(
                f,
                "usage: {} (column {})",
                catalog::spec_for(*command).usage,
                offset + 1
            ),
        }
    }
}

/// Detector sub-commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectCommand {
    Start,
    Stop,
    Threshold(u16),
    Debounce(Duration),
}

/// Game context updates. Frame numbers are one-based as typed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameCommand {
    Set {
        bowler: u8,
        frame: u8,
        balls: Vec<u8, MAX_BALLS_PER_FRAME>,
    },
    Clear,
}

/// Parsed console command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Reset { kind: ResetKind, immediate: bool },
    PinSet(ControlMap),
    Restore(ControlMap),
    Hold(bool),
    Detect(DetectCommand),
    Frame(FrameCommand),
    Emergency,
    Status,
    Ping,
    Help(Option<CommandTag>),
}

impl Command {
    #[must_use]
    pub const fn tag(&self) -> CommandTag {
        match self {
            Command::Reset { .. } => CommandTag::Reset,
            Command::PinSet(_) => CommandTag::PinSet,
            Command::Restore(_) => CommandTag::Restore,
            Command::Hold(_) => CommandTag::Hold,
            Command::Detect(_) => CommandTag::Detect,
            Command::Frame(_) => CommandTag::Frame,
            Command::Emergency => CommandTag::Emergency,
            Command::Status => CommandTag::Status,
            Command::Ping => CommandTag::Ping,
            Command::Help(_) => CommandTag::Help,
        }
    }

    /// Whether the command must hold the lane lock to run.
    #[must_use]
    pub const fn needs_lane(&self) -> bool {
        matches!(
            self,
            Command::Reset { .. }
                | Command::PinSet(_)
                | Command::Restore(_)
                | Command::Frame(_)
                | Command::Emergency
                | Command::Status
        )
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let split = line
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(line.len());
    let (name, rest) = line.split_at(split);
    let spec = catalog::find(name).ok_or(ParseError::UnknownCommand)?;

    let mut arguments: fn(&mut &str) -> ModalResult<Command> = match spec.tag {
        CommandTag::Reset => reset_args,
        CommandTag::PinSet => pinset_args,
        CommandTag::Restore => restore_args,
        CommandTag::Hold => hold_args,
        CommandTag::Detect => detect_args,
        CommandTag::Frame => frame_args,
        CommandTag::Emergency => |_: &mut &str| Ok(Command::Emergency),
        CommandTag::Status => |_: &mut &str| Ok(Command::Status),
        CommandTag::Ping => |_: &mut &str| Ok(Command::Ping),
        CommandTag::Help => help_args,
    };

    arguments
        .parse(rest)
        .map_err(|error| ParseError::InvalidArguments {
            command: spec.tag,
            offset: split + error.offset(),
        })
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .parse_next(input)
}

fn gap<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    space1.parse_next(input)
}

fn keyword<'a>(
    expected: &'static str,
) -> impl Parser<&'a str, &'a str, ErrMode<ContextError>> {
    move |input: &mut &'a str| Caseless(expected).parse_next(input)
}

fn byte(input: &mut &str) -> ModalResult<u8> {
    dec_uint.parse_next(input)
}

fn count(input: &mut &str) -> ModalResult<u16> {
    dec_uint.parse_next(input)
}

fn millis(input: &mut &str) -> ModalResult<u32> {
    dec_uint.parse_next(input)
}

fn reset_args(input: &mut &str) -> ModalResult<Command> {
    let kind = opt(preceded(gap, word.verify_map(ResetKind::from_word))).parse_next(input)?;
    let immediate = opt(preceded(gap, keyword("now"))).parse_next(input)?;
    Ok(Command::Reset {
        kind: kind.unwrap_or(ResetKind::Full),
        immediate: immediate.is_some(),
    })
}

fn pinset_args(input: &mut &str) -> ModalResult<Command> {
    preceded(gap, pin_mask).map(Command::PinSet).parse_next(input)
}

fn restore_args(input: &mut &str) -> ModalResult<Command> {
    preceded(gap, pin_mask).map(Command::Restore).parse_next(input)
}

fn pin_mask(input: &mut &str) -> ModalResult<ControlMap> {
    alt((digit_mask, labelled_mask)).parse_next(input)
}

/// Five `0`/`1` digits in pin order, `1` meaning standing.
fn digit_mask(input: &mut &str) -> ModalResult<ControlMap> {
    let digits = take_while(PIN_COUNT, ['0', '1']).parse_next(input)?;
    let mut bits = [0u8; PIN_COUNT];
    for (slot, digit) in bits.iter_mut().zip(digits.bytes()) {
        *slot = u8::from(digit == b'1');
    }
    Ok(ControlMap::from_bits(bits))
}

/// `label=0|1` pairs; unnamed pins stay standing.
fn labelled_mask(input: &mut &str) -> ModalResult<ControlMap> {
    let mut map = ControlMap::all_standing();
    loop {
        let (pin, _, bit) = (
            word.verify_map(PinName::from_label),
            '=',
            one_of(['0', '1']),
        )
            .parse_next(input)?;
        map.set_standing(pin, bit == '1');

        if opt(gap).parse_next(input)?.is_none() {
            return Ok(map);
        }
    }
}

fn hold_args(input: &mut &str) -> ModalResult<Command> {
    let hold = opt(preceded(
        gap,
        alt((keyword("on").value(true), keyword("off").value(false))),
    ))
    .parse_next(input)?;
    Ok(Command::Hold(hold.unwrap_or(true)))
}

fn detect_args(input: &mut &str) -> ModalResult<Command> {
    preceded(
        gap,
        alt((
            keyword("start").value(DetectCommand::Start),
            keyword("stop").value(DetectCommand::Stop),
            preceded((keyword("threshold"), gap), count).map(DetectCommand::Threshold),
            preceded(
                (keyword("debounce"), gap),
                terminated(millis, opt(keyword("ms"))),
            )
            .map(|value| DetectCommand::Debounce(Duration::from_millis(u64::from(value)))),
        )),
    )
    .map(Command::Detect)
    .parse_next(input)
}

fn frame_args(input: &mut &str) -> ModalResult<Command> {
    preceded(
        gap,
        alt((keyword("clear").value(FrameCommand::Clear), frame_values)),
    )
    .map(Command::Frame)
    .parse_next(input)
}

fn frame_values(input: &mut &str) -> ModalResult<FrameCommand> {
    let bowler = byte.parse_next(input)?;
    let frame = preceded(gap, byte).parse_next(input)?;

    let mut balls = Vec::new();
    while balls.len() < MAX_BALLS_PER_FRAME {
        match opt(preceded(gap, byte)).parse_next(input)? {
            Some(value) => {
                let _ = balls.push(value);
            }
            None => break,
        }
    }

    Ok(FrameCommand::Set {
        bowler,
        frame,
        balls,
    })
}

fn help_args(input: &mut &str) -> ModalResult<Command> {
    let topic = opt(preceded(
        gap,
        word.verify_map(|name| catalog::find(name).map(|spec| spec.tag)),
    ))
    .parse_next(input)?;
    Ok(Command::Help(topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(line: &str) -> Command {
        parse(line).unwrap_or_else(|error| panic!("`{line}` failed: {error}"))
    }

    #[test]
    fn parses_reset_variants() {
        assert_eq!(
            parse_ok("reset"),
            Command::Reset {
                kind: ResetKind::Full,
                immediate: false
            }
        );
        assert_eq!(
            parse_ok("reset now"),
            Command::Reset {
                kind: ResetKind::Full,
                immediate: true
            }
        );
        assert_eq!(
            parse_ok("RESET Pins"),
            Command::Reset {
                kind: ResetKind::Pins,
                immediate: false
            }
        );
        assert_eq!(
            parse_ok("reset full now"),
            Command::Reset {
                kind: ResetKind::Full,
                immediate: true
            }
        );
    }

    #[test]
    fn parses_digit_and_labelled_masks() {
        assert_eq!(
            parse_ok("pinset 01111"),
            Command::PinSet(ControlMap::all_standing().with_down(PinName::LeftTwo))
        );
        assert_eq!(
            parse_ok("restore cFive=0 rTwo=0"),
            Command::Restore(
                ControlMap::all_standing()
                    .with_down(PinName::CenterFive)
                    .with_down(PinName::RightTwo)
            )
        );
    }

    #[test]
    fn rejects_malformed_masks() {
        for line in ["pinset 0111", "pinset 011110", "pinset 01121", "pinset kingpin=0", "pinset"] {
            match parse(line) {
                Err(ParseError::InvalidArguments { command, .. }) => {
                    assert_eq!(command, CommandTag::PinSet, "{line}");
                }
                other => panic!("unexpected result for `{line}`: {other:?}"),
            }
        }
    }

    #[test]
    fn parses_hold_and_detect() {
        assert_eq!(parse_ok("hold"), Command::Hold(true));
        assert_eq!(parse_ok("hold off"), Command::Hold(false));
        assert_eq!(parse_ok("detect stop"), Command::Detect(DetectCommand::Stop));
        assert_eq!(
            parse_ok("detect threshold 12"),
            Command::Detect(DetectCommand::Threshold(12))
        );
        assert_eq!(
            parse_ok("detect debounce 400ms"),
            Command::Detect(DetectCommand::Debounce(Duration::from_millis(400)))
        );
    }

    #[test]
    fn parses_frame_context() {
        match parse_ok("frame 1 10 15 15") {
            Command::Frame(FrameCommand::Set {
                bowler,
                frame,
                balls,
            }) => {
                assert_eq!((bowler, frame), (1, 10));
                assert_eq!(balls.as_slice(), &[15, 15]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(parse_ok("frame clear"), Command::Frame(FrameCommand::Clear));
        assert!(parse("frame 0 3 1 2 3 4").is_err());
    }

    #[test]
    fn parses_help_topics_and_simple_commands() {
        assert_eq!(parse_ok("help"), Command::Help(None));
        assert_eq!(parse_ok("help pinset"), Command::Help(Some(CommandTag::PinSet)));
        assert_eq!(parse_ok("  ping  "), Command::Ping);
        assert_eq!(parse_ok("status"), Command::Status);
        assert!(parse("status now").is_err());
    }

    #[test]
    fn reports_empty_and_unknown_lines() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("reboot"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn lane_commands_are_flagged() {
        assert!(parse_ok("status").needs_lane());
        assert!(parse_ok("reset").needs_lane());
        assert!(!parse_ok("hold").needs_lane());
        assert!(!parse_ok("detect start").needs_lane());
    }
}
