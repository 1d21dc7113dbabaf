use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use embassy_futures::block_on;
use pinsetter_core::config::{DetectorConfig, LaneConfig};
use pinsetter_core::detection::{
    BallDetectionLoop, BallEvent, BallEventSink, DetectorControl, LaneHandle,
};
use pinsetter_core::hardware::{Clock, Hardware, InitFault};
use pinsetter_core::orchestrator::{PinsetterCore, ThrowOutcome};
use pinsetter_core::pins::{ALL_PINS, PIN_COUNT, PinName};
use pinsetter_core::repl::commands::{CommandExecutor, CommandOutcome};
use pinsetter_core::repl::status::write_ball_event;

use crate::sim::{BeamPulse, ClockMode, DEFAULT_HOME_DELAY, HostClock, SimulatedLane};
use crate::telemetry::{EmulatorTelemetry, TelemetryLine};
use crate::transcript::{TranscriptLogger, TranscriptRole};

pub const THROW_HELP: &str =
    "throw [<mask>|<pin>...] - roll a ball; mask is 5 digits (1=knocked) or pin labels";

/// Engine bound to the simulated lane.
pub type EmulatorLane = PinsetterCore<SimulatedLane, HostClock, EmulatorTelemetry>;

/// Startup options taken from the command line.
#[derive(Clone, Debug)]
pub struct EmulatorOptions {
    pub clock: ClockMode,
    pub home_sensor: bool,
    pub degraded: bool,
    pub home_delay: Duration,
    /// `(pin label, channel label)` overrides of the factory wiring.
    pub wiring: Vec<(String, String)>,
    pub transcript: Option<PathBuf>,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            clock: ClockMode::RealTime,
            home_sensor: true,
            degraded: false,
            home_delay: DEFAULT_HOME_DELAY,
            wiring: Vec::new(),
            transcript: None,
        }
    }
}

/// Reasons a session could not start.
#[derive(Debug)]
pub enum SetupError {
    /// Number of `--wire` pairs naming an unknown pin or channel.
    Wiring(usize),
    Transcript(io::Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Wiring(count) => {
                write!(f, "{count} wiring override(s) name an unknown pin or channel")
            }
            SetupError::Transcript(error) => write!(f, "cannot open transcript: {error}"),
        }
    }
}

impl std::error::Error for SetupError {}

/// One line of output for the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Telemetry(TelemetryLine),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Telemetry(line) => &line.text,
        }
    }
}

pub struct Session {
    lane: EmulatorLane,
    clock: HostClock,
    control: DetectorControl,
    detector: DetectorConfig,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(options: &EmulatorOptions) -> Result<Self, SetupError> {
        let mut config = LaneConfig::new();
        let ignored = config.apply_sensor_labels(
            options
                .wiring
                .iter()
                .map(|(pin, channel)| (pin.as_str(), channel.as_str())),
        );
        if ignored > 0 {
            return Err(SetupError::Wiring(ignored));
        }
        if !options.home_sensor {
            config = config.with_home_sensor(None);
        }

        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::create)
            .transpose()
            .map_err(SetupError::Transcript)?;

        let clock = HostClock::new(options.clock);
        let hardware = if options.degraded {
            Hardware::Degraded(InitFault::AnalogFrontEnd)
        } else {
            Hardware::Ready(SimulatedLane::new(
                clock.clone(),
                config,
                options.home_delay,
            ))
        };

        Ok(Self {
            lane: PinsetterCore::new(hardware, clock.clone(), config, EmulatorTelemetry::new()),
            clock,
            control: DetectorControl::new(config.detector, true),
            detector: config.detector,
            transcript,
        })
    }

    pub fn lane(&self) -> &EmulatorLane {
        &self.lane
    }

    /// Runs one operator line and returns everything to show, telemetry first.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<Reply>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.log(TranscriptRole::Operator, trimmed)?;

        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let texts = if word.eq_ignore_ascii_case("throw") {
            self.throw(rest.trim())
        } else if word.eq_ignore_ascii_case("help") && rest.trim().eq_ignore_ascii_case("throw") {
            vec![THROW_HELP.to_string()]
        } else {
            self.run_console(trimmed)
        };

        self.respond(texts)
    }

    /// Stands every pin before the session ends.
    pub fn shutdown(&mut self) -> io::Result<Vec<Reply>> {
        self.log(TranscriptRole::Operator, "shutdown")?;
        let cycle = block_on(self.lane.emergency_pin_reset());
        self.respond(vec![format!("shutdown emergency {cycle}")])
    }

    fn respond(&mut self, texts: Vec<String>) -> io::Result<Vec<Reply>> {
        let mut replies: Vec<Reply> = self
            .lane
            .telemetry_mut()
            .drain()
            .into_iter()
            .map(Reply::Telemetry)
            .collect();
        replies.extend(texts.into_iter().map(Reply::Text));

        for reply in &replies {
            self.log(TranscriptRole::Lane, reply.text())?;
        }
        Ok(replies)
    }

    fn run_console(&mut self, line: &str) -> Vec<String> {
        let executor = CommandExecutor::new(&self.control);
        let result = CommandExecutor::parse(line)
            .and_then(|command| block_on(executor.execute(command, &mut self.lane)));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => return vec![format!("ERR {error}")],
        };

        let mut rendered = String::new();
        // Writing into a String cannot fail.
        let _ = outcome.write_lines(&mut rendered);
        let mut lines: Vec<String> = rendered.lines().map(str::to_string).collect();
        match outcome {
            CommandOutcome::Help(None) => lines.push(THROW_HELP.to_string()),
            CommandOutcome::Status(_) => lines.push(self.emulator_line()),
            _ => {}
        }
        lines
    }

    /// Knocks the requested pins and rolls a ball through the entry beam.
    fn throw(&mut self, args: &str) -> Vec<String> {
        let knocked = match parse_knocked(args) {
            Ok(knocked) => knocked,
            Err(error) => return vec![format!("ERR {error}")],
        };
        if let Some(bank) = self.lane.hardware_mut().bank_mut() {
            bank.knock(&knocked);
        }

        let threshold = self.control.threshold();
        let mut detection = BallDetectionLoop::new(
            BeamPulse::new(threshold),
            self.clock.clone(),
            RecordingLane {
                lane: &mut self.lane,
                last: None,
            },
            ReplySink::default(),
            &self.control,
            self.detector,
        );

        // One poll per beam sample plus one to let the beam clear.
        for _ in 0..=threshold {
            if block_on(detection.poll_once()).is_some() {
                break;
            }
        }

        let mut lines = detection.sink().lines.clone();
        let last = detection.lane().last;
        if let Some(outcome) = last {
            lines.push(format!("cycle {} reason={}", outcome.cycle, outcome.reason));
        } else if lines.is_empty() {
            lines.push(self.missed_ball().to_string());
        }
        lines
    }

    fn missed_ball(&self) -> &'static str {
        if self.control.is_suspended() {
            "no ball: lane on hold"
        } else if !self.control.is_detecting() {
            "no ball: detector stopped"
        } else {
            "no ball: beam too short for the threshold"
        }
    }

    fn emulator_line(&self) -> String {
        let mode = self.clock.mode().label();
        match self.lane.hardware().bank() {
            Some(bank) => format!(
                "emulator clock={mode} deck={} home={} resets={}",
                bank.deck(),
                bank.is_home(),
                bank.resets
            ),
            None => format!("emulator clock={mode} hardware=degraded"),
        }
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let now = self.clock.now();
        match &mut self.transcript {
            Some(transcript) => transcript.append_line(now, role, line),
            None => Ok(()),
        }
    }
}

/// Lane handle that remembers the last throw it ran.
struct RecordingLane<'a> {
    lane: &'a mut EmulatorLane,
    last: Option<ThrowOutcome>,
}

impl LaneHandle for RecordingLane<'_> {
    async fn process_throw(&mut self) -> ThrowOutcome {
        let outcome = self.lane.process_throw().await;
        self.last = Some(outcome);
        outcome
    }
}

/// Renders ball events the way the firmware console does.
#[derive(Default)]
struct ReplySink {
    lines: Vec<String>,
}

impl BallEventSink<Duration> for ReplySink {
    fn ball_detected(&mut self, event: &BallEvent<Duration>) {
        let mut line = String::new();
        let _ = write_ball_event(&mut line, event, event.detected_at);
        self.lines.push(line);
    }

    fn ball_ignored(&mut self, at: Duration) {
        self.lines
            .push(format!("ball ignored inside debounce t={}ms", at.as_millis()));
    }
}

/// Pins knocked by a throw: empty for a gutter ball, a 5-digit mask with
/// `1` for each knocked pin, or pin labels.
fn parse_knocked(args: &str) -> Result<Vec<PinName>, String> {
    let usage = || "usage: throw [<mask>|<pin>...]".to_string();

    if args.is_empty() {
        return Ok(Vec::new());
    }

    let bytes = args.as_bytes();
    if bytes.len() == PIN_COUNT && bytes.iter().all(|byte| matches!(byte, b'0' | b'1')) {
        return Ok(ALL_PINS
            .iter()
            .zip(bytes)
            .filter(|(_, bit)| **bit == b'1')
            .map(|(pin, _)| pin.name)
            .collect());
    }

    args.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
        .map(|word| PinName::from_label(word).ok_or_else(usage))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pinsetter_core::pins::ControlMap;
    use pinsetter_core::telemetry::TelemetryEventKind;

    use super::*;

    fn options() -> EmulatorOptions {
        EmulatorOptions {
            clock: ClockMode::Virtual,
            ..EmulatorOptions::default()
        }
    }

    fn session() -> Session {
        Session::new(&options()).expect("session")
    }

    fn texts(session: &mut Session, line: &str) -> Vec<String> {
        session
            .handle_command(line)
            .expect("command")
            .into_iter()
            .filter_map(|reply| match reply {
                Reply::Text(text) => Some(text),
                Reply::Telemetry(_) => None,
            })
            .collect()
    }

    #[test]
    fn full_rack_knocked_is_a_strike() {
        let mut session = session();
        let lines = texts(&mut session, "throw 11111");

        assert!(
            lines[0].starts_with("ball pins=00000 changes=11111 value=15 status=strike"),
            "{lines:?}"
        );
        assert_eq!(lines[1], "cycle full-reset (strike) reason=strike");

        let bank = session.lane().hardware().bank().expect("ready");
        assert_eq!(bank.deck(), ControlMap::all_standing());
    }

    #[test]
    fn head_pin_runs_a_partial_cycle_and_stays_held() {
        let mut session = session();
        let lines = texts(&mut session, "throw 00100");

        assert!(
            lines[0].starts_with("ball pins=11011 changes=00100 value=5 status=partial"),
            "{lines:?}"
        );
        assert_eq!(lines[1], "cycle partial (reached+4050ms) reason=none");

        let status = texts(&mut session, "status");
        assert!(status.contains(&"pins standing=11011 down=cFive".to_string()), "{status:?}");
        let last = status.last().expect("emulator line");
        assert!(last.starts_with("emulator clock=virtual deck=11011"), "{last}");
    }

    #[test]
    fn second_ball_clears_the_remaining_pins() {
        let mut session = session();
        texts(&mut session, "throw lTwo");
        let lines = texts(&mut session, "throw lThree cFive rThree rTwo");

        assert!(
            lines[0].starts_with("ball pins=00000 changes=01111 value=13 status=strike"),
            "{lines:?}"
        );
        assert_eq!(lines[1], "cycle full-reset (strike) reason=strike");
    }

    #[test]
    fn throws_emit_engine_telemetry() {
        let mut session = session();
        let replies = session.handle_command("throw 00100").expect("command");

        assert!(matches!(replies.first(), Some(Reply::Telemetry(_))));
        assert!(
            replies
                .iter()
                .any(|reply| reply.text().contains("position-reached")),
            "{replies:?}"
        );
        assert_eq!(
            session
                .lane()
                .telemetry()
                .recorder()
                .count(TelemetryEventKind::BallDetected),
            1
        );
    }

    #[test]
    fn shutdown_stands_the_rack() {
        let mut session = session();
        texts(&mut session, "throw 00100");

        let replies = session.shutdown().expect("shutdown");

        assert_eq!(
            replies.last().map(Reply::text),
            Some("shutdown emergency direct (reached+4050ms)")
        );
        let bank = session.lane().hardware().bank().expect("ready");
        assert_eq!(bank.deck(), ControlMap::all_standing());
        assert!(session.lane().store().control.is_all_standing());
        assert_eq!(
            session
                .lane()
                .telemetry()
                .recorder()
                .count(TelemetryEventKind::EmergencyReset),
            1
        );
    }

    #[test]
    fn held_lane_ignores_the_ball() {
        let mut session = session();
        assert_eq!(texts(&mut session, "hold"), vec!["OK hold on".to_string()]);
        assert_eq!(
            texts(&mut session, "throw 10000"),
            vec!["no ball: lane on hold".to_string()]
        );

        texts(&mut session, "detect stop");
        texts(&mut session, "hold off");
        assert_eq!(
            texts(&mut session, "throw"),
            vec!["no ball: detector stopped".to_string()]
        );
    }

    #[test]
    fn help_lists_the_throw_command() {
        let mut session = session();
        let help = texts(&mut session, "help");
        assert_eq!(help.last().map(String::as_str), Some(THROW_HELP));
        assert!(help[0].starts_with("reset "));
        assert_eq!(texts(&mut session, "HELP throw"), vec![THROW_HELP.to_string()]);
    }

    #[test]
    fn malformed_input_is_reported() {
        let mut session = session();
        assert_eq!(
            texts(&mut session, "throw 2"),
            vec!["ERR usage: throw [<mask>|<pin>...]".to_string()]
        );
        let unknown = texts(&mut session, "launch");
        assert!(unknown[0].starts_with("ERR unknown command"), "{unknown:?}");
    }

    #[test]
    fn lane_without_home_sensor_uses_the_fixed_wait() {
        let mut session = Session::new(&EmulatorOptions {
            home_sensor: false,
            ..options()
        })
        .expect("session");

        assert_eq!(
            texts(&mut session, "pinset 01111"),
            vec!["OK pinset direct (fixed+5500ms)".to_string()]
        );
    }

    #[test]
    fn degraded_hardware_still_answers() {
        let mut session = Session::new(&EmulatorOptions {
            degraded: true,
            ..options()
        })
        .expect("session");

        let status = texts(&mut session, "status");
        assert!(status[0].contains("fault=analog front-end"), "{status:?}");
        assert_eq!(
            status.last().map(String::as_str),
            Some("emulator clock=virtual hardware=degraded")
        );
    }

    #[test]
    fn wiring_overrides_are_validated() {
        let rewired = Session::new(&EmulatorOptions {
            wiring: vec![("cFive".to_string(), "B12".to_string())],
            ..options()
        })
        .expect("session");
        assert_eq!(
            rewired.lane().config().pin_channels[PinName::CenterFive.as_index()],
            pinsetter_core::hardware::AnalogChannel::B12
        );

        let rejected = Session::new(&EmulatorOptions {
            wiring: vec![("kingpin".to_string(), "B10".to_string())],
            ..options()
        });
        assert!(matches!(rejected, Err(SetupError::Wiring(1))));
    }

    #[test]
    fn transcript_records_both_sides() {
        let path = std::env::temp_dir().join(format!(
            "pinsetter-emulator-{}.log",
            std::process::id()
        ));
        let mut session = Session::new(&EmulatorOptions {
            transcript: Some(path.clone()),
            ..options()
        })
        .expect("session");
        texts(&mut session, "ping");
        drop(session);

        let contents = fs::read_to_string(&path).expect("transcript");
        let _ = fs::remove_file(&path);
        assert!(contents.contains("HOST> ping"), "{contents}");
        assert!(contents.contains("LANE< pong"), "{contents}");
    }
}
