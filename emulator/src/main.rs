mod session;
mod sim;
mod telemetry;
mod transcript;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use crossterm::style::Stylize;
use pinsetter_core::telemetry::Severity;

use session::{EmulatorOptions, Reply, Session};
use sim::ClockMode;

const USAGE: &str = "Usage: pinsetter-emulator [--fast] [--no-home-sensor] [--degraded] \
[--home-delay <ms>] [--wire <pin>=<channel>]... [--transcript <path>]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(&options).unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let color = stdout.is_terminal();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Five-pin pinsetter emulator ready ({} clock). Type `help` for commands or `exit` to quit.",
        options.clock.label()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            break;
        }

        for reply in session.handle_command(trimmed)? {
            write_reply(&mut writer, &reply, color)?;
        }
    }

    for reply in session.shutdown()? {
        write_reply(&mut writer, &reply, color)?;
    }
    writeln!(writer, "Session closed.")?;
    Ok(())
}

fn write_reply<W: Write>(writer: &mut W, reply: &Reply, color: bool) -> io::Result<()> {
    match reply {
        Reply::Text(text) if color && text.starts_with("ERR ") => {
            writeln!(writer, "{}", text.as_str().red())
        }
        Reply::Telemetry(line) if color => {
            let text = line.text.as_str();
            match line.severity {
                Severity::Info => writeln!(writer, "{}", text.dark_grey()),
                Severity::Warn => writeln!(writer, "{}", text.yellow()),
                Severity::Error => writeln!(writer, "{}", text.red().bold()),
            }
        }
        other => writeln!(writer, "{}", other.text()),
    }
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options<I>(args: I) -> Result<EmulatorOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = EmulatorOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {name}"))
        };

        match flag.as_str() {
            "--fast" => options.clock = ClockMode::Virtual,
            "--no-home-sensor" => options.home_sensor = false,
            "--degraded" => options.degraded = true,
            "--home-delay" => {
                let raw = value("--home-delay")?;
                let millis = raw
                    .trim_end_matches("ms")
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --home-delay `{raw}`"))?;
                options.home_delay = Duration::from_millis(millis);
            }
            "--wire" => {
                let raw = value("--wire")?;
                let (pin, channel) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("Expected <pin>=<channel>, got `{raw}`"))?;
                options.wiring.push((pin.to_string(), channel.to_string()));
            }
            "--transcript" => options.transcript = Some(PathBuf::from(value("--transcript")?)),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<EmulatorOptions, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_to_a_real_time_lane() {
        let options = parse(&[]).expect("defaults");
        assert_eq!(options.clock, ClockMode::RealTime);
        assert!(options.home_sensor);
        assert!(!options.degraded);
    }

    #[test]
    fn parses_flags_and_values() {
        let options = parse(&[
            "--fast",
            "--no-home-sensor",
            "--home-delay=2500ms",
            "--wire=cFive=B12",
            "--transcript",
            "lane.log",
        ])
        .expect("options");

        assert_eq!(options.clock, ClockMode::Virtual);
        assert!(!options.home_sensor);
        assert_eq!(options.home_delay, Duration::from_millis(2_500));
        assert_eq!(
            options.wiring,
            vec![("cFive".to_string(), "B12".to_string())]
        );
        assert_eq!(options.transcript, Some(PathBuf::from("lane.log")));
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(parse(&["--turbo"]).is_err());
        assert_eq!(
            parse(&["--home-delay"]).err().as_deref(),
            Some("Expected value after --home-delay")
        );
        assert!(parse(&["--wire", "cFive"]).is_err());
    }

    #[test]
    fn errors_are_plain_without_a_terminal() {
        let mut out = Vec::new();
        write_reply(&mut out, &Reply::Text("ERR nope".to_string()), false).expect("write");
        assert_eq!(out, b"ERR nope\n");
    }
}
