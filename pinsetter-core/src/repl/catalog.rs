//! Console command catalog.
//!
//! The grammar resolves keywords through this table and the `help` command
//! renders it, so names and usage strings stay in one place.

/// Top-level console commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Reset,
    PinSet,
    Restore,
    Hold,
    Detect,
    Frame,
    Emergency,
    Status,
    Ping,
    Help,
}

/// Static description of a console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: [CommandSpec; 10] = [
    CommandSpec {
        name: "reset",
        tag: CommandTag::Reset,
        usage: "reset [full|pins] [now]",
        summary: "full reset now, or defer a full reset to the next cycle",
    },
    CommandSpec {
        name: "pinset",
        tag: CommandTag::PinSet,
        usage: "pinset <mask>",
        summary: "set an arbitrary rack; mask is 5 digits (1=standing) or lTwo=0 pairs",
    },
    CommandSpec {
        name: "restore",
        tag: CommandTag::Restore,
        usage: "restore <mask>",
        summary: "record a rack and run a partial cycle to realize it",
    },
    CommandSpec {
        name: "hold",
        tag: CommandTag::Hold,
        usage: "hold [on|off]",
        summary: "suspend or resume reacting to balls",
    },
    CommandSpec {
        name: "detect",
        tag: CommandTag::Detect,
        usage: "detect start|stop|threshold <n>|debounce <ms>",
        summary: "control the ball detector",
    },
    CommandSpec {
        name: "frame",
        tag: CommandTag::Frame,
        usage: "frame <bowler> <frame 1-10> [ball values...] | frame clear",
        summary: "update the game context used by the frame rules",
    },
    CommandSpec {
        name: "emergency",
        tag: CommandTag::Emergency,
        usage: "emergency",
        summary: "stand every pin",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "show lane state",
    },
    CommandSpec {
        name: "ping",
        tag: CommandTag::Ping,
        usage: "ping",
        summary: "liveness check",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command]",
        summary: "list commands or show usage",
    },
];

/// Case-insensitive keyword lookup.
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Catalog entry for a tag.
#[must_use]
pub fn spec_for(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Reset => &COMMANDS[0],
        CommandTag::PinSet => &COMMANDS[1],
        CommandTag::Restore => &COMMANDS[2],
        CommandTag::Hold => &COMMANDS[3],
        CommandTag::Detect => &COMMANDS[4],
        CommandTag::Frame => &COMMANDS[5],
        CommandTag::Emergency => &COMMANDS[6],
        CommandTag::Status => &COMMANDS[7],
        CommandTag::Ping => &COMMANDS[8],
        CommandTag::Help => &COMMANDS[9],
    }
}
