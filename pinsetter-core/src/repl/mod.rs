//! Operator console shared between firmware and emulator targets.
//!
//! Lines are parsed by [`grammar`], dispatched by [`commands`], and rendered
//! through [`status`]; all three stay `no_std`.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
