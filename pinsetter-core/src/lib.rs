#![no_std]

// Pinsetter engine for a Canadian five-pin lane.
//
// The crate never touches registers or the standard library. Firmware and the
// host emulator provide the hardware traits in `hardware` and drive the
// engine through `orchestrator::PinsetterCore` and `detection`.

pub mod config;
pub mod detection;
pub mod hardware;
pub mod orchestrator;
pub mod pins;
pub mod repl;
pub mod rules;
pub mod scanner;
pub mod telemetry;
