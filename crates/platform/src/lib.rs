#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform layer for running external commands.
//!
//! This crate launches a child process, turns its output pipes into an
//! ordered stream of decoded lines, and reports exactly one completion per
//! launch, including launches that fail before the child exists. Process
//! lifecycle steps are emitted on the event channel of the supplied
//! [`PlatformContext`].

pub mod core;
pub mod process;

pub use crate::core::PlatformContext;
pub use process::lines::LineSplitter;
pub use process::runner::ProcessRunner;
pub use process::{
    collect_output, CollectedOutput, Completion, LineStream, PlatformCommand, ProcessHandle,
    ProcessLauncher, RunningProcess,
};
