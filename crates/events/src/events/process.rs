//! External process lifecycle events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use taphouse_types::ProcessExit;

use super::FailureContext;

/// Command line recorded with process events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessCommandDescriptor {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl std::fmt::Display for ProcessCommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// Child process spawned
    Started {
        command: ProcessCommandDescriptor,
        pid: Option<u32>,
    },

    /// The command could not be launched
    SpawnFailed {
        command: ProcessCommandDescriptor,
        failure: FailureContext,
    },

    /// SIGTERM sent to the process group
    CancelRequested { pid: u32 },

    /// Grace period elapsed, SIGKILL sent
    KillEscalated { pid: u32, grace_ms: u64 },

    /// Reading a pipe failed; the rest of that pipe is lost
    OutputReadFailed { message: String },

    /// Process reaped and both pipes drained
    Exited {
        command: ProcessCommandDescriptor,
        exit: ProcessExit,
        duration_ms: u64,
        lines: u64,
    },
}
