//! Configuration sections shared across crates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use taphouse_types::{ColorChoice, OutputFormat};

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

/// Process runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Send stderr through the stdout pipe so lines keep their write order
    #[serde(default = "default_true")]
    pub merge_stderr: bool,
    /// Number of trailing output lines kept as failure diagnostics
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,
    /// Time between SIGTERM and SIGKILL after a cancel request
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// How long to keep reading pipes after the process exited
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Upper bound on lines delivered in one observer notification
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Strip terminal escapes before display (the stored log keeps them)
    #[serde(default = "default_true")]
    pub strip_ansi: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            merge_stderr: true,
            diagnostic_lines: default_diagnostic_lines(),
            terminate_grace_ms: default_terminate_grace_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            batch_limit: default_batch_limit(),
            strip_ansi: true,
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Post-operation reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delay before re-reading service status after a control action.
    /// Service managers apply changes asynchronously; the right value is
    /// host-specific.
    #[serde(default = "default_service_settle_ms")]
    pub service_settle_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            service_settle_ms: default_service_settle_ms(),
        }
    }
}

impl ReconcileConfig {
    #[must_use]
    pub fn service_settle(&self) -> Duration {
        Duration::from_millis(self.service_settle_ms)
    }
}

/// Package manager invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrewConfig {
    #[serde(default = "default_brew_executable")]
    pub executable: String,
    /// Working directory for every brew invocation
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment passed to every brew invocation
    #[serde(default = "default_brew_env")]
    pub env: BTreeMap<String, String>,
}

impl Default for BrewConfig {
    fn default() -> Self {
        Self {
            executable: default_brew_executable(),
            working_dir: None,
            env: default_brew_env(),
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_true() -> bool {
    true
}

fn default_diagnostic_lines() -> usize {
    20
}

fn default_terminate_grace_ms() -> u64 {
    3000
}

fn default_drain_timeout_ms() -> u64 {
    2000
}

fn default_batch_limit() -> usize {
    64
}

fn default_service_settle_ms() -> u64 {
    1500
}

fn default_brew_executable() -> String {
    "brew".to_string()
}

fn default_brew_env() -> BTreeMap<String, String> {
    // Keep brew from running `update` implicitly inside other commands
    BTreeMap::from([("HOMEBREW_NO_AUTO_UPDATE".to_string(), "1".to_string())])
}
