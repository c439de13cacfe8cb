//! Operation and process outcome types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use taphouse_errors::PlatformError;

/// Control action for a background service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl clap::ValueEnum for ServiceAction {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Start, Self::Stop, Self::Restart]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// What a user-initiated operation does. Drives which state is re-read once
/// the operation succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    Install { packages: Vec<String> },
    Uninstall { packages: Vec<String> },
    Upgrade { packages: Vec<String> },
    Update,
    Cleanup,
    ImportBrewfile { path: PathBuf },
    ServiceControl {
        action: ServiceAction,
        service: String,
    },
    RemoveQuarantine { path: PathBuf },
    Custom { name: String },
}

impl OperationKind {
    /// Stable short name used in events and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Uninstall { .. } => "uninstall",
            Self::Upgrade { .. } => "upgrade",
            Self::Update => "update",
            Self::Cleanup => "cleanup",
            Self::ImportBrewfile { .. } => "import_brewfile",
            Self::ServiceControl { .. } => "service_control",
            Self::RemoveQuarantine { .. } => "remove_quarantine",
            Self::Custom { .. } => "custom",
        }
    }

    /// Human-readable description used when the caller gives no label
    #[must_use]
    pub fn default_label(&self) -> String {
        match self {
            Self::Install { packages } => format!("Installing {}", packages.join(", ")),
            Self::Uninstall { packages } => format!("Uninstalling {}", packages.join(", ")),
            Self::Upgrade { packages } if packages.is_empty() => "Upgrading all packages".into(),
            Self::Upgrade { packages } => format!("Upgrading {}", packages.join(", ")),
            Self::Update => "Updating package index".into(),
            Self::Cleanup => "Cleaning up".into(),
            Self::ImportBrewfile { path } => format!("Importing {}", path.display()),
            Self::ServiceControl { action, service } => {
                let verb = match action {
                    ServiceAction::Start => "Starting",
                    ServiceAction::Stop => "Stopping",
                    ServiceAction::Restart => "Restarting",
                };
                format!("{verb} {service}")
            }
            Self::RemoveQuarantine { path } => {
                format!("Removing quarantine from {}", path.display())
            }
            Self::Custom { name } => name.clone(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of the single operation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Succeeded, Failed or Cancelled
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Why a process stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "error", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The process exited on its own
    Exited,
    /// Termination was requested through the cancel handle
    Cancelled,
    /// The process died from a signal nobody here sent
    SignalKilled,
    /// The process never started
    SpawnFailed(PlatformError),
}

/// Final result of one process invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    /// Exit code, `-signal` for signal deaths, 127/126/-1 for spawn failures
    pub exit_code: i32,
    pub reason: TerminationReason,
}

impl ProcessExit {
    #[must_use]
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            reason: TerminationReason::Exited,
        }
    }

    #[must_use]
    pub fn spawn_failed(error: PlatformError) -> Self {
        Self {
            exit_code: error.spawn_exit_code(),
            reason: TerminationReason::SpawnFailed(error),
        }
    }

    /// Exited normally with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.reason == TerminationReason::Exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels() {
        let kind = OperationKind::Install {
            packages: vec!["foo".into()],
        };
        assert_eq!(kind.default_label(), "Installing foo");

        let kind = OperationKind::ServiceControl {
            action: ServiceAction::Restart,
            service: "postgresql@16".into(),
        };
        assert_eq!(kind.default_label(), "Restarting postgresql@16");
        assert_eq!(kind.name(), "service_control");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OperationStatus::Idle.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_process_exit_success() {
        assert!(ProcessExit::exited(0).is_success());
        assert!(!ProcessExit::exited(1).is_success());
        let cancelled = ProcessExit {
            exit_code: 0,
            reason: TerminationReason::Cancelled,
        };
        assert!(!cancelled.is_success());

        let failed = ProcessExit::spawn_failed(PlatformError::CommandNotFound {
            command: "pkgtool".into(),
        });
        assert_eq!(failed.exit_code, 127);
        assert!(!failed.is_success());
    }

    #[test]
    fn test_kind_serialization() {
        let kind = OperationKind::ImportBrewfile {
            path: PathBuf::from("/tmp/Brewfile"),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"kind":"import_brewfile","path":"/tmp/Brewfile"}"#);
    }
}
