//! Package and service snapshot types returned by state queries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Homebrew distinguishes command-line formulae from application casks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Formula,
    Cask,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Formula => write!(f, "formula"),
            Self::Cask => write!(f, "cask"),
        }
    }
}

/// An installed package with every installed version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub kind: PackageKind,
    pub versions: Vec<String>,
}

/// A package with a newer version available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutdatedPackage {
    pub name: String,
    pub kind: PackageKind,
    pub installed_versions: Vec<String>,
    pub current_version: String,
    #[serde(default)]
    pub pinned: bool,
}

/// State reported by the service manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Started,
    Stopped,
    Scheduled,
    Error,
    None,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Scheduled => "scheduled",
            Self::Error => "error",
            Self::None => "none",
            Self::Unknown => "unknown",
        })
    }
}

/// One managed background service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}
