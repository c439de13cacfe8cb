//! Homebrew state queries

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use taphouse_config::BrewConfig;
use taphouse_errors::ReconcileError;
use taphouse_platform::{collect_output, PlatformCommand, PlatformContext, ProcessLauncher};
use taphouse_types::{
    InstalledPackage, OutdatedPackage, PackageKind, ServiceInfo, StreamKind,
};

use crate::reconcile::PackageQuery;

/// [`PackageQuery`] backed by the `brew` command line.
///
/// The launcher should keep stderr separate: brew prints warnings on stderr
/// that would otherwise end up inside the JSON it prints on stdout.
pub struct BrewQuery {
    launcher: Arc<dyn ProcessLauncher>,
    brew: BrewConfig,
    ctx: PlatformContext,
}

impl BrewQuery {
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>, brew: BrewConfig) -> Self {
        Self {
            launcher,
            brew,
            ctx: PlatformContext::default(),
        }
    }

    /// Emit process events for query invocations through `ctx`
    #[must_use]
    pub fn with_context(mut self, ctx: PlatformContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Run `brew <args>` and return its stdout
    async fn run(&self, query: &str, args: &[&str]) -> Result<String, ReconcileError> {
        let mut cmd = PlatformCommand::new(self.brew.executable.as_str());
        cmd.args(args);
        for (key, value) in &self.brew.env {
            cmd.env(key.as_str(), value.as_str());
        }
        if let Some(dir) = &self.brew.working_dir {
            cmd.current_dir(dir);
        }

        let output = collect_output(self.launcher.as_ref(), &self.ctx, cmd).await;
        let (stderr, stdout): (Vec<_>, Vec<_>) = output
            .lines
            .into_iter()
            .partition(|line| line.stream == StreamKind::Stderr);

        if !output.exit.is_success() {
            let detail = stderr
                .iter()
                .chain(stdout.iter())
                .rev()
                .map(|line| line.display_text())
                .find(|text| !text.trim().is_empty())
                .map_or_else(
                    || format!("exit code {}", output.exit.exit_code),
                    |text| format!("exit code {}: {}", output.exit.exit_code, text.trim()),
                );
            return Err(ReconcileError::QueryFailed {
                query: query.to_string(),
                message: detail,
            });
        }

        Ok(stdout
            .into_iter()
            .map(|line| line.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl PackageQuery for BrewQuery {
    async fn list_installed_packages(&self) -> Result<Vec<InstalledPackage>, ReconcileError> {
        let formulae = self
            .run("installed", &["list", "--formula", "--versions"])
            .await?;
        let casks = self
            .run("installed", &["list", "--cask", "--versions"])
            .await?;

        let mut packages = parse_versions(&formulae, PackageKind::Formula);
        packages.extend(parse_versions(&casks, PackageKind::Cask));
        Ok(packages)
    }

    async fn list_outdated_packages(&self) -> Result<Vec<OutdatedPackage>, ReconcileError> {
        let json = self.run("outdated", &["outdated", "--json=v2"]).await?;
        parse_outdated(&json)
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>, ReconcileError> {
        let json = self.run("services", &["services", "list", "--json"]).await?;
        parse_services(&json)
    }
}

/// Parse `brew list --versions` output: `<name> <version>...` per line
#[must_use]
pub fn parse_versions(text: &str, kind: PackageKind) -> Vec<InstalledPackage> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            Some(InstalledPackage {
                name: name.to_string(),
                kind,
                versions: fields.map(str::to_string).collect(),
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct OutdatedReport {
    #[serde(default)]
    formulae: Vec<OutdatedEntry>,
    #[serde(default)]
    casks: Vec<OutdatedEntry>,
}

#[derive(Deserialize)]
struct OutdatedEntry {
    name: String,
    #[serde(default)]
    installed_versions: Vec<String>,
    current_version: String,
    #[serde(default)]
    pinned: bool,
}

impl OutdatedEntry {
    fn into_package(self, kind: PackageKind) -> OutdatedPackage {
        OutdatedPackage {
            name: self.name,
            kind,
            installed_versions: self.installed_versions,
            current_version: self.current_version,
            pinned: self.pinned,
        }
    }
}

/// Parse `brew outdated --json=v2`
///
/// # Errors
///
/// Returns an error if the text is not the expected JSON document.
pub fn parse_outdated(json: &str) -> Result<Vec<OutdatedPackage>, ReconcileError> {
    let report: OutdatedReport =
        serde_json::from_str(json).map_err(|e| ReconcileError::ParseFailed {
            query: "outdated".to_string(),
            message: e.to_string(),
        })?;
    Ok(report
        .formulae
        .into_iter()
        .map(|entry| entry.into_package(PackageKind::Formula))
        .chain(
            report
                .casks
                .into_iter()
                .map(|entry| entry.into_package(PackageKind::Cask)),
        )
        .collect())
}

/// Parse `brew services list --json`. Empty output means no services.
///
/// # Errors
///
/// Returns an error if the text is not a JSON array of services.
pub fn parse_services(json: &str) -> Result<Vec<ServiceInfo>, ReconcileError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json).map_err(|e| ReconcileError::ParseFailed {
        query: "services".to_string(),
        message: e.to_string(),
    })
}
