//! Operation requests for the Homebrew command vocabulary

use std::path::{Path, PathBuf};
use taphouse_config::BrewConfig;
use taphouse_errors::{Error, OpsError};
use taphouse_platform::PlatformCommand;
use taphouse_types::{OperationKind, ServiceAction};

/// A command to run in the operation slot, with what it means for state
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub label: String,
    pub command: PlatformCommand,
}

impl OperationRequest {
    /// Request with the kind's default label
    #[must_use]
    pub fn new(kind: OperationKind, command: PlatformCommand) -> Self {
        Self {
            label: kind.default_label(),
            kind,
            command,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// `brew install <packages>`
    ///
    /// # Errors
    ///
    /// Returns an error if `packages` is empty or a name looks like a flag.
    pub fn install(brew: &BrewConfig, packages: Vec<String>) -> Result<Self, Error> {
        validate_packages(&packages, true)?;
        let mut cmd = brew_command(brew);
        cmd.arg("install").args(&packages);
        Ok(Self::new(OperationKind::Install { packages }, cmd))
    }

    /// `brew uninstall <packages>`
    ///
    /// # Errors
    ///
    /// Returns an error if `packages` is empty or a name looks like a flag.
    pub fn uninstall(brew: &BrewConfig, packages: Vec<String>) -> Result<Self, Error> {
        validate_packages(&packages, true)?;
        let mut cmd = brew_command(brew);
        cmd.arg("uninstall").args(&packages);
        Ok(Self::new(OperationKind::Uninstall { packages }, cmd))
    }

    /// `brew upgrade [packages]`, everything outdated when `packages` is empty
    ///
    /// # Errors
    ///
    /// Returns an error if a name looks like a flag.
    pub fn upgrade(brew: &BrewConfig, packages: Vec<String>) -> Result<Self, Error> {
        validate_packages(&packages, false)?;
        let mut cmd = brew_command(brew);
        cmd.arg("upgrade").args(&packages);
        Ok(Self::new(OperationKind::Upgrade { packages }, cmd))
    }

    /// `brew update`
    #[must_use]
    pub fn update(brew: &BrewConfig) -> Self {
        let mut cmd = brew_command(brew);
        cmd.arg("update");
        Self::new(OperationKind::Update, cmd)
    }

    /// `brew cleanup`
    #[must_use]
    pub fn cleanup(brew: &BrewConfig) -> Self {
        let mut cmd = brew_command(brew);
        cmd.arg("cleanup");
        Self::new(OperationKind::Cleanup, cmd)
    }

    /// `brew bundle --file <path>`
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is empty.
    pub fn import_brewfile(brew: &BrewConfig, path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = non_empty_path(path.into(), "Brewfile path")?;
        let mut cmd = brew_command(brew);
        cmd.args(["bundle", "--file"]).arg(path_arg(&path));
        Ok(Self::new(OperationKind::ImportBrewfile { path }, cmd))
    }

    /// `brew services <action> <name>`
    ///
    /// # Errors
    ///
    /// Returns an error if `service` is empty or looks like a flag.
    pub fn service(
        brew: &BrewConfig,
        action: ServiceAction,
        service: impl Into<String>,
    ) -> Result<Self, Error> {
        let service = service.into();
        validate_packages(std::slice::from_ref(&service), true)?;
        let mut cmd = brew_command(brew);
        cmd.args(["services", action.as_str(), service.as_str()]);
        Ok(Self::new(OperationKind::ServiceControl { action, service }, cmd))
    }

    /// `xattr -dr com.apple.quarantine <path>`
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is empty.
    pub fn remove_quarantine(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = non_empty_path(path.into(), "path")?;
        let mut cmd = PlatformCommand::new("xattr");
        cmd.args(["-dr", "com.apple.quarantine"]).arg(path_arg(&path));
        Ok(Self::new(OperationKind::RemoveQuarantine { path }, cmd))
    }

    /// Any command, reconciled like a change of installed packages
    ///
    /// # Errors
    ///
    /// Returns an error if the command has no program.
    pub fn custom(label: impl Into<String>, command: PlatformCommand) -> Result<Self, Error> {
        if command.program().trim().is_empty() {
            return Err(invalid("command must name a program"));
        }
        let label = label.into();
        Ok(Self::new(
            OperationKind::Custom {
                name: label.clone(),
            },
            command,
        ))
    }
}

fn brew_command(brew: &BrewConfig) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(brew.executable.as_str());
    for (key, value) in &brew.env {
        cmd.env(key.as_str(), value.as_str());
    }
    if let Some(dir) = &brew.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

fn validate_packages(packages: &[String], required: bool) -> Result<(), Error> {
    if required && packages.is_empty() {
        return Err(invalid("at least one name is required"));
    }
    if let Some(bad) = packages
        .iter()
        .find(|name| name.trim().is_empty() || name.starts_with('-'))
    {
        return Err(invalid(format!("invalid name: {bad:?}")));
    }
    Ok(())
}

fn non_empty_path(path: PathBuf, what: &str) -> Result<PathBuf, Error> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{what} is empty")));
    }
    Ok(path)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn invalid(message: impl Into<String>) -> Error {
    OpsError::InvalidRequest {
        message: message.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brew() -> BrewConfig {
        BrewConfig {
            executable: "/opt/homebrew/bin/brew".into(),
            ..BrewConfig::default()
        }
    }

    #[test]
    fn test_install_command() {
        let request = OperationRequest::install(&brew(), vec!["wget".into(), "jq".into()]).unwrap();
        assert_eq!(request.label, "Installing wget, jq");
        assert_eq!(request.command.program(), "/opt/homebrew/bin/brew");
        assert_eq!(request.command.get_args(), ["install", "wget", "jq"]);
        assert!(request
            .command
            .get_env_vars()
            .iter()
            .any(|(k, v)| k == "HOMEBREW_NO_AUTO_UPDATE" && v == "1"));
    }

    #[test]
    fn test_rejects_flag_like_names() {
        assert!(OperationRequest::install(&brew(), vec!["--force".into()]).is_err());
        assert!(OperationRequest::uninstall(&brew(), Vec::new()).is_err());
        assert!(OperationRequest::upgrade(&brew(), Vec::new()).is_ok());
    }

    #[test]
    fn test_service_and_bundle_commands() {
        let request =
            OperationRequest::service(&brew(), ServiceAction::Restart, "postgresql@16").unwrap();
        assert_eq!(
            request.command.get_args(),
            ["services", "restart", "postgresql@16"]
        );

        let request = OperationRequest::import_brewfile(&brew(), "/tmp/Brewfile").unwrap();
        assert_eq!(request.command.get_args(), ["bundle", "--file", "/tmp/Brewfile"]);
        assert!(matches!(request.kind, OperationKind::ImportBrewfile { .. }));
    }

    #[test]
    fn test_remove_quarantine_command() {
        let request = OperationRequest::remove_quarantine("/Applications/Foo.app").unwrap();
        assert_eq!(request.command.program(), "xattr");
        assert_eq!(
            request.command.get_args(),
            ["-dr", "com.apple.quarantine", "/Applications/Foo.app"]
        );
        assert!(OperationRequest::remove_quarantine("").is_err());
    }

    #[test]
    fn test_custom_label() {
        let mut cmd = PlatformCommand::new("pkgtool");
        cmd.args(["install", "foo"]);
        let request = OperationRequest::custom("Run pkgtool", cmd)
            .unwrap()
            .with_label("Installing foo via pkgtool");
        assert_eq!(request.label, "Installing foo via pkgtool");
        assert_eq!(request.kind.name(), "custom");
    }
}
