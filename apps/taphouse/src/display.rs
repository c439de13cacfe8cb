//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use std::io::{self, Write};
use taphouse_ops::{OperationObserver, OperationReport, Reconciliation};
use taphouse_types::{
    ColorChoice, InstalledPackage, OperationStatus, OutdatedPackage, OutputLine, ServiceInfo,
    ServiceStatus, StreamKind,
};

/// Final result of a command
pub enum CommandOutput {
    Report(OperationReport),
    Installed(Vec<InstalledPackage>),
    Outdated(Vec<OutdatedPackage>),
    Services(Vec<ServiceInfo>),
}

impl CommandOutput {
    /// Process exit code for this result
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Report(report) => match report.status {
                OperationStatus::Succeeded => 0,
                OperationStatus::Cancelled => 130,
                _ => 1,
            },
            _ => 0,
        }
    }

    fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Report(report) => serde_json::to_string_pretty(report),
            Self::Installed(packages) => serde_json::to_string_pretty(packages),
            Self::Outdated(packages) => serde_json::to_string_pretty(packages),
            Self::Services(services) => serde_json::to_string_pretty(services),
        }
    }
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    pub fn render(&self, output: &CommandOutput) -> io::Result<()> {
        if self.json_output {
            let json = output.to_json().map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        match output {
            CommandOutput::Report(report) => self.render_report(report),
            CommandOutput::Installed(packages) => self.render_installed(packages),
            CommandOutput::Outdated(packages) => self.render_outdated(packages),
            CommandOutput::Services(services) => self.render_services(services),
        }
    }

    fn render_report(&self, report: &OperationReport) -> io::Result<()> {
        let seconds = Seconds(report.duration_ms);
        println!();
        match report.status {
            OperationStatus::Succeeded => {
                let line = format!("[OK] {} ({seconds}, {} lines)", report.label, report.lines);
                println!("{}", self.paint(Style::new().green().bold(), &line));
            }
            OperationStatus::Cancelled => {
                let line = format!("[CANCELLED] {} after {seconds}", report.label);
                println!("{}", self.paint(Style::new().yellow().bold(), &line));
            }
            _ => {
                let line = format!("[FAILED] {} (exit {})", report.label, report.exit_code);
                println!("{}", self.paint(Style::new().red().bold(), &line));
                if let Some(error) = &report.error {
                    println!("  {error}");
                }
            }
        }

        match &report.reconciliation {
            Reconciliation::Skipped => {}
            Reconciliation::Refreshed { sections, .. } if sections.is_empty() => {}
            Reconciliation::Refreshed { sections, .. } => {
                println!("Refreshed: {}", sections.join(", "));
            }
            Reconciliation::Failed { failure, .. } => {
                let line = format!("Package state may be stale: {}", failure.message);
                println!("{}", self.paint(Style::new().yellow(), &line));
                if let Some(hint) = &failure.hint {
                    println!("  Hint: {hint}");
                }
            }
        }
        Ok(())
    }

    fn render_installed(&self, packages: &[InstalledPackage]) -> io::Result<()> {
        if packages.is_empty() {
            println!("No packages installed.");
            return Ok(());
        }

        let mut table = self.table(&["Package", "Kind", "Versions"]);
        for package in packages {
            table.add_row(vec![
                Cell::new(&package.name),
                Cell::new(package.kind),
                Cell::new(package.versions.join(", ")),
            ]);
        }
        self.print_table(&table)
    }

    fn render_outdated(&self, packages: &[OutdatedPackage]) -> io::Result<()> {
        if packages.is_empty() {
            println!("Everything is up to date.");
            return Ok(());
        }

        let mut table = self.table(&["Package", "Kind", "Installed", "Latest", "Pinned"]);
        for package in packages {
            let pinned = if package.pinned {
                Cell::new("yes").fg(Color::Yellow)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(&package.name),
                Cell::new(package.kind),
                Cell::new(package.installed_versions.join(", ")),
                Cell::new(&package.current_version).fg(Color::Green),
                pinned,
            ]);
        }
        self.print_table(&table)
    }

    fn render_services(&self, services: &[ServiceInfo]) -> io::Result<()> {
        if services.is_empty() {
            println!("No services available.");
            return Ok(());
        }

        let mut table = self.table(&["Service", "Status", "User", "Exit code"]);
        for service in services {
            table.add_row(vec![
                Cell::new(&service.name),
                format_service_status(service.status),
                Cell::new(service.user.as_deref().unwrap_or("-")),
                Cell::new(
                    service
                        .exit_code
                        .map_or_else(|| "-".to_string(), |code| code.to_string()),
                ),
            ]);
        }
        self.print_table(&table)
    }

    fn table(&self, header: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.supports_color() {
            table.force_no_tty();
        }
        table.set_header(
            header
                .iter()
                .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
        );
        table
    }

    fn print_table(&self, table: &Table) -> io::Result<()> {
        self.term.write_line(&table.to_string())
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.supports_color() {
            style.force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

fn format_service_status(status: ServiceStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        ServiceStatus::Started => cell.fg(Color::Green),
        ServiceStatus::Error => cell.fg(Color::Red),
        ServiceStatus::Scheduled => cell.fg(Color::Blue),
        _ => cell,
    }
}

/// Milliseconds shown as seconds with one decimal
struct Seconds(u64);

impl std::fmt::Display for Seconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}s", self.0 / 1000, (self.0 % 1000) / 100)
    }
}

/// Prints operation output as it arrives. Stderr lines go to stderr when
/// the streams are kept apart.
pub struct LiveLog {
    keep_escapes: bool,
}

impl LiveLog {
    /// `keep_escapes` passes terminal escapes through untouched
    pub fn new(keep_escapes: bool) -> Self {
        Self { keep_escapes }
    }

    fn text<'a>(&self, line: &'a OutputLine) -> std::borrow::Cow<'a, str> {
        if self.keep_escapes {
            std::borrow::Cow::Borrowed(line.text.as_str())
        } else {
            line.display_text()
        }
    }
}

impl OperationObserver for LiveLog {
    fn on_lines(&mut self, _first_index: usize, lines: &[OutputLine]) {
        let mut stdout = io::stdout().lock();
        for line in lines {
            let text = self.text(line);
            // A closed stdout (e.g. piped into `head`) must not abort the operation
            let _ = if line.stream == StreamKind::Stderr {
                writeln!(io::stderr(), "{text}")
            } else {
                writeln!(stdout, "{text}")
            };
        }
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taphouse_types::{OperationKind, TerminationReason};

    fn report(status: OperationStatus) -> OperationReport {
        OperationReport {
            kind: OperationKind::Update,
            label: "Updating package index".to_string(),
            status,
            exit_code: 0,
            reason: TerminationReason::Exited,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1234,
            lines: 3,
            tail: Vec::new(),
            error: None,
            reconciliation: Reconciliation::Skipped,
        }
    }

    #[test]
    fn test_exit_codes() {
        let succeeded = CommandOutput::Report(report(OperationStatus::Succeeded));
        let failed = CommandOutput::Report(report(OperationStatus::Failed));
        let cancelled = CommandOutput::Report(report(OperationStatus::Cancelled));
        assert_eq!(succeeded.exit_code(), 0);
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(cancelled.exit_code(), 130);
        assert_eq!(CommandOutput::Services(Vec::new()).exit_code(), 0);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Seconds(1234).to_string(), "1.2s");
        assert_eq!(Seconds(80).to_string(), "0.0s");
        assert_eq!(Seconds(61_950).to_string(), "61.9s");
    }

    #[test]
    fn test_live_log_strips_escapes() {
        let line = OutputLine::new(StreamKind::Combined, "\x1b[32m==>\x1b[0m Pouring wget");
        assert_eq!(LiveLog::new(false).text(&line), "==> Pouring wget");
        assert_eq!(LiveLog::new(true).text(&line), line.text);
    }

    #[test]
    fn test_json_report_shape() {
        let output = CommandOutput::Report(report(OperationStatus::Succeeded));
        let value: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["reconciliation"]["outcome"], "skipped");
        assert!(value.get("error").is_none());
    }
}
