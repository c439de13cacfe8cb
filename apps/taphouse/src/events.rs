//! Event handling and user feedback
//!
//! Operation output itself is printed by the live log observer; this
//! handler reports what happens around it: cancellation, kill escalation,
//! state refresh and warnings.

use console::Style;
use taphouse_events::{
    AppEvent, EventMessage, GeneralEvent, OperationEvent, ProcessEvent, ReconcileEvent,
};

use crate::logging::log_event_with_tracing;

/// Event handler for status display
pub struct EventHandler {
    colors_enabled: bool,
    debug_enabled: bool,
    /// Nothing but the final JSON document goes to stdout or stderr
    quiet: bool,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, debug_enabled: bool, quiet: bool) -> Self {
        Self {
            colors_enabled,
            debug_enabled,
            quiet,
        }
    }

    /// Handle incoming event
    pub fn handle_event(&self, message: EventMessage) {
        log_event_with_tracing(&message);
        if self.quiet {
            return;
        }

        match message.event {
            AppEvent::Operation(event) => self.handle_operation(event),
            AppEvent::Process(event) => self.handle_process(event),
            AppEvent::Reconcile(event) => self.handle_reconcile(event),
            AppEvent::General(event) => self.handle_general(event),
        }
    }

    fn handle_operation(&self, event: OperationEvent) {
        match event {
            OperationEvent::Started { label, .. } => {
                self.show_status(&format!("==> {label}"));
            }
            OperationEvent::Rejected { running_label, .. } => {
                self.show_warning(&format!("{running_label} is still running"));
            }
            OperationEvent::StatusChanged { from, to } if self.debug_enabled => {
                self.show_debug(&format!("status {from} -> {to}"));
            }
            _ => {}
        }
    }

    fn handle_process(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::CancelRequested { pid } => {
                self.show_status(&format!("Cancelling (pid {pid})..."));
            }
            ProcessEvent::KillEscalated { grace_ms, .. } => {
                self.show_warning(&format!(
                    "Process still running after {grace_ms}ms, killing it"
                ));
            }
            ProcessEvent::OutputReadFailed { message } => {
                self.show_warning(&format!("Output lost: {message}"));
            }
            ProcessEvent::Started { command, pid } if self.debug_enabled => {
                let pid = pid.map_or_else(|| "?".to_string(), |pid| pid.to_string());
                self.show_debug(&format!("spawned {command} (pid {pid})"));
            }
            ProcessEvent::Exited {
                exit, duration_ms, ..
            } if self.debug_enabled => {
                self.show_debug(&format!(
                    "exited with {} after {duration_ms}ms",
                    exit.exit_code
                ));
            }
            _ => {}
        }
    }

    fn handle_reconcile(&self, event: ReconcileEvent) {
        match event {
            ReconcileEvent::Started { queries, .. } => {
                self.show_status(&format!("Refreshing {}", queries.join(", ")));
            }
            ReconcileEvent::Settling { delay_ms } => {
                self.show_status(&format!("Waiting {delay_ms}ms for services to settle"));
            }
            ReconcileEvent::Failed { query, failure } => {
                self.show_warning(&format!(
                    "Could not refresh {query}: {}",
                    failure.message
                ));
            }
            ReconcileEvent::QueryCompleted { query, items } if self.debug_enabled => {
                self.show_debug(&format!("{query}: {items} entries"));
            }
            _ => {}
        }
    }

    fn handle_general(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                let text = match context {
                    Some(context) => format!("{message} ({context})"),
                    None => message,
                };
                self.show_warning(&text);
            }
            GeneralEvent::Debug { message, context } if self.debug_enabled => {
                let text = match context {
                    Some(context) => format!("{message} ({context})"),
                    None => message,
                };
                self.show_debug(&text);
            }
            GeneralEvent::Debug { .. } => {}
        }
    }

    fn show_status(&self, message: &str) {
        eprintln!("{}", self.paint(Style::new().cyan().bold(), message));
    }

    fn show_warning(&self, message: &str) {
        eprintln!("{}", self.paint(Style::new().yellow(), &format!("warning: {message}")));
    }

    fn show_debug(&self, message: &str) {
        eprintln!("{}", self.paint(Style::new().dim(), &format!("[debug] {message}")));
    }

    fn paint(&self, style: Style, message: &str) -> String {
        if self.colors_enabled {
            style.force_styling(true).apply_to(message).to_string()
        } else {
            message.to_string()
        }
    }
}
