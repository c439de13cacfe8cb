//! Structured logging integration for events
//!
//! Converts every event coming off the channel into a tracing record with
//! structured fields, so debug log files carry the full operation history
//! keyed by correlation id.

use taphouse_events::{
    AppEvent, EventMessage, GeneralEvent, OperationEvent, ProcessEvent, ReconcileEvent,
};
use tracing::{debug, error, info, trace, warn};

/// Log an event at the level its kind implies
pub fn log_event_with_tracing(message: &EventMessage) {
    match &message.event {
        AppEvent::General(event) => log_general(message, event),
        AppEvent::Process(event) => log_process(message, event),
        AppEvent::Operation(event) => log_operation(message, event),
        AppEvent::Reconcile(event) => log_reconcile(message, event),
    }
}

fn log_general(message: &EventMessage, event: &GeneralEvent) {
    let meta = &message.meta;
    match event {
        GeneralEvent::Warning {
            message: text,
            context,
        } => {
            warn!(
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                context = ?context,
                "{text}"
            );
        }
        GeneralEvent::Debug {
            message: text,
            context,
        } => {
            debug!(
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                context = ?context,
                "{text}"
            );
        }
    }
}

fn log_process(message: &EventMessage, event: &ProcessEvent) {
    let meta = &message.meta;
    match event {
        ProcessEvent::Started { command, pid } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                command = %command,
                cwd = ?command.cwd,
                pid = ?pid,
                "Process started"
            );
        }
        ProcessEvent::SpawnFailed { command, failure } => {
            error!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                command = %command,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Process spawn failed"
            );
        }
        ProcessEvent::CancelRequested { pid } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                pid,
                "SIGTERM sent to process group"
            );
        }
        ProcessEvent::KillEscalated { pid, grace_ms } => {
            warn!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                pid,
                grace_ms,
                "Process ignored SIGTERM, sent SIGKILL"
            );
        }
        ProcessEvent::OutputReadFailed { message: text } => {
            warn!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                error = %text,
                "Reading process output failed"
            );
        }
        ProcessEvent::Exited {
            command,
            exit,
            duration_ms,
            lines,
        } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                command = %command,
                exit_code = exit.exit_code,
                reason = ?exit.reason,
                duration_ms,
                lines,
                "Process exited"
            );
        }
    }
}

fn log_operation(message: &EventMessage, event: &OperationEvent) {
    let meta = &message.meta;
    match event {
        OperationEvent::Started { kind, label } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                kind = %kind,
                label = %label,
                "Operation started"
            );
        }
        OperationEvent::Rejected {
            label,
            running_label,
        } => {
            warn!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                label = %label,
                running = %running_label,
                "Operation rejected while another is running"
            );
        }
        OperationEvent::LinesAppended { first_index, lines } => {
            trace!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                first_index,
                count = lines.len(),
                "Output appended"
            );
        }
        OperationEvent::StatusChanged { from, to } => {
            debug!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                from = %from,
                to = %to,
                "Operation status changed"
            );
        }
        OperationEvent::Finished {
            status,
            exit_code,
            duration_ms,
            failure,
        } => match failure {
            Some(failure) => {
                error!(
                    source = meta.source.as_str(),
                    correlation = ?meta.correlation_id,
                    status = %status,
                    exit_code,
                    duration_ms,
                    code = ?failure.code,
                    message = %failure.message,
                    "Operation finished"
                );
            }
            None => {
                info!(
                    source = meta.source.as_str(),
                    correlation = ?meta.correlation_id,
                    status = %status,
                    exit_code,
                    duration_ms,
                    "Operation finished"
                );
            }
        },
    }
}

fn log_reconcile(message: &EventMessage, event: &ReconcileEvent) {
    let meta = &message.meta;
    match event {
        ReconcileEvent::Started { trigger, queries } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                trigger = %trigger,
                queries = ?queries,
                "State refresh started"
            );
        }
        ReconcileEvent::Settling { delay_ms } => {
            debug!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                delay_ms,
                "Waiting for services to settle"
            );
        }
        ReconcileEvent::QueryCompleted { query, items } => {
            debug!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                query = %query,
                items,
                "State query completed"
            );
        }
        ReconcileEvent::Completed {
            queries,
            duration_ms,
        } => {
            info!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                queries,
                duration_ms,
                "State refresh completed"
            );
        }
        ReconcileEvent::Failed { query, failure } => {
            warn!(
                source = meta.source.as_str(),
                correlation = ?meta.correlation_id,
                query = %query,
                code = ?failure.code,
                message = %failure.message,
                retryable = failure.retryable,
                "State refresh failed"
            );
        }
    }
}
