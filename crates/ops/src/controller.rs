//! One-at-a-time operation lifecycle
//!
//! The controller owns the single operation slot. `start` claims it and
//! launches the process; `finish` drives the line stream to its end,
//! resolves the terminal status and, on success, reconciles state. Every
//! mutation goes through `&mut self`, so line appends, status transitions
//! and observer callbacks are sequenced on the task driving the controller.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use taphouse_errors::{Error, OpsError};
use taphouse_events::{AppEvent, EventEmitter, EventSender, FailureContext, OperationEvent};
use taphouse_platform::{PlatformContext, ProcessHandle, ProcessLauncher, RunningProcess};
use taphouse_types::{OperationKind, OperationStatus, OutputLine, ProcessExit, TerminationReason};
use uuid::Uuid;

use crate::observer::{Observers, OperationObserver, SubscriptionId};
use crate::reconcile::ResultReconciler;
use crate::request::OperationRequest;
use crate::types::{Operation, OperationReport, Reconciliation};
use crate::OpsCtx;

/// Cancels the running operation from another task while `finish` is
/// being awaited
#[derive(Debug, Clone)]
pub struct CancelHandle {
    process: ProcessHandle,
}

impl CancelHandle {
    /// Request termination. `false` if the process already exited or a
    /// cancel was already requested.
    pub fn cancel(&self) -> bool {
        self.process.cancel()
    }
}

struct Active {
    process: RunningProcess,
    command: String,
    started: Instant,
}

/// Owner of the single operation slot
pub struct OperationController {
    launcher: Arc<dyn ProcessLauncher>,
    reconciler: ResultReconciler,
    tx: Option<EventSender>,
    diagnostic_lines: usize,
    batch_limit: usize,
    operation: Operation,
    active: Option<Active>,
    observers: Observers,
}

impl OperationController {
    #[must_use]
    pub fn new(ctx: &OpsCtx) -> Self {
        Self {
            launcher: Arc::clone(&ctx.launcher),
            reconciler: ctx.reconciler(),
            tx: Some(ctx.tx.clone()),
            diagnostic_lines: ctx.config.runner.diagnostic_lines,
            batch_limit: ctx.config.runner.batch_limit,
            operation: Operation::default(),
            active: None,
            observers: Observers::default(),
        }
    }

    /// The current operation record
    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.operation.status
    }

    /// Every line of the current operation, in arrival order
    #[must_use]
    pub fn current_output_lines(&self) -> &[OutputLine] {
        &self.operation.output
    }

    pub fn subscribe(&mut self, observer: impl OperationObserver + 'static) -> SubscriptionId {
        self.observers.add(Box::new(observer))
    }

    /// Returns `false` if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    /// Claim the slot and launch the request's command.
    ///
    /// A command that cannot be launched is not an error here; it surfaces
    /// from `finish` as a failed operation.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning`, without launching anything, while another
    /// operation holds the slot.
    pub fn start(&mut self, request: OperationRequest) -> Result<(), Error> {
        if self.operation.status == OperationStatus::Running {
            self.emit_for_current(AppEvent::Operation(OperationEvent::Rejected {
                label: request.label,
                running_label: self.operation.label.clone(),
            }));
            return Err(OpsError::AlreadyRunning {
                label: self.operation.label.clone(),
            }
            .into());
        }

        if self.operation.status.is_terminal() {
            self.transition(OperationStatus::Idle);
        }

        let OperationRequest {
            kind,
            label,
            command,
        } = request;
        let correlation_id = Uuid::new_v4().to_string();
        self.operation = Operation::begin(kind.clone(), label.clone(), correlation_id.clone());

        self.emit_for_current(AppEvent::Operation(OperationEvent::Started { kind, label }));
        self.transition(OperationStatus::Running);

        let platform_ctx =
            PlatformContext::new(self.tx.clone()).with_correlation_id(correlation_id);
        let descriptor = command.descriptor().to_string();
        let process = self.launcher.start(&platform_ctx, command);
        self.active = Some(Active {
            process,
            command: descriptor,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Handle for cancelling from another task, `None` when nothing runs
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.active.as_ref().map(|active| CancelHandle {
            process: active.process.handle.clone(),
        })
    }

    /// Request termination of the running operation.
    ///
    /// The status stays Running until the process is reaped; `finish`
    /// reports Cancelled. Returns `false` when nothing is running, the
    /// process already exited, or a cancel was already requested.
    pub fn cancel(&mut self) -> bool {
        if self.operation.status != OperationStatus::Running {
            return false;
        }
        self.active
            .as_ref()
            .is_some_and(|active| active.process.handle.cancel())
    }

    /// Reset a terminal operation to Idle. Returns `false` while running.
    pub fn dismiss(&mut self) -> bool {
        match self.operation.status {
            OperationStatus::Running => false,
            OperationStatus::Idle => true,
            _ => {
                self.transition(OperationStatus::Idle);
                self.operation = Operation::default();
                true
            }
        }
    }

    /// Start and drive an operation to completion
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if another operation holds the slot.
    pub async fn run(&mut self, request: OperationRequest) -> Result<OperationReport, Error> {
        self.start(request)?;
        self.finish().await
    }

    /// Deliver every output line to observers, wait for the process to end,
    /// then settle the terminal status. Reconciliation runs once, only after
    /// success, and its failure is reported without changing the status.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no operation was started.
    pub async fn finish(&mut self) -> Result<OperationReport, Error> {
        if self.active.is_none() {
            return Err(OpsError::NotRunning.into());
        }

        // The process stays in the slot until it is reaped. Dropping this
        // future leaves the operation Running and resumable.
        let mut batch = Vec::with_capacity(self.batch_limit.max(1));
        loop {
            let Some(active) = self.active.as_mut() else {
                return Err(OpsError::NotRunning.into());
            };
            if active.process.lines.next_batch(&mut batch, self.batch_limit).await == 0 {
                break;
            }
            self.append(std::mem::take(&mut batch));
        }

        let exit = match self.active.as_mut() {
            Some(active) => (&mut active.process.completion).await,
            None => return Err(OpsError::NotRunning.into()),
        };
        let Some(Active {
            command, started, ..
        }) = self.active.take()
        else {
            return Err(OpsError::NotRunning.into());
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.operation.exit = Some(exit.clone());

        let (status, error) = self.classify(&exit, command);
        self.transition(status);
        self.emit_for_current(AppEvent::Operation(OperationEvent::Finished {
            status,
            exit_code: exit.exit_code,
            duration_ms,
            failure: error.as_ref().map(FailureContext::from_error),
        }));

        let reconciliation = if status == OperationStatus::Succeeded {
            let kind = self.current_kind();
            let outcome = self
                .reconciler
                .reconcile_correlated(&kind, self.operation.correlation_id.as_deref())
                .await;
            self.observers.reconciled(&outcome);
            Reconciliation::from_result(&outcome)
        } else {
            Reconciliation::Skipped
        };

        let tail = if status == OperationStatus::Succeeded {
            Vec::new()
        } else {
            self.operation.tail(self.diagnostic_lines)
        };

        Ok(OperationReport {
            kind: self.current_kind(),
            label: self.operation.label.clone(),
            status,
            exit_code: exit.exit_code,
            reason: exit.reason,
            started_at: self.operation.started_at.unwrap_or_else(Utc::now),
            finished_at: Utc::now(),
            duration_ms,
            lines: self.operation.output.len(),
            tail,
            error,
            reconciliation,
        })
    }

    fn classify(&self, exit: &ProcessExit, command: String) -> (OperationStatus, Option<OpsError>) {
        let label = self.operation.label.clone();
        match &exit.reason {
            _ if exit.is_success() => (OperationStatus::Succeeded, None),
            TerminationReason::Cancelled => {
                (OperationStatus::Cancelled, Some(OpsError::Cancelled { label }))
            }
            TerminationReason::SpawnFailed(source) => (
                OperationStatus::Failed,
                Some(OpsError::SpawnFailure {
                    command,
                    source: source.clone(),
                }),
            ),
            TerminationReason::SignalKilled => (
                OperationStatus::Failed,
                Some(OpsError::Killed {
                    label,
                    exit_code: exit.exit_code,
                }),
            ),
            TerminationReason::Exited => (
                OperationStatus::Failed,
                Some(OpsError::NonZeroExit {
                    label,
                    exit_code: exit.exit_code,
                    tail: self.operation.tail(self.diagnostic_lines),
                }),
            ),
        }
    }

    fn append(&mut self, lines: Vec<OutputLine>) {
        if lines.is_empty() {
            return;
        }
        let first_index = self.operation.output.len();
        self.observers.lines(first_index, &lines);
        self.emit_for_current(AppEvent::Operation(OperationEvent::LinesAppended {
            first_index,
            lines: lines.clone(),
        }));
        self.operation.output.extend(lines);
    }

    fn transition(&mut self, to: OperationStatus) {
        let from = self.operation.status;
        if from == to {
            return;
        }
        self.operation.status = to;
        tracing::debug!(%from, %to, label = %self.operation.label, "operation status");
        self.observers.state_change(from, to);
        self.emit_for_current(AppEvent::Operation(OperationEvent::StatusChanged { from, to }));
    }

    fn current_kind(&self) -> OperationKind {
        self.operation
            .kind
            .clone()
            .unwrap_or_else(|| OperationKind::Custom {
                name: self.operation.label.clone(),
            })
    }

    fn emit_for_current(&self, event: AppEvent) {
        match self.operation.correlation_id.as_deref() {
            Some(id) => self.emit_correlated(id, event),
            None => self.emit(event),
        }
    }
}

impl Drop for OperationController {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.process.handle.cancel();
        }
    }
}

impl EventEmitter for OperationController {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}
