//! Subscriptions to operation progress

use taphouse_errors::ReconcileError;
use taphouse_state::RefreshedState;
use taphouse_types::{OperationStatus, OutputLine};

/// Receives every line append and every status transition of the
/// controller's operation, in order, on the task driving the controller.
///
/// All methods default to doing nothing.
pub trait OperationObserver: Send {
    /// `lines` start at position `first_index` of the operation log
    fn on_lines(&mut self, first_index: usize, lines: &[OutputLine]) {
        let _ = (first_index, lines);
    }

    fn on_state_change(&mut self, from: OperationStatus, to: OperationStatus) {
        let _ = (from, to);
    }

    /// Called once after a successful operation's state refresh
    fn on_reconciled(&mut self, outcome: &Result<RefreshedState, ReconcileError>) {
        let _ = outcome;
    }
}

/// Identifies one subscription for `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Observer built from a per-line closure and a status closure
pub struct FnObserver<L, S> {
    on_line: L,
    on_state: S,
}

/// Adapt two closures into an [`OperationObserver`]
pub fn observe_with<L, S>(on_line: L, on_state: S) -> FnObserver<L, S>
where
    L: FnMut(&OutputLine) + Send,
    S: FnMut(OperationStatus) + Send,
{
    FnObserver { on_line, on_state }
}

impl<L, S> OperationObserver for FnObserver<L, S>
where
    L: FnMut(&OutputLine) + Send,
    S: FnMut(OperationStatus) + Send,
{
    fn on_lines(&mut self, _first_index: usize, lines: &[OutputLine]) {
        for line in lines {
            (self.on_line)(line);
        }
    }

    fn on_state_change(&mut self, _from: OperationStatus, to: OperationStatus) {
        (self.on_state)(to);
    }
}

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn OperationObserver>)>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Box<dyn OperationObserver>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn lines(&mut self, first_index: usize, lines: &[OutputLine]) {
        for (_, observer) in &mut self.entries {
            observer.on_lines(first_index, lines);
        }
    }

    pub(crate) fn state_change(&mut self, from: OperationStatus, to: OperationStatus) {
        for (_, observer) in &mut self.entries {
            observer.on_state_change(from, to);
        }
    }

    pub(crate) fn reconciled(&mut self, outcome: &Result<RefreshedState, ReconcileError>) {
        for (_, observer) in &mut self.entries {
            observer.on_reconciled(outcome);
        }
    }
}
