//! Context passed to every platform call

use taphouse_events::{AppEvent, EventEmitter, EventSender, ProcessEvent};

/// Context for platform operations, providing event emission and the
/// identifier of the operation on whose behalf a process runs
#[derive(Clone, Default)]
pub struct PlatformContext {
    event_sender: Option<EventSender>,
    correlation_id: Option<String>,
}

impl PlatformContext {
    /// Create a new platform context with event emission capabilities
    #[must_use]
    pub fn new(event_sender: Option<EventSender>) -> Self {
        Self {
            event_sender,
            correlation_id: None,
        }
    }

    /// Tag every event emitted through this context with `id`
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub(crate) fn emit_process(&self, event: ProcessEvent) {
        let event = AppEvent::Process(event);
        match &self.correlation_id {
            Some(id) => self.emit_correlated(id, event),
            None => self.emit(event),
        }
    }
}

impl EventEmitter for PlatformContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}
