//! Operations context for dependency injection

use std::sync::Arc;
use taphouse_config::Config;
use taphouse_errors::{Error, OpsError};
use taphouse_events::EventSender;
use taphouse_platform::{PlatformContext, ProcessLauncher, ProcessRunner};
use taphouse_state::StateStore;

use crate::brew::BrewQuery;
use crate::controller::OperationController;
use crate::reconcile::{PackageQuery, ResultReconciler};

/// Everything an operation needs: configuration, the process launcher,
/// the state query backend, the shared state store and the event channel
pub struct OpsCtx {
    pub config: Config,
    pub tx: EventSender,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub query: Arc<dyn PackageQuery>,
    pub state: StateStore,
}

impl OpsCtx {
    /// Controller wired to this context
    #[must_use]
    pub fn controller(&self) -> OperationController {
        OperationController::new(self)
    }

    /// Reconciler publishing into this context's state store
    #[must_use]
    pub fn reconciler(&self) -> ResultReconciler {
        ResultReconciler::new(
            Arc::clone(&self.query),
            self.state.clone(),
            &self.config.reconcile,
        )
        .with_event_sender(self.tx.clone())
    }
}

/// Builder for [`OpsCtx`]. The launcher, query backend and state store
/// default to the real Homebrew implementations.
#[derive(Default)]
pub struct OpsContextBuilder {
    config: Option<Config>,
    tx: Option<EventSender>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    query: Option<Arc<dyn PackageQuery>>,
    state: Option<StateStore>,
}

impl OpsContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Launcher for operation commands
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: Arc<dyn PackageQuery>) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    /// Build the context
    ///
    /// # Errors
    ///
    /// Returns an error if no event sender was supplied.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let tx = self.tx.ok_or_else(|| OpsError::MissingComponent {
            component: "event_sender".to_string(),
        })?;
        let config = self.config.unwrap_or_default();

        let launcher: Arc<dyn ProcessLauncher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ProcessRunner::new(&config.runner)),
        };
        let query: Arc<dyn PackageQuery> = match self.query {
            Some(query) => query,
            None => {
                // Queries parse stdout, so stderr gets its own pipe
                let runner = ProcessRunner::new(&config.runner).with_merge_stderr(false);
                Arc::new(
                    BrewQuery::new(Arc::new(runner), config.brew.clone())
                        .with_context(PlatformContext::new(Some(tx.clone()))),
                )
            }
        };

        Ok(OpsCtx {
            config,
            tx,
            launcher,
            query,
            state: self.state.unwrap_or_default(),
        })
    }
}
