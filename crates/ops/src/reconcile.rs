//! Post-operation state refresh
//!
//! After an operation succeeds, state is re-read from the package manager
//! instead of being inferred from the operation's own output.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taphouse_config::ReconcileConfig;
use taphouse_errors::ReconcileError;
use taphouse_events::{AppEvent, EventEmitter, EventSender, FailureContext, ReconcileEvent};
use taphouse_state::{RefreshedState, StateStore};
use taphouse_types::{InstalledPackage, OperationKind, OutdatedPackage, ServiceInfo};

/// Read-only accessors for authoritative package manager state
#[async_trait]
pub trait PackageQuery: Send + Sync {
    async fn list_installed_packages(&self) -> Result<Vec<InstalledPackage>, ReconcileError>;

    async fn list_outdated_packages(&self) -> Result<Vec<OutdatedPackage>, ReconcileError>;

    async fn list_services(&self) -> Result<Vec<ServiceInfo>, ReconcileError>;
}

/// One re-readable section of state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateQuery {
    Installed,
    Outdated,
    Services,
}

impl StateQuery {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Outdated => "outdated",
            Self::Services => "services",
        }
    }
}

/// Which queries follow an operation kind, and whether they must wait for
/// asynchronous daemon state to settle first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub queries: Vec<StateQuery>,
    pub settle: bool,
}

impl ReconcilePlan {
    #[must_use]
    pub fn for_kind(kind: &OperationKind) -> Self {
        use StateQuery::{Installed, Outdated, Services};
        match kind {
            OperationKind::Install { .. }
            | OperationKind::Uninstall { .. }
            | OperationKind::Upgrade { .. }
            | OperationKind::ImportBrewfile { .. }
            | OperationKind::Cleanup => Self::now(vec![Installed, Outdated]),
            OperationKind::Update => Self::now(vec![Outdated]),
            OperationKind::ServiceControl { .. } => Self {
                queries: vec![Services],
                settle: true,
            },
            OperationKind::RemoveQuarantine { .. } | OperationKind::Custom { .. } => {
                Self::now(vec![Installed])
            }
        }
    }

    /// Every section, no settle delay
    #[must_use]
    pub fn all() -> Self {
        Self::now(vec![
            StateQuery::Installed,
            StateQuery::Outdated,
            StateQuery::Services,
        ])
    }

    fn now(queries: Vec<StateQuery>) -> Self {
        Self {
            queries,
            settle: false,
        }
    }
}

/// Runs reconciliation queries and publishes their result
#[derive(Clone)]
pub struct ResultReconciler {
    query: Arc<dyn PackageQuery>,
    state: StateStore,
    settle_delay: Duration,
    tx: Option<EventSender>,
}

impl ResultReconciler {
    #[must_use]
    pub fn new(query: Arc<dyn PackageQuery>, state: StateStore, config: &ReconcileConfig) -> Self {
        Self {
            query,
            state,
            settle_delay: config.service_settle(),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Re-read the state affected by `kind` and merge it into the store.
    ///
    /// Queries run one after another. If any query fails nothing is
    /// published, so the store never mixes sections from a partial pass.
    ///
    /// # Errors
    ///
    /// Returns the first failing query's error.
    pub async fn reconcile(&self, kind: &OperationKind) -> Result<RefreshedState, ReconcileError> {
        self.run(kind.name(), &ReconcilePlan::for_kind(kind), None)
            .await
    }

    /// Re-read every section on demand
    ///
    /// # Errors
    ///
    /// Returns the first failing query's error.
    pub async fn refresh_all(&self) -> Result<RefreshedState, ReconcileError> {
        self.run("refresh", &ReconcilePlan::all(), None).await
    }

    /// Re-read only the given sections, with no settle delay
    ///
    /// # Errors
    ///
    /// Returns the first failing query's error.
    pub async fn refresh(&self, queries: &[StateQuery]) -> Result<RefreshedState, ReconcileError> {
        self.run("refresh", &ReconcilePlan::now(queries.to_vec()), None)
            .await
    }

    pub(crate) async fn reconcile_correlated(
        &self,
        kind: &OperationKind,
        correlation_id: Option<&str>,
    ) -> Result<RefreshedState, ReconcileError> {
        self.run(kind.name(), &ReconcilePlan::for_kind(kind), correlation_id)
            .await
    }

    async fn run(
        &self,
        trigger: &str,
        plan: &ReconcilePlan,
        correlation_id: Option<&str>,
    ) -> Result<RefreshedState, ReconcileError> {
        let started = Instant::now();
        self.publish(
            correlation_id,
            ReconcileEvent::Started {
                trigger: trigger.to_string(),
                queries: plan.queries.iter().map(|q| q.name().to_string()).collect(),
            },
        );

        if plan.settle && !self.settle_delay.is_zero() {
            self.publish(
                correlation_id,
                ReconcileEvent::Settling {
                    delay_ms: millis(self.settle_delay),
                },
            );
            tokio::time::sleep(self.settle_delay).await;
        }

        let mut refreshed = RefreshedState::now();
        for query in &plan.queries {
            let items = match self.run_query(*query, &mut refreshed).await {
                Ok(items) => items,
                Err(error) => {
                    tracing::warn!(query = query.name(), %error, "reconciliation query failed");
                    self.publish(
                        correlation_id,
                        ReconcileEvent::Failed {
                            query: query.name().to_string(),
                            failure: FailureContext::from_error(&error),
                        },
                    );
                    return Err(error);
                }
            };
            self.publish(
                correlation_id,
                ReconcileEvent::QueryCompleted {
                    query: query.name().to_string(),
                    items,
                },
            );
        }

        self.state.apply(refreshed.clone());
        self.publish(
            correlation_id,
            ReconcileEvent::Completed {
                queries: plan.queries.len(),
                duration_ms: millis(started.elapsed()),
            },
        );
        Ok(refreshed)
    }

    async fn run_query(
        &self,
        query: StateQuery,
        refreshed: &mut RefreshedState,
    ) -> Result<usize, ReconcileError> {
        Ok(match query {
            StateQuery::Installed => {
                let items = self.query.list_installed_packages().await?;
                let count = items.len();
                refreshed.installed = Some(items);
                count
            }
            StateQuery::Outdated => {
                let items = self.query.list_outdated_packages().await?;
                let count = items.len();
                refreshed.outdated = Some(items);
                count
            }
            StateQuery::Services => {
                let items = self.query.list_services().await?;
                let count = items.len();
                refreshed.services = Some(items);
                count
            }
        })
    }

    fn publish(&self, correlation_id: Option<&str>, event: ReconcileEvent) {
        let event = AppEvent::Reconcile(event);
        match correlation_id {
            Some(id) => self.emit_correlated(id, event),
            None => self.emit(event),
        }
    }
}

impl EventEmitter for ResultReconciler {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
