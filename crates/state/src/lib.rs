#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared package state for taphouse
//!
//! The store holds the last observed snapshot of installed packages,
//! outdated packages and services. It is only ever written by
//! reconciliation, which re-reads authoritative state from the package
//! manager; consumers read snapshots or watch for changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taphouse_types::{InstalledPackage, OutdatedPackage, ServiceInfo};
use tokio::sync::watch;

/// One independently refreshed part of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section<T> {
    pub items: Vec<T>,
    /// `None` until the section has been queried at least once
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            refreshed_at: None,
        }
    }
}

impl<T> Section<T> {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.refreshed_at.is_some()
    }
}

/// Last observed package manager state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub installed: Section<InstalledPackage>,
    pub outdated: Section<OutdatedPackage>,
    pub services: Section<ServiceInfo>,
    /// Incremented on every applied refresh
    pub generation: u64,
}

/// Result of one reconciliation pass. Sections that were not re-queried
/// are `None` and leave the stored section untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedState {
    pub installed: Option<Vec<InstalledPackage>>,
    pub outdated: Option<Vec<OutdatedPackage>>,
    pub services: Option<Vec<ServiceInfo>>,
    pub observed_at: DateTime<Utc>,
}

impl RefreshedState {
    /// An empty refresh observed now
    #[must_use]
    pub fn now() -> Self {
        Self {
            installed: None,
            outdated: None,
            services: None,
            observed_at: Utc::now(),
        }
    }

    /// Names of the sections this refresh carries
    #[must_use]
    pub fn sections(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.installed.is_some() {
            names.push("installed");
        }
        if self.outdated.is_some() {
            names.push("outdated");
        }
        if self.services.is_some() {
            names.push("services");
        }
        names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installed.is_none() && self.outdated.is_none() && self.services.is_none()
    }
}

/// Cloneable handle to the shared snapshot
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every applied refresh
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Merge a refresh into the snapshot and notify watchers.
    ///
    /// Returns the new generation. An empty refresh changes nothing and does
    /// not notify.
    pub fn apply(&self, refreshed: RefreshedState) -> u64 {
        if refreshed.is_empty() {
            return self.tx.borrow().generation;
        }
        let at = refreshed.observed_at;
        let mut generation = 0;
        self.tx.send_modify(|snapshot| {
            if let Some(items) = refreshed.installed {
                snapshot.installed = Section {
                    items,
                    refreshed_at: Some(at),
                };
            }
            if let Some(items) = refreshed.outdated {
                snapshot.outdated = Section {
                    items,
                    refreshed_at: Some(at),
                };
            }
            if let Some(items) = refreshed.services {
                snapshot.services = Section {
                    items,
                    refreshed_at: Some(at),
                };
            }
            snapshot.generation += 1;
            generation = snapshot.generation;
        });
        generation
    }
}
