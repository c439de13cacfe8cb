#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Operation orchestration for taphouse
//!
//! This crate sits between the CLI and the platform layer. It runs one
//! package manager operation at a time, streams its output to observers,
//! and re-reads package state once an operation succeeds.

mod brew;
mod context;
mod controller;
mod observer;
mod reconcile;
mod request;
mod types;

pub use brew::{parse_outdated, parse_services, parse_versions, BrewQuery};
pub use context::{OpsContextBuilder, OpsCtx};
pub use controller::{CancelHandle, OperationController};
pub use observer::{observe_with, FnObserver, OperationObserver, SubscriptionId};
pub use reconcile::{PackageQuery, ReconcilePlan, ResultReconciler, StateQuery};
pub use request::OperationRequest;
pub use types::{Operation, OperationReport, Reconciliation};
