//! Post-operation state refresh errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Reconciliation failures never change an operation's own outcome; they only
/// mean that displayed state may be stale.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReconcileError {
    #[error("query {query} failed: {message}")]
    QueryFailed { query: String, message: String },

    #[error("could not parse {query} output: {message}")]
    ParseFailed { query: String, message: String },
}

impl ReconcileError {
    /// Name of the query that failed
    #[must_use]
    pub fn query(&self) -> &str {
        match self {
            Self::QueryFailed { query, .. } | Self::ParseFailed { query, .. } => query,
        }
    }
}

impl UserFacingError for ReconcileError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(format!("state refresh failed, display may be stale: {self}"))
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("Run `taphouse list` to refresh manually.")
    }

    fn is_retryable(&self) -> bool {
        true
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::QueryFailed { .. } => "reconcile.query_failed",
            Self::ParseFailed { .. } => "reconcile.parse_failed",
        })
    }
}
