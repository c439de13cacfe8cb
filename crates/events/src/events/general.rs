use serde::{Deserialize, Serialize};

/// Messages that belong to no single operation, such as CLI notices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Shown to the user, e.g. a timeout that cancelled the operation
    Warning {
        message: String,
        context: Option<String>,
    },

    /// Shown only with `--debug`
    Debug {
        message: String,
        context: Option<String>,
    },
}

impl GeneralEvent {
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    pub fn warning_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::Debug {
            message: message.into(),
            context: None,
        }
    }

    pub fn debug_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Debug {
            message: message.into(),
            context: Some(context.into()),
        }
    }
}
