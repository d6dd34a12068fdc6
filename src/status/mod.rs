//! Lifecycle status of a payment attempt

use crate::error::PayErrorCode;
use crate::transaction::TransactionReceipt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod emitter;
pub mod store;

pub use emitter::{StatusEmitter, StatusObserver};
pub use store::StatusStore;

/// Current state of a payment attempt with its payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "statusName", content = "statusData", rename_all = "camelCase")]
pub enum LifecycleStatus {
    #[default]
    Init,
    Pending,
    Success(SuccessData),
    Error(ErrorData),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuccessData {
    pub transaction_receipts: Vec<TransactionReceipt>,
    pub charge_id: String,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorData {
    /// Stable error code
    pub code: String,
    /// Diagnostic detail
    pub error: String,
    /// User-facing text
    pub message: String,
}

/// Discriminant of a [`LifecycleStatus`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StatusName {
    Init,
    Pending,
    Success,
    Error,
}

impl StatusName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusName::Init => "init",
            StatusName::Pending => "pending",
            StatusName::Success => "success",
            StatusName::Error => "error",
        }
    }
}

impl std::fmt::Display for StatusName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LifecycleStatus {
    pub fn error(code: impl Into<String>, error: impl Into<String>, message: impl Into<String>) -> Self {
        LifecycleStatus::Error(ErrorData {
            code: code.into(),
            error: error.into(),
            message: message.into(),
        })
    }

    pub fn name(&self) -> StatusName {
        match self {
            LifecycleStatus::Init => StatusName::Init,
            LifecycleStatus::Pending => StatusName::Pending,
            LifecycleStatus::Success(_) => StatusName::Success,
            LifecycleStatus::Error(_) => StatusName::Error,
        }
    }

    /// Error code when this is an error status
    pub fn error_code(&self) -> Option<&str> {
        match self {
            LifecycleStatus::Error(data) => Some(data.code.as_str()),
            _ => None,
        }
    }

    pub fn is_insufficient_balance(&self) -> bool {
        self.error_code() == Some(PayErrorCode::InsufficientBalance.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Success(_) | LifecycleStatus::Error(_))
    }

    /// Edges the coordinator and tracker are expected to take.
    ///
    /// The store applies any transition; this table only flags the unusual
    /// ones in logs and lets tests assert the pipeline stayed on it.
    pub fn is_expected_transition(from: StatusName, to: StatusName) -> bool {
        use StatusName::*;
        matches!(
            (from, to),
            (Init, Pending)
                | (Init, Error)
                | (Pending, Success)
                | (Pending, Error)
                | (Success, Success)
                | (Error, Pending)
                | (Error, Error)
                | (_, Init)
        )
    }
}

/// Anything that accepts lifecycle transitions
pub trait StatusSink: Send + Sync {
    fn transition(&self, status: LifecycleStatus);
}

impl StatusSink for StatusStore {
    fn transition(&self, status: LifecycleStatus) {
        StatusStore::transition(self, status)
    }
}

/// A status change as published on the broadcast channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub session_id: Uuid,
    /// Position of this change within the session, starting at 0 for `init`
    pub sequence: u64,
    pub status: LifecycleStatus,
    pub timestamp_ms: i64,
}
