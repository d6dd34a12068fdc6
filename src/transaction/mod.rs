//! Contract calls, submission handles and receipts

use serde::{Deserialize, Serialize};

pub mod resolver;
pub mod tracker;

pub use resolver::{CallResolver, ChargeHandler, Resolution, ResolveContext};
pub use tracker::{ConfirmationTracker, TrackerOutcome};

/// A single contract call in a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    /// Target contract address
    pub to: String,

    /// Function to invoke on the target
    pub function_name: String,

    /// Encoded arguments
    #[serde(default)]
    pub args: Vec<serde_json::Value>,

    /// Native value attached, in wei
    #[serde(default)]
    pub value: u128,
}

impl ContractCall {
    pub fn new(to: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            function_name: function_name.into(),
            args: Vec::new(),
            value: 0,
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Calls to submit for one attempt, plus the charge they settle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCallSet {
    pub calls: Vec<ContractCall>,
    pub charge_id: Option<String>,
}

impl ResolvedCallSet {
    pub fn new(calls: Vec<ContractCall>, charge_id: Option<String>) -> Self {
        Self { calls, charge_id }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Identifier of a submitted batch, used to poll its status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubmissionHandle(pub String);

impl std::fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Batch status as reported by the wallet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallsStatusKind {
    Pending,
    Confirmed,
}

/// Per-transaction entry in a calls status response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallsStatus {
    pub status: CallsStatusKind,
    #[serde(default)]
    pub receipts: Vec<CallReceipt>,
}

impl CallsStatus {
    pub fn pending() -> Self {
        Self {
            status: CallsStatusKind::Pending,
            receipts: Vec::new(),
        }
    }

    pub fn confirmed(receipts: Vec<CallReceipt>) -> Self {
        Self {
            status: CallsStatusKind::Confirmed,
            receipts,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == CallsStatusKind::Confirmed
    }

    /// Hash of the most recent transaction in the batch
    pub fn latest_transaction_hash(&self) -> Option<&str> {
        self.receipts.last().map(|r| r.transaction_hash.as_str())
    }
}

/// Execution outcome recorded in a receipt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// On-chain receipt for a mined transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: ReceiptStatus,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}
