//! Error handling for the payment lifecycle

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-1193 provider error code for a request the user rejected
pub const USER_REJECTED_RPC_CODE: i64 = 4001;

/// Main error type for capability calls and session setup
#[derive(Error, Debug)]
pub enum PayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("User rejected the request: {0}")]
    UserRejected(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Commerce error: {0}")]
    Commerce(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Timeout error: {operation} took longer than {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the payment lifecycle
pub type Result<T> = std::result::Result<T, PayError>;

impl From<anyhow::Error> for PayError {
    fn from(err: anyhow::Error) -> Self {
        // Handlers may wrap a PayError; keep its classification.
        match err.downcast::<PayError>() {
            Ok(inner) => inner,
            Err(err) => PayError::Internal(format!("{:#}", err)),
        }
    }
}

impl From<toml::de::Error> for PayError {
    fn from(err: toml::de::Error) -> Self {
        PayError::Config(config::ConfigError::Message(err.to_string()))
    }
}

impl PayError {
    /// Whether the wallet or the user declined the request.
    ///
    /// Wallets report rejections in different shapes: a typed rejection, the
    /// EIP-1193 `4001` code, or only a message.
    pub fn is_user_rejected(&self) -> bool {
        match self {
            PayError::UserRejected(_) => true,
            PayError::Rpc { code, .. } if *code == USER_REJECTED_RPC_CODE => true,
            other => {
                let message = other.to_string().to_lowercase();
                message.contains("user rejected") || message.contains("user denied")
            }
        }
    }

    /// Stable name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PayError::Config(_) => "Config",
            PayError::UserRejected(_) => "UserRejected",
            PayError::InsufficientBalance(_) => "InsufficientBalance",
            PayError::Rpc { .. } => "Rpc",
            PayError::Wallet(_) => "Wallet",
            PayError::Commerce(_) => "Commerce",
            PayError::Submission(_) => "Submission",
            PayError::Timeout { .. } => "Timeout",
            PayError::Serialization(_) => "Serialization",
            PayError::Io(_) => "Io",
            PayError::Internal(_) => "Internal",
        }
    }

    /// JSON rendering of the error for `statusData.error`
    pub fn diagnostic(&self) -> String {
        let mut value = serde_json::json!({
            "name": self.kind(),
            "message": self.to_string(),
        });
        if let PayError::Rpc { code, .. } = self {
            value["code"] = serde_json::json!(code);
        }
        value.to_string()
    }
}

/// Lifecycle error codes carried in `statusData.code`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayErrorCode {
    InsufficientBalance,
    UnexpectedError,
    ChargeError,
}

impl PayErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            PayErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
            PayErrorCode::ChargeError => "CHARGE_ERROR",
        }
    }
}

impl std::fmt::Display for PayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal codes for failures inside the transaction module.
///
/// These are stable so support can map a reported code to the step that failed.
pub mod codes {
    /// Batched submission was rejected or failed
    pub const SUBMIT_CALLS: &str = "PmUWCSh01";
    /// Calls status polling kept failing
    pub const CALLS_STATUS: &str = "PmUCSh01";
    /// Receipt retrieval failed
    pub const WAIT_FOR_RECEIPT: &str = "PmWFTRh01";
    /// The receipt reports a reverted transaction
    pub const RECEIPT_REVERTED: &str = "PmWFTRh02";
    /// Confirmation did not complete in time
    pub const CONFIRMATION_TIMEOUT: &str = "PmCTTh01";
}

/// User-facing messages
pub mod messages {
    pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";
    pub const USER_REJECTED_ERROR: &str = "Request denied.";
    pub const INSUFFICIENT_BALANCE_ERROR: &str = "User has insufficient balance";
    pub const INSUFFICIENT_BALANCE_ERROR_MESSAGE: &str =
        "You don't have enough USDC. Add funds and try again.";
    pub const CONTRACTS_UNAVAILABLE: &str = "Contracts are not available";
}
