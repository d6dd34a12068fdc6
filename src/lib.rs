//! Onchain Pay - payment and batched-call lifecycle coordinator
//!
//! Drives a payment attempt from wallet connection through chain switching,
//! contract-call resolution, batched submission and receipt confirmation,
//! publishing every lifecycle status change to registered observers.

pub mod config;
pub mod error;
pub mod network;
pub mod sandbox;
pub mod session;
pub mod status;
pub mod transaction;

// Re-export commonly used types
pub use crate::config::PayConfig;
pub use crate::error::{PayError, PayErrorCode, Result};
pub use crate::session::{PaySession, PaySessionBuilder, Phase, SubmitOutcome};
pub use crate::status::{LifecycleStatus, StatusEvent};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Base mainnet
    pub const BASE_CHAIN_ID: u64 = 8453;

    /// Connector id of the Coinbase Wallet SDK
    pub const PREFERRED_CONNECTOR: &str = "coinbaseWalletSDK";

    pub const RECEIPT_URL_BASE: &str = "https://commerce.coinbase.com/pay";

    pub const FUNDING_URL: &str = "https://keys.coinbase.com/fund";

    /// Calls status refetch interval while not confirmed
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Upper bound on confirmation tracking
    pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

    pub const MAX_POLL_FAILURES: u32 = 5;

    /// Capacity of the status broadcast channel
    pub const STATUS_CHANNEL_CAPACITY: usize = 64;
}
