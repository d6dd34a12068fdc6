//! In-memory capabilities for dry runs and tests
//!
//! Every sandbox capability records the requests it receives and can be
//! scripted to reject, fail or delay.

use crate::network::{Capabilities, Navigator};
use parking_lot::Mutex;
use std::sync::Arc;

pub mod commerce;
pub mod rpc;
pub mod wallet;

pub use commerce::SandboxCommerce;
pub use rpc::{SandboxTransactionClient, SubmitFailure, TransactionScript};
pub use wallet::{SandboxWallet, WalletRequest};

/// Navigator that remembers every page it was asked to open
#[derive(Default)]
pub struct RecordingNavigator {
    opened: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn open(&self, url: &str) {
        tracing::info!("Sandbox navigator opening {}", url);
        self.opened.lock().push(url.to_string());
    }
}

/// A full set of sandbox capabilities with handles kept for inspection
#[derive(Clone)]
pub struct Sandbox {
    pub wallet: Arc<SandboxWallet>,
    pub commerce: Arc<SandboxCommerce>,
    pub transactions: Arc<SandboxTransactionClient>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Sandbox {
    pub fn new(
        wallet: SandboxWallet,
        commerce: SandboxCommerce,
        transactions: SandboxTransactionClient,
    ) -> Self {
        Self {
            wallet: Arc::new(wallet),
            commerce: Arc::new(commerce),
            transactions: Arc::new(transactions),
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(
            self.wallet.clone(),
            self.commerce.clone(),
            self.transactions.clone(),
            self.navigator.clone(),
        )
    }
}

impl Default for Sandbox {
    /// Disconnected wallet, a commerce backend that resolves every charge,
    /// and a batch that confirms on the second poll
    fn default() -> Self {
        Self::new(
            SandboxWallet::disconnected(),
            SandboxCommerce::new(),
            SandboxTransactionClient::new(TransactionScript::confirm_after(1)),
        )
    }
}
