//! External capabilities the lifecycle calls into

use std::sync::Arc;

pub mod commerce;
pub mod rpc;
pub mod wallet;

pub use commerce::CommerceClient;
pub use rpc::TransactionClient;
pub use wallet::{ConnectionState, Wallet};

/// Opens external pages such as the receipt or the funding flow
pub trait Navigator: Send + Sync {
    fn open(&self, url: &str);
}

/// Handles to every capability a payment session needs
#[derive(Clone)]
pub struct Capabilities {
    pub wallet: Arc<dyn Wallet>,
    pub commerce: Arc<dyn CommerceClient>,
    pub transactions: Arc<dyn TransactionClient>,
    pub navigator: Arc<dyn Navigator>,
}

impl Capabilities {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        commerce: Arc<dyn CommerceClient>,
        transactions: Arc<dyn TransactionClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            wallet,
            commerce,
            transactions,
            navigator,
        }
    }
}
