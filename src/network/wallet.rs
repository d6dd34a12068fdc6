//! Wallet connection and chain switching

use crate::config::wallet::ConnectorChoice;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Snapshot of the wallet connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub address: Option<String>,
    pub chain_id: Option<u64>,
    pub is_connected: bool,
}

impl ConnectionState {
    pub fn connected(address: impl Into<String>, chain_id: u64) -> Self {
        Self {
            address: Some(address.into()),
            chain_id: Some(chain_id),
            is_connected: true,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Ids of the connectors the wallet layer has available
    fn connectors(&self) -> Vec<String>;

    /// Prompt for a connection; resolves with the new state once connected
    async fn connect(&self, connector: ConnectorChoice) -> Result<ConnectionState>;

    /// Ask the wallet to switch to `chain_id`
    async fn switch_chain(&self, chain_id: u64) -> Result<()>;
}
