//! Scriptable in-memory wallet

use crate::config::wallet::ConnectorChoice;
use crate::error::{PayError, Result};
use crate::network::{ConnectionState, Wallet};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

pub const SANDBOX_ADDRESS: &str = "0x00000000000000000000000000000000000a11ce";

/// Requests the sandbox wallet received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletRequest {
    Connect(ConnectorChoice),
    SwitchChain(u64),
}

pub struct SandboxWallet {
    state: Mutex<ConnectionState>,
    connectors: Vec<String>,
    requests: Mutex<Vec<WalletRequest>>,
    reject_connect: bool,
    reject_switch: bool,
    fail_switch: bool,
    latency: Duration,
}

impl SandboxWallet {
    fn with_state(state: ConnectionState) -> Self {
        Self {
            state: Mutex::new(state),
            connectors: vec!["injected".to_string(), crate::defaults::PREFERRED_CONNECTOR.to_string()],
            requests: Mutex::new(Vec::new()),
            reject_connect: false,
            reject_switch: false,
            fail_switch: false,
            latency: Duration::ZERO,
        }
    }

    pub fn disconnected() -> Self {
        Self::with_state(ConnectionState::disconnected())
    }

    pub fn connected(chain_id: u64) -> Self {
        Self::with_state(ConnectionState::connected(SANDBOX_ADDRESS, chain_id))
    }

    pub fn with_connectors(mut self, connectors: Vec<String>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn rejecting_connect(mut self) -> Self {
        self.reject_connect = true;
        self
    }

    pub fn rejecting_switch(mut self) -> Self {
        self.reject_switch = true;
        self
    }

    pub fn failing_switch(mut self) -> Self {
        self.fail_switch = true;
        self
    }

    /// Delay every async request by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<WalletRequest> {
        self.requests.lock().clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Wallet for SandboxWallet {
    fn connection_state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    fn connectors(&self) -> Vec<String> {
        self.connectors.clone()
    }

    async fn connect(&self, connector: ConnectorChoice) -> Result<ConnectionState> {
        debug!("Sandbox wallet connect via {:?}", connector);
        self.requests.lock().push(WalletRequest::Connect(connector));
        self.delay().await;

        if self.reject_connect {
            return Err(PayError::UserRejected("User rejected the connection request".to_string()));
        }

        let mut state = self.state.lock();
        state.address = Some(SANDBOX_ADDRESS.to_string());
        state.is_connected = true;
        Ok(state.clone())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        debug!("Sandbox wallet switch to chain {}", chain_id);
        self.requests.lock().push(WalletRequest::SwitchChain(chain_id));
        self.delay().await;

        if self.reject_switch {
            return Err(PayError::Rpc {
                code: crate::error::USER_REJECTED_RPC_CODE,
                message: "User rejected the chain switch".to_string(),
            });
        }
        if self.fail_switch {
            return Err(PayError::Rpc {
                code: -32603,
                message: "Chain switch failed".to_string(),
            });
        }

        self.state.lock().chain_id = Some(chain_id);
        Ok(())
    }
}
