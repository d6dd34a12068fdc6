//! Wallet connector preferences

use crate::error::{PayError, Result};
use serde::{Deserialize, Serialize};

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Connector used when the wallet offers it
    pub preferred_connector: String,

    /// Preference handed to the fallback smart-wallet connector
    pub smart_wallet_preference: SmartWalletPreference,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SmartWalletPreference {
    /// Offer both smart wallet and extension
    All,
    /// Smart wallet only
    SmartWalletOnly,
    /// Browser extension only
    EoaOnly,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            preferred_connector: crate::defaults::PREFERRED_CONNECTOR.to_string(),
            smart_wallet_preference: SmartWalletPreference::SmartWalletOnly,
        }
    }
}

/// How the coordinator asks the wallet to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorChoice {
    /// One of the wallet's available connectors, by id
    Available(String),
    /// A freshly configured smart-wallet connector
    SmartWallet(SmartWalletPreference),
}

impl WalletConfig {
    /// Pick the connector: the preferred one if available, else a smart wallet
    pub fn choose_connector(&self, available: &[String]) -> ConnectorChoice {
        if available.iter().any(|id| id == &self.preferred_connector) {
            ConnectorChoice::Available(self.preferred_connector.clone())
        } else {
            ConnectorChoice::SmartWallet(self.smart_wallet_preference)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.preferred_connector.trim().is_empty() {
            return Err(PayError::Config(config::ConfigError::Message(
                "Preferred wallet connector must be set".to_string(),
            )));
        }
        Ok(())
    }
}
