//! Configuration management for payment sessions

use crate::error::{PayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod wallet;

pub use wallet::WalletConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayConfig {
    /// Chain the calls must execute on
    pub chain: ChainConfig,

    /// Wallet connector preferences
    pub wallet: WalletConfig,

    /// Commerce URLs for receipts and funding
    pub commerce: CommerceConfig,

    /// Confirmation tracking policy
    pub tracking: TrackingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Required chain id
    pub chain_id: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: crate::defaults::BASE_CHAIN_ID,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommerceConfig {
    /// Base of the receipt URL; the charge id and `/receipt` are appended
    pub receipt_url_base: String,

    /// Page opened when the wallet cannot cover the charge
    pub funding_url: String,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            receipt_url_base: crate::defaults::RECEIPT_URL_BASE.to_string(),
            funding_url: crate::defaults::FUNDING_URL.to_string(),
        }
    }
}

impl CommerceConfig {
    /// Receipt page for a charge
    pub fn receipt_url(&self, charge_id: &str) -> String {
        format!("{}/{}/receipt", self.receipt_url_base.trim_end_matches('/'), charge_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Interval between calls-status polls in milliseconds
    pub poll_interval_ms: u64,

    /// Upper bound on polling plus receipt retrieval in milliseconds
    pub timeout_ms: u64,

    /// Consecutive poll failures tolerated before giving up
    pub max_poll_failures: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: crate::defaults::POLL_INTERVAL.as_millis() as u64,
            timeout_ms: crate::defaults::CONFIRMATION_TIMEOUT.as_millis() as u64,
            max_poll_failures: crate::defaults::MAX_POLL_FAILURES,
        }
    }
}

impl TrackingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(invalid("Poll interval must be positive"));
        }

        if self.timeout_ms < self.poll_interval_ms {
            return Err(invalid("Confirmation timeout must be at least one poll interval"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PayConfig = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from layered files and environment variables
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        settings = settings.add_source(config::File::with_name("config/default").required(false));

        if let Ok(env) = std::env::var("PAY_ENV") {
            settings = settings.add_source(
                config::File::with_name(&format!("config/{}", env)).required(false),
            );
        }

        // Local overrides, not committed
        settings = settings.add_source(config::File::with_name("config/local").required(false));

        settings = settings.add_source(
            config::Environment::with_prefix("PAY")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: PayConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            return Err(invalid("Chain id must be non-zero"));
        }

        self.tracking.validate()?;

        if self.commerce.receipt_url_base.is_empty() || self.commerce.funding_url.is_empty() {
            return Err(invalid("Commerce receipt and funding URLs must be set"));
        }

        self.wallet.validate()?;

        Ok(())
    }
}

fn invalid(message: &str) -> PayError {
    PayError::Config(config::ConfigError::Message(message.to_string()))
}
