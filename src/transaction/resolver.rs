//! Resolution of the contract calls to submit

use super::{ContractCall, ResolvedCallSet};
use crate::error::messages::GENERIC_ERROR_MESSAGE;
use crate::error::{PayError, PayErrorCode, Result};
use crate::network::CommerceClient;
use crate::status::{LifecycleStatus, StatusSink};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller-supplied producer of a charge id
pub type ChargeHandler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Where the calls for an attempt come from
#[derive(Clone)]
pub enum ChargeSource {
    /// Calls fixed up front; nothing to resolve
    Calls(Vec<ContractCall>),
    /// Create a charge for a commerce product
    Product(String),
    /// Ask the caller for a charge id
    Handler(ChargeHandler),
}

impl std::fmt::Debug for ChargeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeSource::Calls(calls) => write!(f, "Calls({})", calls.len()),
            ChargeSource::Product(id) => write!(f, "Product({})", id),
            ChargeSource::Handler(_) => f.write_str("Handler"),
        }
    }
}

/// Inputs that vary per attempt
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Connected payer address
    pub address: Option<String>,
}

/// What resolution produced
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Calls ready to submit
    Ready(ResolvedCallSet),
    /// Payer cannot cover the charge
    InsufficientBalance,
    /// Resolution failed and an error status was written
    Failed,
}

pub struct CallResolver {
    source: ChargeSource,
    commerce: Arc<dyn CommerceClient>,
}

impl CallResolver {
    pub fn new(source: ChargeSource, commerce: Arc<dyn CommerceClient>) -> Self {
        Self { source, commerce }
    }

    /// Resolve the calls for one attempt.
    ///
    /// Never fails past this boundary: failures other than an insufficient
    /// balance are written to `sink` as a `CHARGE_ERROR` status.
    pub async fn resolve(&self, ctx: &ResolveContext, sink: &dyn StatusSink) -> Resolution {
        match self.fetch(ctx).await {
            Ok(call_set) => {
                info!(
                    "Resolved {} calls (charge {})",
                    call_set.calls.len(),
                    call_set.charge_id.as_deref().unwrap_or("-")
                );
                Resolution::Ready(call_set)
            }
            Err(PayError::InsufficientBalance(reason)) => {
                info!("Payer has insufficient balance: {}", reason);
                Resolution::InsufficientBalance
            }
            Err(e) => {
                warn!("Failed to resolve calls: {}", e);
                sink.transition(LifecycleStatus::error(
                    PayErrorCode::ChargeError.as_str(),
                    e.to_string(),
                    GENERIC_ERROR_MESSAGE,
                ));
                Resolution::Failed
            }
        }
    }

    async fn fetch(&self, ctx: &ResolveContext) -> Result<ResolvedCallSet> {
        if let ChargeSource::Calls(calls) = &self.source {
            debug!("Using {} pre-supplied calls", calls.len());
            return Ok(ResolvedCallSet::new(calls.clone(), None));
        }

        let payer = ctx
            .address
            .as_deref()
            .ok_or_else(|| PayError::Wallet("No connected address to pay from".to_string()))?;

        let charge_id = match &self.source {
            ChargeSource::Product(product_id) => {
                debug!("Creating charge for product {}", product_id);
                self.commerce.create_charge(product_id, payer).await?
            }
            ChargeSource::Handler(handler) => handler().await?,
            ChargeSource::Calls(_) => String::new(),
        };

        if charge_id.is_empty() {
            return Err(PayError::Commerce("Charge id is empty".to_string()));
        }

        let mut call_set = self.commerce.build_pay_calls(&charge_id, payer).await?;
        if call_set.is_empty() {
            return Err(PayError::Commerce(format!("Charge {} has no calls", charge_id)));
        }

        // The calls settle the charge we asked for, whatever the backend echoed
        call_set.charge_id = Some(charge_id);
        Ok(call_set)
    }
}
