//! Charge creation and call lookup against the commerce backend

use crate::error::Result;
use crate::transaction::ResolvedCallSet;
use async_trait::async_trait;

#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// Create a charge for `product_id` paid by `payer`; returns the charge id
    async fn create_charge(&self, product_id: &str, payer: &str) -> Result<String>;

    /// Calls that settle `charge_id` from `payer`.
    ///
    /// Fails with [`crate::PayError::InsufficientBalance`] when the payer
    /// cannot cover the charge.
    async fn build_pay_calls(&self, charge_id: &str, payer: &str) -> Result<ResolvedCallSet>;
}
