//! Scriptable in-memory commerce backend

use crate::error::{PayError, Result};
use crate::network::CommerceClient;
use crate::transaction::{ContractCall, ResolvedCallSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

/// USDC on Base
pub const USDC_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const COMMERCE_CONTRACT: &str = "0xeADE6bE02d043b3550bE19E960504dbA14A14971";

#[derive(Default)]
pub struct SandboxCommerce {
    requests: Mutex<Vec<String>>,
    insufficient_balance: bool,
    failing: bool,
}

impl SandboxCommerce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every payer as unable to cover the charge
    pub fn with_insufficient_balance(mut self) -> Self {
        self.insufficient_balance = true;
        self
    }

    /// Fail every request as if the backend were down
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Requests as `method:argument`, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing {
            return Err(PayError::Commerce("Commerce backend unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommerceClient for SandboxCommerce {
    async fn create_charge(&self, product_id: &str, _payer: &str) -> Result<String> {
        self.requests.lock().push(format!("create_charge:{}", product_id));
        self.check_available()?;
        Ok(format!("charge_{}", product_id))
    }

    async fn build_pay_calls(&self, charge_id: &str, payer: &str) -> Result<ResolvedCallSet> {
        self.requests.lock().push(format!("build_pay_calls:{}", charge_id));
        self.check_available()?;

        if self.insufficient_balance {
            return Err(PayError::InsufficientBalance(format!(
                "{} cannot cover charge {}",
                payer, charge_id
            )));
        }

        let amount = json!("1000000");
        let calls = vec![
            ContractCall::new(USDC_ADDRESS, "approve").with_args(vec![json!(COMMERCE_CONTRACT), amount.clone()]),
            ContractCall::new(COMMERCE_CONTRACT, "transferTokenPreApproved")
                .with_args(vec![json!({ "id": charge_id, "recipientAmount": amount, "sender": payer })]),
        ];

        Ok(ResolvedCallSet::new(calls, Some(charge_id.to_string())))
    }
}
