//! Confirmation tracking for a submitted batch

use super::SubmissionHandle;
use crate::config::{CommerceConfig, TrackingConfig};
use crate::error::messages::GENERIC_ERROR_MESSAGE;
use crate::error::{codes, PayError, PayErrorCode, Result};
use crate::network::TransactionClient;
use crate::status::{ErrorData, LifecycleStatus, SuccessData};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Terminal result of tracking one submission
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    Confirmed(SuccessData),
    Failed(ErrorData),
}

impl TrackerOutcome {
    fn failed(code: &str, error: impl Into<String>) -> Self {
        TrackerOutcome::Failed(ErrorData {
            code: code.to_string(),
            error: error.into(),
            message: GENERIC_ERROR_MESSAGE.to_string(),
        })
    }

    pub fn into_status(self) -> LifecycleStatus {
        match self {
            TrackerOutcome::Confirmed(data) => LifecycleStatus::Success(data),
            TrackerOutcome::Failed(data) => LifecycleStatus::Error(data),
        }
    }
}

/// Polls a submission until it is confirmed, then fetches its receipt
pub struct ConfirmationTracker {
    client: Arc<dyn TransactionClient>,
    commerce: CommerceConfig,
    policy: TrackingConfig,
}

impl ConfirmationTracker {
    /// Fails when the policy has a zero poll interval or a timeout shorter
    /// than one interval
    pub fn new(
        client: Arc<dyn TransactionClient>,
        commerce: CommerceConfig,
        policy: TrackingConfig,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            client,
            commerce,
            policy,
        })
    }

    /// Track `handle` to a terminal outcome, bounded by the configured timeout
    pub async fn track(&self, handle: &SubmissionHandle, charge_id: Option<&str>) -> TrackerOutcome {
        let timeout = self.policy.timeout();
        match tokio::time::timeout(timeout, self.run(handle, charge_id)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = PayError::Timeout {
                    operation: format!("confirmation of {}", handle),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!("{}", err);
                TrackerOutcome::failed(codes::CONFIRMATION_TIMEOUT, err.to_string())
            }
        }
    }

    async fn run(&self, handle: &SubmissionHandle, charge_id: Option<&str>) -> TrackerOutcome {
        let mut interval = tokio::time::interval(self.policy.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut consecutive_failures = 0u32;
        let status = loop {
            interval.tick().await;

            match self.client.get_calls_status(handle).await {
                Ok(status) if status.is_confirmed() => break status,
                Ok(_) => {
                    consecutive_failures = 0;
                    debug!("Calls {} still pending", handle);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Calls status poll for {} failed ({} in a row): {}",
                        handle, consecutive_failures, e
                    );
                    if consecutive_failures > self.policy.max_poll_failures {
                        return TrackerOutcome::failed(codes::CALLS_STATUS, e.to_string());
                    }
                }
            }
        };

        let Some(transaction_hash) = status.latest_transaction_hash() else {
            warn!("Calls {} confirmed without receipts", handle);
            return TrackerOutcome::failed(
                PayErrorCode::UnexpectedError.as_str(),
                "Confirmed calls returned no receipts",
            );
        };

        info!("Calls {} confirmed, waiting for receipt {}", handle, transaction_hash);

        let receipt = match self.client.wait_for_transaction_receipt(transaction_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Receipt retrieval for {} failed: {}", transaction_hash, e);
                return TrackerOutcome::failed(codes::WAIT_FOR_RECEIPT, e.to_string());
            }
        };

        if !receipt.is_success() {
            warn!("Transaction {} reverted", receipt.transaction_hash);
            return TrackerOutcome::failed(
                codes::RECEIPT_REVERTED,
                format!("Transaction {} reverted", receipt.transaction_hash),
            );
        }

        TrackerOutcome::Confirmed(SuccessData {
            transaction_receipts: vec![receipt],
            charge_id: charge_id.unwrap_or_default().to_string(),
            receipt_url: charge_id.map(|id| self.commerce.receipt_url(id)),
        })
    }
}
