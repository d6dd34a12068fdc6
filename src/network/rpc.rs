//! Batched submission, status polling and receipt retrieval

use crate::error::Result;
use crate::transaction::{CallsStatus, ContractCall, SubmissionHandle, TransactionReceipt};
use async_trait::async_trait;

#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Submit `calls` as one batch on `chain_id`
    async fn submit_calls(&self, calls: &[ContractCall], chain_id: u64) -> Result<SubmissionHandle>;

    /// Status of a submitted batch
    async fn get_calls_status(&self, handle: &SubmissionHandle) -> Result<CallsStatus>;

    /// Wait until `transaction_hash` is mined with one confirmation
    async fn wait_for_transaction_receipt(&self, transaction_hash: &str) -> Result<TransactionReceipt>;
}
