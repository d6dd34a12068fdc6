//! Scriptable in-memory batch submission and receipts

use crate::error::{PayError, Result};
use crate::network::TransactionClient;
use crate::transaction::{
    CallReceipt, CallsStatus, ContractCall, ReceiptStatus, SubmissionHandle, TransactionReceipt,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

/// How a scripted submission fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFailure {
    /// The user declines in the wallet
    Rejected,
    /// The wallet or RPC errors
    Failed,
}

/// Behaviour of the sandbox transaction client
#[derive(Debug, Clone)]
pub struct TransactionScript {
    /// Pending responses before confirmation; `None` never confirms
    pending_polls: Option<u32>,
    failing_polls: bool,
    reverted: bool,
    with_receipts: bool,
    submit_failure: Option<SubmitFailure>,
    submit_latency: Duration,
}

impl TransactionScript {
    pub fn confirm_after(pending_polls: u32) -> Self {
        Self {
            pending_polls: Some(pending_polls),
            failing_polls: false,
            reverted: false,
            with_receipts: true,
            submit_failure: None,
            submit_latency: Duration::ZERO,
        }
    }

    pub fn never_confirm() -> Self {
        Self {
            pending_polls: None,
            ..Self::confirm_after(0)
        }
    }

    pub fn failing_polls() -> Self {
        Self {
            failing_polls: true,
            ..Self::confirm_after(0)
        }
    }

    pub fn reverted(mut self) -> Self {
        self.reverted = true;
        self
    }

    pub fn without_receipts(mut self) -> Self {
        self.with_receipts = false;
        self
    }

    pub fn failing_submit(mut self, failure: SubmitFailure) -> Self {
        self.submit_failure = Some(failure);
        self
    }

    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = latency;
        self
    }
}

pub struct SandboxTransactionClient {
    script: TransactionScript,
    submissions: Mutex<Vec<Vec<ContractCall>>>,
    receipt_requests: Mutex<Vec<String>>,
    polls: AtomicU32,
}

impl SandboxTransactionClient {
    pub fn new(script: TransactionScript) -> Self {
        Self {
            script,
            submissions: Mutex::new(Vec::new()),
            receipt_requests: Mutex::new(Vec::new()),
            polls: AtomicU32::new(0),
        }
    }

    /// Call batches submitted so far
    pub fn submissions(&self) -> Vec<Vec<ContractCall>> {
        self.submissions.lock().clone()
    }

    pub fn status_polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn receipt_requests(&self) -> Vec<String> {
        self.receipt_requests.lock().clone()
    }

    /// Hash of the last receipt a confirmed batch reports
    pub fn last_transaction_hash(&self) -> String {
        transaction_hash(2)
    }
}

fn transaction_hash(index: u64) -> String {
    format!("0x{:064x}", index)
}

#[async_trait]
impl TransactionClient for SandboxTransactionClient {
    async fn submit_calls(&self, calls: &[ContractCall], chain_id: u64) -> Result<SubmissionHandle> {
        debug!("Sandbox submitting {} calls on chain {}", calls.len(), chain_id);
        let index = {
            let mut submissions = self.submissions.lock();
            submissions.push(calls.to_vec());
            submissions.len()
        };

        if !self.script.submit_latency.is_zero() {
            tokio::time::sleep(self.script.submit_latency).await;
        }

        match self.script.submit_failure {
            Some(SubmitFailure::Rejected) => Err(PayError::Rpc {
                code: crate::error::USER_REJECTED_RPC_CODE,
                message: "User rejected the request.".to_string(),
            }),
            Some(SubmitFailure::Failed) => Err(PayError::Submission("wallet_sendCalls failed".to_string())),
            None => Ok(SubmissionHandle(format!("batch-{}", index))),
        }
    }

    async fn get_calls_status(&self, handle: &SubmissionHandle) -> Result<CallsStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        debug!("Sandbox poll {} for {}", poll + 1, handle);

        if self.script.failing_polls {
            return Err(PayError::Rpc {
                code: -32603,
                message: "wallet_getCallsStatus failed".to_string(),
            });
        }

        match self.script.pending_polls {
            Some(pending) if poll >= pending => {
                let receipts = if self.script.with_receipts {
                    (1..=2)
                        .map(|i| CallReceipt {
                            transaction_hash: transaction_hash(i),
                            block_number: 100 + i,
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                Ok(CallsStatus::confirmed(receipts))
            }
            _ => Ok(CallsStatus::pending()),
        }
    }

    async fn wait_for_transaction_receipt(&self, hash: &str) -> Result<TransactionReceipt> {
        self.receipt_requests.lock().push(hash.to_string());
        Ok(TransactionReceipt {
            transaction_hash: hash.to_string(),
            block_number: 102,
            gas_used: 84_000,
            status: if self.script.reverted {
                ReceiptStatus::Reverted
            } else {
                ReceiptStatus::Success
            },
        })
    }
}
