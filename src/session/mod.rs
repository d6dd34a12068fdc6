//! Payment session: the public surface over one payment lifecycle

use crate::config::PayConfig;
use crate::error::{PayError, Result};
use crate::network::Capabilities;
use crate::status::{
    ErrorData, LifecycleStatus, StatusEmitter, StatusEvent, StatusObserver, StatusSink, StatusStore,
    SuccessData,
};
use crate::transaction::resolver::ChargeSource;
use crate::transaction::{
    CallResolver, ChargeHandler, ConfirmationTracker, ContractCall, ResolvedCallSet, SubmissionHandle,
};
use futures::FutureExt;
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

mod coordinator;

/// Where the coordinator is within an attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    SwitchingChain,
    Connecting,
    Resolving,
    Submitting,
    Confirming,
}

/// What one `on_submit` invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Status was `success`; the receipt page was opened
    OpenedReceipt,
    /// Status was an insufficient-balance error; the funding page was opened
    OpenedFunding,
    /// Another attempt is in flight
    Busy,
    /// Calls were submitted and confirmation tracking started
    Submitted(SubmissionHandle),
    /// The payer cannot cover the charge
    InsufficientBalance,
    /// The user declined a wallet request
    Rejected,
    /// The attempt ended with an error status
    Failed,
    /// A reset or external status update replaced this attempt
    Superseded,
}

/// Scratch state owned by the current attempt
#[derive(Debug)]
struct AttemptState {
    generation: u64,
    phase: Phase,
    calls: Option<ResolvedCallSet>,
    insufficient_balance: bool,
    handle: Option<SubmissionHandle>,
    error_message: Option<String>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
            calls: None,
            insufficient_balance: false,
            handle: None,
            error_message: None,
        }
    }

    fn clear(&mut self) {
        self.calls = None;
        self.insufficient_balance = false;
        self.handle = None;
        self.error_message = None;
    }
}

struct SessionInner {
    id: Uuid,
    config: PayConfig,
    chain_id: u64,
    capabilities: Capabilities,
    resolver: CallResolver,
    tracker: ConfirmationTracker,
    store: StatusStore,
    // Taken before any status store lock. Reentrant so observers run during
    // a guarded transition can read the session.
    attempt: ReentrantMutex<RefCell<AttemptState>>,
}

impl SessionInner {
    /// Claim the session for a new attempt unless one is in flight
    fn begin_attempt(&self, phase: Phase) -> Option<u64> {
        let guard = self.attempt.lock();
        let mut attempt = guard.borrow_mut();
        if attempt.phase != Phase::Idle {
            return None;
        }
        attempt.generation += 1;
        attempt.phase = phase;
        attempt.clear();
        Some(attempt.generation)
    }

    /// Invalidate any attempt in flight and write `status`
    fn supersede(&self, status: LifecycleStatus, clear_message: bool) {
        let guard = self.attempt.lock();
        {
            let mut attempt = guard.borrow_mut();
            attempt.generation += 1;
            attempt.phase = Phase::Idle;
            attempt.calls = None;
            attempt.insufficient_balance = false;
            attempt.handle = None;
            if clear_message {
                attempt.error_message = None;
            }
        }
        self.store.transition(status);
    }
}

/// View of the session bound to one attempt generation.
///
/// Every write is dropped once the attempt has been superseded.
struct AttemptScope<'a> {
    inner: &'a SessionInner,
    generation: u64,
}

impl<'a> AttemptScope<'a> {
    fn new(inner: &'a SessionInner, generation: u64) -> Self {
        Self { inner, generation }
    }

    /// Run `f` on the attempt state if this attempt is still current
    fn with<R>(&self, f: impl FnOnce(&mut AttemptState) -> R) -> Option<R> {
        let guard = self.inner.attempt.lock();
        let mut attempt = guard.borrow_mut();
        if attempt.generation != self.generation {
            return None;
        }
        Some(f(&mut attempt))
    }

    fn is_current(&self) -> bool {
        self.with(|_| ()).is_some()
    }

    fn set_phase(&self, phase: Phase) -> bool {
        self.with(|attempt| attempt.phase = phase).is_some()
    }

    fn set_error_message(&self, message: &str) {
        self.with(|attempt| attempt.error_message = Some(message.to_string()));
    }

    /// Apply `status` if this attempt is still current
    fn apply(&self, status: LifecycleStatus) -> bool {
        let guard = self.inner.attempt.lock();
        if guard.borrow().generation != self.generation {
            debug!("Dropping status {} from superseded attempt", status.name());
            return false;
        }
        self.inner.store.transition(status);
        true
    }

    /// Apply the tracker's terminal status if `handle` is still the live submission
    fn complete(&self, handle: &SubmissionHandle, status: LifecycleStatus) -> bool {
        let guard = self.inner.attempt.lock();
        {
            let mut attempt = guard.borrow_mut();
            if attempt.generation != self.generation || attempt.handle.as_ref() != Some(handle) {
                return false;
            }
            attempt.phase = Phase::Idle;
        }
        self.inner.store.transition(status);
        true
    }
}

impl StatusSink for AttemptScope<'_> {
    fn transition(&self, status: LifecycleStatus) {
        self.apply(status);
    }
}

/// Returns the session to `Idle` when an attempt ends without handing off to
/// the tracker
struct PhaseGuard<'a> {
    scope: &'a AttemptScope<'a>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.scope.with(|attempt| {
            if attempt.phase != Phase::Confirming {
                attempt.phase = Phase::Idle;
            }
        });
    }
}

/// One payment lifecycle: wallet connection through receipt confirmation
#[derive(Clone)]
pub struct PaySession {
    inner: Arc<SessionInner>,
}

impl PaySession {
    pub fn builder(config: PayConfig, capabilities: Capabilities) -> PaySessionBuilder {
        PaySessionBuilder::new(config, capabilities)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.id
    }

    /// Chain the calls are submitted on
    pub fn chain_id(&self) -> u64 {
        self.inner.chain_id
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        self.inner.store.get()
    }

    /// Message for rejections and balance problems, if any
    pub fn error_message(&self) -> Option<String> {
        let guard = self.inner.attempt.lock();
        let message = guard.borrow().error_message.clone();
        message
    }

    pub fn phase(&self) -> Phase {
        let guard = self.inner.attempt.lock();
        let phase = guard.borrow().phase;
        phase
    }

    /// Stream of status changes published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.store.subscribe()
    }

    /// Write a status from outside the coordinator.
    ///
    /// Any attempt in flight is superseded; its later results are discarded.
    pub fn update_lifecycle_status(&self, status: LifecycleStatus) {
        info!(session = %self.inner.id, "External status update to {}", status.name());
        self.inner.supersede(status, false);
    }

    /// Abandon the current attempt and return to `init`
    pub fn reset(&self) {
        info!(session = %self.inner.id, "Resetting payment session");
        self.inner.supersede(LifecycleStatus::Init, true);
    }
}

/// Builder for [`PaySession`]
pub struct PaySessionBuilder {
    config: PayConfig,
    capabilities: Capabilities,
    chain_id: Option<u64>,
    calls: Option<Vec<ContractCall>>,
    product_id: Option<String>,
    charge_handler: Option<ChargeHandler>,
    emitter: StatusEmitter,
    id: Uuid,
}

impl PaySessionBuilder {
    fn new(config: PayConfig, capabilities: Capabilities) -> Self {
        let id = Uuid::new_v4();
        Self {
            config,
            capabilities,
            chain_id: None,
            calls: None,
            product_id: None,
            charge_handler: None,
            emitter: StatusEmitter::new(id, crate::defaults::STATUS_CHANNEL_CAPACITY),
            id,
        }
    }

    /// Override the configured chain
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Submit these calls instead of resolving a charge
    pub fn calls(mut self, calls: Vec<ContractCall>) -> Self {
        self.calls = Some(calls);
        self
    }

    /// Pay for a commerce product; a charge is created per attempt
    pub fn product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Obtain the charge id from the caller
    pub fn charge_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.charge_handler = Some(Arc::new(move || handler().boxed()));
        self
    }

    pub fn on_status(mut self, observer: impl Fn(&LifecycleStatus) + Send + Sync + 'static) -> Self {
        let observer: StatusObserver = Arc::new(observer);
        self.emitter.on_status(observer);
        self
    }

    pub fn on_error(mut self, observer: impl Fn(&ErrorData) + Send + Sync + 'static) -> Self {
        self.emitter.on_error(Arc::new(observer));
        self
    }

    pub fn on_success(mut self, observer: impl Fn(&SuccessData) + Send + Sync + 'static) -> Self {
        self.emitter.on_success(Arc::new(observer));
        self
    }

    /// Validate the inputs and start the session in `init`
    pub fn build(self) -> Result<PaySession> {
        self.config.validate()?;

        // Pre-supplied calls win over a product, which wins over a handler
        let source = match (self.calls, self.product_id, self.charge_handler) {
            (Some(calls), _, _) if calls.is_empty() => {
                return Err(invalid("Pre-supplied call list is empty"));
            }
            (Some(calls), _, _) => ChargeSource::Calls(calls),
            (None, Some(product_id), _) if product_id.trim().is_empty() => {
                return Err(invalid("Product id is empty"));
            }
            (None, Some(product_id), _) => ChargeSource::Product(product_id),
            (None, None, Some(handler)) => ChargeSource::Handler(handler),
            (None, None, None) => {
                return Err(invalid("One of calls, product id or charge handler is required"));
            }
        };

        let chain_id = self.chain_id.unwrap_or(self.config.chain.chain_id);
        if chain_id == 0 {
            return Err(invalid("Chain id must be non-zero"));
        }

        info!(session = %self.id, chain_id, "Starting payment session with {:?}", source);

        let resolver = CallResolver::new(source, self.capabilities.commerce.clone());
        let tracker = ConfirmationTracker::new(
            self.capabilities.transactions.clone(),
            self.config.commerce.clone(),
            self.config.tracking.clone(),
        )?;
        let store = StatusStore::new(self.emitter);

        Ok(PaySession {
            inner: Arc::new(SessionInner {
                id: self.id,
                config: self.config,
                chain_id,
                capabilities: self.capabilities,
                resolver,
                tracker,
                store,
                attempt: ReentrantMutex::new(RefCell::new(AttemptState::new())),
            }),
        })
    }
}

fn invalid(message: &str) -> PayError {
    PayError::Config(config::ConfigError::Message(message.to_string()))
}
