//! Submission pipeline behind `PaySession::on_submit`

use super::{AttemptScope, PaySession, Phase, PhaseGuard, SubmitOutcome};
use crate::error::messages::{
    CONTRACTS_UNAVAILABLE, GENERIC_ERROR_MESSAGE, INSUFFICIENT_BALANCE_ERROR,
    INSUFFICIENT_BALANCE_ERROR_MESSAGE, USER_REJECTED_ERROR,
};
use crate::error::{codes, PayError, PayErrorCode, Result};
use crate::network::ConnectionState;
use crate::status::LifecycleStatus;
use crate::transaction::{Resolution, ResolveContext, SubmissionHandle};
use tracing::{debug, error, info, warn};

impl PaySession {
    /// Entry point for a user's "pay" action.
    ///
    /// Never fails: every problem ends as a status transition or an
    /// [`error_message`](Self::error_message), and the returned outcome says
    /// which path was taken.
    pub async fn on_submit(&self) -> SubmitOutcome {
        let inner = &self.inner;
        let current = inner.store.get();

        if let LifecycleStatus::Success(data) = &current {
            match &data.receipt_url {
                Some(url) => inner.capabilities.navigator.open(url),
                None => debug!("Payment already succeeded; no charge receipt to open"),
            }
            // Attempt lock before status lock, as every other writer takes them
            let _attempt = inner.attempt.lock();
            inner.store.transition(current.clone());
            return SubmitOutcome::OpenedReceipt;
        }

        if current.is_insufficient_balance() {
            inner.capabilities.navigator.open(&inner.config.commerce.funding_url);
            return SubmitOutcome::OpenedFunding;
        }

        let connection = inner.capabilities.wallet.connection_state();
        let first_phase = if connection.chain_id != Some(inner.chain_id) {
            Phase::SwitchingChain
        } else if connection.is_connected {
            Phase::Resolving
        } else {
            Phase::Connecting
        };

        let Some(generation) = inner.begin_attempt(first_phase) else {
            warn!(session = %inner.id, "Submit ignored, attempt already in flight ({:?})", self.phase());
            return SubmitOutcome::Busy;
        };

        info!(session = %inner.id, generation, "Starting payment attempt");
        let scope = AttemptScope::new(inner, generation);
        let _phase = PhaseGuard { scope: &scope };

        match self.run_attempt(&scope, connection).await {
            Ok(outcome) => outcome,
            Err(e) => self.handle_attempt_error(&scope, e),
        }
    }

    async fn run_attempt(&self, scope: &AttemptScope<'_>, connection: ConnectionState) -> Result<SubmitOutcome> {
        let inner = &self.inner;
        let wallet = &inner.capabilities.wallet;

        if connection.chain_id != Some(inner.chain_id) {
            info!("Switching chain from {:?} to {}", connection.chain_id, inner.chain_id);
            wallet.switch_chain(inner.chain_id).await?;
            if !scope.is_current() {
                return Ok(SubmitOutcome::Superseded);
            }
        }

        let resolution = if connection.is_connected {
            if !scope.set_phase(Phase::Resolving) {
                return Ok(SubmitOutcome::Superseded);
            }
            self.resolve_calls(scope, connection.address).await
        } else {
            if !scope.set_phase(Phase::Connecting) {
                return Ok(SubmitOutcome::Superseded);
            }
            let connector = inner.config.wallet.choose_connector(&wallet.connectors());
            info!("Requesting wallet connection via {:?}", connector);
            let connected = wallet.connect(connector).await?;
            self.on_connected(scope, connected).await
        };

        let Some(resolution) = resolution else {
            return Ok(SubmitOutcome::Superseded);
        };
        if resolution == Resolution::Failed {
            scope.set_error_message(GENERIC_ERROR_MESSAGE);
            return Ok(SubmitOutcome::Failed);
        }

        let Some((insufficient_balance, call_set)) =
            scope.with(|attempt| (attempt.insufficient_balance, attempt.calls.clone()))
        else {
            return Ok(SubmitOutcome::Superseded);
        };

        if insufficient_balance {
            scope.set_error_message(INSUFFICIENT_BALANCE_ERROR_MESSAGE);
            scope.apply(LifecycleStatus::error(
                PayErrorCode::InsufficientBalance.as_str(),
                INSUFFICIENT_BALANCE_ERROR,
                INSUFFICIENT_BALANCE_ERROR_MESSAGE,
            ));
            return Ok(SubmitOutcome::InsufficientBalance);
        }

        // The resolver reports an empty call set as a failure, so this only
        // fires when resolution finished without leaving calls behind
        let Some(call_set) = call_set.filter(|set| !set.is_empty()) else {
            return Ok(self.report_missing_calls(scope));
        };

        if !scope.set_phase(Phase::Submitting) || !scope.apply(LifecycleStatus::Pending) {
            return Ok(SubmitOutcome::Superseded);
        }

        info!("Submitting {} calls on chain {}", call_set.calls.len(), inner.chain_id);
        let handle = match inner
            .capabilities
            .transactions
            .submit_calls(&call_set.calls, inner.chain_id)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return Ok(self.handle_submit_error(scope, e)),
        };

        let stored = scope.with(|attempt| {
            attempt.handle = Some(handle.clone());
            attempt.phase = Phase::Confirming;
        });
        if stored.is_none() {
            return Ok(SubmitOutcome::Superseded);
        }

        info!("Submitted calls as {}", handle);
        self.spawn_tracker(scope.generation, handle.clone(), call_set.charge_id);
        Ok(SubmitOutcome::Submitted(handle))
    }

    /// Resolution triggered by a successful wallet connection
    async fn on_connected(&self, scope: &AttemptScope<'_>, connection: ConnectionState) -> Option<Resolution> {
        info!("Wallet connected as {}", connection.address.as_deref().unwrap_or("-"));
        if !scope.set_phase(Phase::Resolving) {
            return None;
        }
        self.resolve_calls(scope, connection.address).await
    }

    /// Resolve calls and record the result in the attempt state
    async fn resolve_calls(&self, scope: &AttemptScope<'_>, address: Option<String>) -> Option<Resolution> {
        let ctx = ResolveContext { address };
        let resolution = self.inner.resolver.resolve(&ctx, scope).await;

        scope.with(|attempt| {
            match &resolution {
                Resolution::Ready(call_set) => attempt.calls = Some(call_set.clone()),
                Resolution::InsufficientBalance => attempt.insufficient_balance = true,
                Resolution::Failed => attempt.calls = None,
            }
        })?;

        Some(resolution)
    }

    fn report_missing_calls(&self, scope: &AttemptScope<'_>) -> SubmitOutcome {
        warn!("No calls available to submit");
        scope.set_error_message(GENERIC_ERROR_MESSAGE);
        scope.apply(LifecycleStatus::error(
            PayErrorCode::UnexpectedError.as_str(),
            CONTRACTS_UNAVAILABLE,
            GENERIC_ERROR_MESSAGE,
        ));
        SubmitOutcome::Failed
    }

    fn handle_submit_error(&self, scope: &AttemptScope<'_>, e: PayError) -> SubmitOutcome {
        let rejected = e.is_user_rejected();
        let message = if rejected {
            USER_REJECTED_ERROR
        } else {
            GENERIC_ERROR_MESSAGE
        };
        warn!("Submitting calls failed ({}): {}", codes::SUBMIT_CALLS, e);

        if !scope.apply(LifecycleStatus::error(codes::SUBMIT_CALLS, e.to_string(), message)) {
            return SubmitOutcome::Superseded;
        }
        if rejected {
            SubmitOutcome::Rejected
        } else {
            SubmitOutcome::Failed
        }
    }

    fn handle_attempt_error(&self, scope: &AttemptScope<'_>, e: PayError) -> SubmitOutcome {
        if !scope.is_current() {
            debug!("Ignoring error from superseded attempt: {}", e);
            return SubmitOutcome::Superseded;
        }

        if e.is_user_rejected() {
            info!("User rejected the request: {}", e);
            scope.set_error_message(USER_REJECTED_ERROR);
            return SubmitOutcome::Rejected;
        }

        error!("Payment attempt failed: {}", e);
        scope.set_error_message(GENERIC_ERROR_MESSAGE);
        scope.apply(LifecycleStatus::error(
            PayErrorCode::UnexpectedError.as_str(),
            e.diagnostic(),
            GENERIC_ERROR_MESSAGE,
        ));
        SubmitOutcome::Failed
    }

    fn spawn_tracker(&self, generation: u64, handle: SubmissionHandle, charge_id: Option<String>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.tracker.track(&handle, charge_id.as_deref()).await;
            let scope = AttemptScope::new(&inner, generation);
            if !scope.complete(&handle, outcome.into_status()) {
                debug!("Discarding confirmation of superseded submission {}", handle);
            }
        });
    }
}
