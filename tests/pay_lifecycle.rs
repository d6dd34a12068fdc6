use onchain_pay::config::wallet::{ConnectorChoice, SmartWalletPreference};
use onchain_pay::sandbox::{
    Sandbox, SandboxCommerce, SandboxTransactionClient, SandboxWallet, SubmitFailure, TransactionScript,
    WalletRequest,
};
use onchain_pay::status::{StatusEvent, SuccessData};
use onchain_pay::transaction::ContractCall;
use onchain_pay::{LifecycleStatus, PayConfig, PaySession, Phase, SubmitOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const BASE: u64 = 8453;

struct Harness {
    sandbox: Sandbox,
    session: PaySession,
    observed: Arc<Mutex<Vec<LifecycleStatus>>>,
    events: broadcast::Receiver<StatusEvent>,
}

fn harness(sandbox: Sandbox, configure: impl FnOnce(onchain_pay::PaySessionBuilder) -> onchain_pay::PaySessionBuilder) -> Harness {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let builder = PaySession::builder(PayConfig::default(), sandbox.capabilities())
        .on_status(move |status| sink.lock().push(status.clone()));
    let session = configure(builder).build().unwrap();
    let events = session.subscribe();
    Harness {
        sandbox,
        session,
        observed,
        events,
    }
}

fn product_harness(sandbox: Sandbox) -> Harness {
    harness(sandbox, |b| b.product_id("prod_123"))
}

async fn wait_for_terminal(events: &mut broadcast::Receiver<StatusEvent>) -> LifecycleStatus {
    loop {
        let event = events.recv().await.unwrap();
        if event.status.is_terminal() {
            return event.status;
        }
    }
}

fn assert_expected_edges(observed: &[LifecycleStatus]) {
    for pair in observed.windows(2) {
        assert!(
            LifecycleStatus::is_expected_transition(pair[0].name(), pair[1].name()),
            "unexpected transition {} -> {}",
            pair[0].name(),
            pair[1].name()
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_product_payment_with_disconnected_wallet_succeeds() {
    let mut h = product_harness(Sandbox::default());

    let outcome = h.session.on_submit().await;
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Pending);
    assert_eq!(h.session.phase(), Phase::Confirming);

    let status = wait_for_terminal(&mut h.events).await;

    let LifecycleStatus::Success(data) = status else {
        panic!("expected success, got {:?}", status);
    };
    assert_eq!(data.charge_id, "charge_prod_123");
    assert_eq!(
        data.receipt_url.as_deref(),
        Some("https://commerce.coinbase.com/pay/charge_prod_123/receipt")
    );
    assert!(!data.transaction_receipts.is_empty());

    assert_eq!(
        h.sandbox.wallet.requests(),
        vec![
            WalletRequest::SwitchChain(BASE),
            WalletRequest::Connect(ConnectorChoice::Available("coinbaseWalletSDK".to_string())),
        ]
    );
    assert_eq!(
        h.sandbox.commerce.requests(),
        vec!["create_charge:prod_123".to_string(), "build_pay_calls:charge_prod_123".to_string()]
    );
    assert_eq!(h.sandbox.transactions.submissions().len(), 1);
    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(h.session.error_message(), None);

    let observed = h.observed.lock().clone();
    let names: Vec<_> = observed.iter().map(|s| s.name().as_str()).collect();
    assert_eq!(names, vec!["init", "pending", "success"]);
    assert_expected_edges(&observed);
}

#[tokio::test(start_paused = true)]
async fn test_resubmit_after_success_only_opens_receipt() {
    let mut h = product_harness(Sandbox::default());
    h.session.on_submit().await;
    wait_for_terminal(&mut h.events).await;

    let wallet_requests = h.sandbox.wallet.requests().len();
    let commerce_requests = h.sandbox.commerce.requests().len();

    for _ in 0..3 {
        assert_eq!(h.session.on_submit().await, SubmitOutcome::OpenedReceipt);
    }

    assert_eq!(h.sandbox.wallet.requests().len(), wallet_requests);
    assert_eq!(h.sandbox.commerce.requests().len(), commerce_requests);
    assert_eq!(h.sandbox.transactions.submissions().len(), 1);
    assert_eq!(
        h.sandbox.navigator.opened(),
        vec!["https://commerce.coinbase.com/pay/charge_prod_123/receipt".to_string(); 3]
    );

    // Each press re-emits success
    let observed = h.observed.lock().clone();
    assert_eq!(observed.len(), 3 + 3);
    assert!(observed[2..].iter().all(|s| matches!(s, LifecycleStatus::Success(_))));
    assert_expected_edges(&observed);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_balance_stops_before_submission() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new().with_insufficient_balance(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::InsufficientBalance);

    assert_eq!(
        h.session.error_message().as_deref(),
        Some("You don't have enough USDC. Add funds and try again.")
    );
    let status = h.session.lifecycle_status();
    assert_eq!(status.error_code(), Some("INSUFFICIENT_BALANCE"));
    assert!(h.sandbox.transactions.submissions().is_empty());
    assert_eq!(h.session.phase(), Phase::Idle);

    // Pressing again only sends the user to fund their wallet
    let commerce_requests = h.sandbox.commerce.requests().len();
    assert_eq!(h.session.on_submit().await, SubmitOutcome::OpenedFunding);
    assert_eq!(h.session.on_submit().await, SubmitOutcome::OpenedFunding);
    assert_eq!(h.sandbox.commerce.requests().len(), commerce_requests);
    assert!(h.sandbox.wallet.requests().is_empty());
    assert!(h.sandbox.transactions.submissions().is_empty());
    assert_eq!(
        h.sandbox.navigator.opened(),
        vec!["https://keys.coinbase.com/fund".to_string(); 2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_chain_switch_happens_before_anything_else() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(1),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let mut h = product_harness(sandbox);

    h.session.on_submit().await;
    wait_for_terminal(&mut h.events).await;

    assert_eq!(h.sandbox.wallet.requests(), vec![WalletRequest::SwitchChain(BASE)]);
    assert_eq!(h.sandbox.transactions.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_chain_switch_is_a_generic_error() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(1).failing_switch(),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);

    let LifecycleStatus::Error(data) = h.session.lifecycle_status() else {
        panic!("expected error status");
    };
    assert_eq!(data.code, "UNEXPECTED_ERROR");
    assert_eq!(data.message, "Something went wrong. Please try again.");
    assert!(data.error.contains("Chain switch failed"));
    assert_eq!(
        h.session.error_message().as_deref(),
        Some("Something went wrong. Please try again.")
    );
    assert!(h.sandbox.commerce.requests().is_empty());
    assert!(h.sandbox.transactions.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_chain_switch_only_sets_message() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(1).rejecting_switch(),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Rejected);

    assert_eq!(h.session.error_message().as_deref(), Some("Request denied."));
    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Init);
    assert_eq!(h.observed.lock().len(), 1);
    assert_eq!(h.session.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_connection_only_sets_message() {
    let sandbox = Sandbox::new(
        SandboxWallet::disconnected().rejecting_connect(),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Rejected);

    assert_eq!(h.session.error_message().as_deref(), Some("Request denied."));
    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Init);
    assert!(h.sandbox.commerce.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_sets_status_not_message() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0).failing_submit(SubmitFailure::Rejected)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Rejected);

    assert_eq!(h.session.error_message(), None);
    let LifecycleStatus::Error(data) = h.session.lifecycle_status() else {
        panic!("expected error status");
    };
    assert_eq!(data.message, "Request denied.");
    assert_eq!(data.code, "PmUWCSh01");

    let observed = h.observed.lock().clone();
    let names: Vec<_> = observed.iter().map(|s| s.name().as_str()).collect();
    assert_eq!(names, vec!["init", "pending", "error"]);
    assert_expected_edges(&observed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_submission_uses_generic_message_and_can_retry() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0).failing_submit(SubmitFailure::Failed)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);
    let LifecycleStatus::Error(data) = h.session.lifecycle_status() else {
        panic!("expected error status");
    };
    assert_eq!(data.message, "Something went wrong. Please try again.");

    // A generic error does not short-circuit; the pipeline runs again
    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);
    assert_eq!(h.sandbox.transactions.submissions().len(), 2);
    assert_eq!(h.sandbox.commerce.requests().len(), 4);
    assert_expected_edges(&h.observed.lock());
}

#[tokio::test(start_paused = true)]
async fn test_charge_handler_failure_is_charge_error() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = harness(sandbox, |b| {
        b.charge_handler(|| async { Err::<String, _>(anyhow::anyhow!("charge service unavailable")) })
    });

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);

    assert_eq!(h.session.lifecycle_status().error_code(), Some("CHARGE_ERROR"));
    assert_eq!(
        h.session.error_message().as_deref(),
        Some("Something went wrong. Please try again.")
    );
    assert!(h.sandbox.transactions.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_charge_handler_supplies_charge_for_receipt() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let mut h = harness(sandbox, |b| {
        b.charge_handler(|| async { Ok::<_, anyhow::Error>("charge_from_handler".to_string()) })
    });

    h.session.on_submit().await;
    let status = wait_for_terminal(&mut h.events).await;

    let LifecycleStatus::Success(data) = status else {
        panic!("expected success");
    };
    assert_eq!(data.charge_id, "charge_from_handler");
    assert_eq!(h.sandbox.commerce.requests(), vec!["build_pay_calls:charge_from_handler".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_pre_supplied_calls_skip_resolution() {
    let calls = vec![ContractCall::new("0x0000000000000000000000000000000000000001", "mint").with_value(1)];
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(1)),
    );
    let mut h = harness(sandbox, |b| b.calls(calls.clone()));

    h.session.on_submit().await;
    let status = wait_for_terminal(&mut h.events).await;

    let LifecycleStatus::Success(data) = status else {
        panic!("expected success");
    };
    assert_eq!(data.charge_id, "");
    assert_eq!(data.receipt_url, None);
    assert!(h.sandbox.commerce.requests().is_empty());
    assert_eq!(h.sandbox.transactions.submissions(), vec![calls]);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::OpenedReceipt);
    assert!(h.sandbox.navigator.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_to_smart_wallet_connector() {
    let sandbox = Sandbox::new(
        SandboxWallet::disconnected().with_connectors(vec!["injected".to_string()]),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    h.session.on_submit().await;

    assert!(h
        .sandbox
        .wallet
        .requests()
        .contains(&WalletRequest::Connect(ConnectorChoice::SmartWallet(
            SmartWalletPreference::SmartWalletOnly
        ))));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submit_is_busy() {
    let sandbox = Sandbox::new(
        SandboxWallet::disconnected().with_latency(Duration::from_secs(2)),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(3)),
    );
    let mut h = product_harness(sandbox);

    let session = h.session.clone();
    let first = tokio::spawn(async move { session.on_submit().await });
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(h.session.phase(), Phase::SwitchingChain);
    assert_eq!(h.session.on_submit().await, SubmitOutcome::Busy);

    assert!(matches!(first.await.unwrap(), SubmitOutcome::Submitted(_)));

    // Still busy while confirmation is tracked
    assert_eq!(h.session.phase(), Phase::Confirming);
    assert_eq!(h.session.on_submit().await, SubmitOutcome::Busy);

    wait_for_terminal(&mut h.events).await;
    assert_eq!(h.sandbox.transactions.submissions().len(), 1);
    assert_eq!(
        h.sandbox
            .wallet
            .requests()
            .iter()
            .filter(|r| matches!(r, WalletRequest::Connect(_)))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_stale_confirmation() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::never_confirm()),
    );
    let h = product_harness(sandbox);

    assert!(matches!(h.session.on_submit().await, SubmitOutcome::Submitted(_)));
    tokio::time::sleep(Duration::from_secs(3)).await;

    h.session.reset();
    assert_eq!(h.session.phase(), Phase::Idle);

    // Past the confirmation timeout of the abandoned attempt
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Init);
    let observed = h.observed.lock().clone();
    assert_eq!(observed.last(), Some(&LifecycleStatus::Init));
    assert!(!observed.iter().any(|s| s.error_code() == Some("PmCTTh01")));
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_becomes_error() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::never_confirm()),
    );
    let mut h = product_harness(sandbox);

    h.session.on_submit().await;
    let status = wait_for_terminal(&mut h.events).await;

    assert_eq!(status.error_code(), Some("PmCTTh01"));
    assert_eq!(h.session.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_error_and_success_hooks() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let successes = Arc::new(Mutex::new(Vec::new()));

    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let (error_sink, success_sink) = (errors.clone(), successes.clone());
    let mut h = harness(sandbox, move |b| {
        b.product_id("prod_123")
            .on_error(move |e| error_sink.lock().push(e.code.clone()))
            .on_success(move |s| success_sink.lock().push(s.charge_id.clone()))
    });

    h.session.on_submit().await;
    wait_for_terminal(&mut h.events).await;

    assert!(errors.lock().is_empty());
    assert_eq!(*successes.lock(), vec!["charge_prod_123".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_sequence_matches_observer() {
    let mut h = product_harness(Sandbox::default());

    h.session.on_submit().await;
    wait_for_terminal(&mut h.events).await;

    let mut rx = h.session.subscribe();
    h.session.on_submit().await;
    let event = rx.recv().await.unwrap();

    assert_eq!(event.session_id, h.session.session_id());
    assert_eq!(event.sequence as usize, h.observed.lock().len() - 1);
    assert!(matches!(event.status, LifecycleStatus::Success(_)));
}

#[tokio::test(start_paused = true)]
async fn test_commerce_failure_is_charge_error_not_insufficient_balance() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new().failing(),
        SandboxTransactionClient::new(TransactionScript::confirm_after(0)),
    );
    let h = product_harness(sandbox);

    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);

    let status = h.session.lifecycle_status();
    assert_eq!(status.error_code(), Some("CHARGE_ERROR"));
    assert!(!status.is_insufficient_balance());
    assert_eq!(
        h.session.error_message().as_deref(),
        Some("Something went wrong. Please try again.")
    );
    assert_eq!(h.sandbox.commerce.requests(), vec!["create_charge:prod_123".to_string()]);
    assert!(h.sandbox.transactions.submissions().is_empty());

    // A charge error is retried, never sent to the funding page
    assert_eq!(h.session.on_submit().await, SubmitOutcome::Failed);
    assert!(h.sandbox.navigator.opened().is_empty());
    assert_expected_edges(&h.observed.lock());
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_submission_supersedes_attempt() {
    let sandbox = Sandbox::new(
        SandboxWallet::connected(BASE),
        SandboxCommerce::new(),
        SandboxTransactionClient::new(
            TransactionScript::confirm_after(0).with_submit_latency(Duration::from_secs(2)),
        ),
    );
    let h = product_harness(sandbox);

    let session = h.session.clone();
    let attempt = tokio::spawn(async move { session.on_submit().await });
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(h.session.phase(), Phase::Submitting);
    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Pending);

    h.session.reset();

    assert_eq!(attempt.await.unwrap(), SubmitOutcome::Superseded);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.session.lifecycle_status(), LifecycleStatus::Init);
    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(h.sandbox.transactions.submissions().len(), 1);
    // No tracker was started for the abandoned submission
    assert_eq!(h.sandbox.transactions.status_polls(), 0);

    let observed = h.observed.lock().clone();
    let names: Vec<_> = observed.iter().map(|s| s.name().as_str()).collect();
    assert_eq!(names, vec!["init", "pending", "init"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_receipt_reopen_racing_reset_completes() {
    let slot: Arc<Mutex<Option<PaySession>>> = Arc::new(Mutex::new(None));
    let armed = Arc::new(AtomicBool::new(false));

    let sandbox = Sandbox::default();
    let (reader, gate) = (slot.clone(), armed.clone());
    let session = PaySession::builder(PayConfig::default(), sandbox.capabilities())
        .product_id("prod_123")
        .on_status(move |status| {
            if gate.load(Ordering::SeqCst) && matches!(status, LifecycleStatus::Success(_)) {
                // Hold the emission long enough for the reset to contend
                std::thread::sleep(Duration::from_millis(300));
                let session = reader.lock().clone();
                if let Some(session) = session {
                    let _ = session.phase();
                    let _ = session.error_message();
                }
            }
        })
        .build()
        .unwrap();
    *slot.lock() = Some(session.clone());

    session.update_lifecycle_status(LifecycleStatus::Success(SuccessData {
        transaction_receipts: Vec::new(),
        charge_id: "charge_prod_123".to_string(),
        receipt_url: Some("https://commerce.coinbase.com/pay/charge_prod_123/receipt".to_string()),
    }));
    armed.store(true, Ordering::SeqCst);

    let submitter = session.clone();
    let reopen = tokio::spawn(async move { submitter.on_submit().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let resetter = session.clone();
    let reset = tokio::task::spawn_blocking(move || resetter.reset());

    let joined = tokio::time::timeout(Duration::from_secs(5), async { (reopen.await, reset.await) }).await;
    let (reopen, reset) = joined.expect("reopen and reset should both return");

    assert_eq!(reopen.unwrap(), SubmitOutcome::OpenedReceipt);
    reset.unwrap();
    assert_eq!(session.lifecycle_status(), LifecycleStatus::Init);
    assert_eq!(sandbox.navigator.opened().len(), 1);

    slot.lock().take();
}
