use clap::Parser;
use onchain_pay::sandbox::{Sandbox, SandboxCommerce, SandboxTransactionClient, SandboxWallet, SubmitFailure, TransactionScript};
use onchain_pay::{LifecycleStatus, PayConfig, PaySession, Result, SubmitOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run one payment lifecycle against sandbox capabilities
#[derive(Parser, Debug)]
#[command(name = "onchain-pay", version)]
struct Args {
    /// Commerce product to pay for
    #[arg(long, default_value = "prod_123")]
    product_id: String,

    /// TOML configuration file; layered config/ files and PAY_* variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Make the sandbox report an insufficient balance
    #[arg(long)]
    insufficient_balance: bool,

    /// Make the sandbox wallet reject the submission
    #[arg(long)]
    reject: bool,

    /// Pending polls before the batch confirms
    #[arg(long, default_value_t = 2)]
    pending_polls: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PayConfig::from_file(path),
        None => PayConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    init_logging(&config)?;

    info!("Starting {} v{}", onchain_pay::NAME, onchain_pay::VERSION);
    info!("  Chain id: {}", config.chain.chain_id);
    info!("  Poll interval: {}ms", config.tracking.poll_interval_ms);
    info!("  Confirmation timeout: {}ms", config.tracking.timeout_ms);

    let mut commerce = SandboxCommerce::new();
    if args.insufficient_balance {
        commerce = commerce.with_insufficient_balance();
    }
    let mut script = TransactionScript::confirm_after(args.pending_polls);
    if args.reject {
        script = script.failing_submit(SubmitFailure::Rejected);
    }
    let sandbox = Sandbox::new(
        SandboxWallet::disconnected(),
        commerce,
        SandboxTransactionClient::new(script),
    );

    let session = PaySession::builder(config.clone(), sandbox.capabilities())
        .product_id(args.product_id.clone())
        .on_status(|status| match serde_json::to_string(status) {
            Ok(json) => info!("status: {}", json),
            Err(e) => warn!("Failed to render status: {}", e),
        })
        .build()?;

    let mut events = session.subscribe();
    let outcome = session.on_submit().await;
    info!("Submit outcome: {:?}", outcome);

    if let SubmitOutcome::Submitted(_) = outcome {
        let deadline = config.tracking.timeout() + Duration::from_secs(1);
        let waited = tokio::time::timeout(deadline, async {
            while let Ok(event) = events.recv().await {
                if event.status.is_terminal() {
                    break;
                }
            }
        })
        .await;
        if waited.is_err() {
            warn!("No terminal status within {:?}", deadline);
        }
    }

    match session.lifecycle_status() {
        LifecycleStatus::Success(data) => {
            info!("Payment confirmed: {}", data.receipt_url.unwrap_or_default());
            // Second press opens the receipt instead of paying again
            session.on_submit().await;
        }
        LifecycleStatus::Error(data) => {
            error!("Payment failed [{}]: {} ({})", data.code, data.message, data.error);
            if session.lifecycle_status().is_insufficient_balance() {
                session.on_submit().await;
            }
        }
        other => info!("Payment ended in {}", other.name()),
    }

    if let Some(message) = session.error_message() {
        warn!("Error message: {}", message);
    }
    for url in sandbox.navigator.opened() {
        info!("Opened {}", url);
    }

    Ok(())
}

fn init_logging(config: &PayConfig) -> Result<()> {
    let log_level = std::env::var("PAY_LOG_LEVEL").unwrap_or_else(|_| config.logging.level.clone());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }

    Ok(())
}
