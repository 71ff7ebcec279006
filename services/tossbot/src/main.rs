//! Toss bot: chat-native wagers with on-chain USDC stakes.
//!
//! Reads configuration from the environment, wires the store, wallet
//! provider, chain watcher, engine, and transport together, then runs
//! until interrupted.
//!
//! ```bash
//! # Run against the dev messaging network on Base Sepolia
//! TOSSBOT_WALLET_KEY=0x… TOSSBOT_DB_ENCRYPTION_KEY=… \
//! TOSSBOT_WALLET_API_KEY_ID=… TOSSBOT_WALLET_API_KEY_SECRET=… tossbot
//!
//! # Drive everything locally from stdin
//! tossbot --network-env local
//! ```

mod config;
mod transport_gateway;
mod transport_local;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tossbot_agent::{
    run_message_worker, AgentFront, FrontConfig, LlmParser, LlmParserConfig, RuleBasedParser,
    StreamWorkerConfig, TossParser, TransportFactory,
};
use tossbot_chain::{ChainWatcher, EvmRpcClient, RpcVerifier, VerifyConfig};
use tossbot_engine::{
    CorrelationLayer, CorrelationOutcome, MetadataBag, TossEngine, TossEvent, TxSource,
};
use tossbot_store::{JsonFileStore, Store};
use tossbot_types::{TossError, TossStatus};
use tossbot_wallet::{HttpWalletProvider, MockWalletProvider, WalletProvider, WalletServiceConfig};

use crate::config::{Args, NetworkEnv};
use crate::transport_gateway::{GatewayConfig, GatewayFactory};
use crate::transport_local::LocalFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_logging(&args)?;
    args.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = ?args.network_env,
        chain = %args.chain,
        "starting toss bot"
    );

    // Store and wallet provider.
    let store: Arc<dyn Store> = Arc::new(JsonFileStore::new(&args.data_dir, args.chain));
    let provider: Arc<dyn WalletProvider> = match args.network_env {
        NetworkEnv::Local => Arc::new(MockWalletProvider::new()),
        _ => Arc::new(HttpWalletProvider::new(WalletServiceConfig {
            base_url: args.wallet_service_url.clone(),
            api_key_id: args.wallet_api_key_id.clone().unwrap_or_default(),
            api_key_secret: args.wallet_api_key_secret.clone().unwrap_or_default(),
            network: args.chain,
        })),
    };

    // Chain access.
    let rpc = Arc::new(EvmRpcClient::new(args.rpc_url()));
    let verifier = Arc::new(RpcVerifier::new(
        Arc::clone(&rpc) as _,
        args.chain.usdc_address(),
        VerifyConfig::default(),
    ));
    let watcher = Arc::new(ChainWatcher::new(
        Arc::clone(&rpc) as _,
        args.chain.usdc_address(),
    ));

    // Engine and correlation.
    let engine = Arc::new(TossEngine::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        args.chain,
    ));
    let correlation = Arc::new(CorrelationLayer::new(
        Arc::clone(&store),
        Arc::clone(&verifier) as _,
    ));

    // The engine announces lifecycle changes; the watcher set follows.
    let watcher_for_events = Arc::clone(&watcher);
    engine.subscribe(Box::new(move |event| match event {
        TossEvent::Created { toss } => {
            watcher_for_events.add_wallet(toss.wallet_address.clone(), toss.id.clone());
        }
        TossEvent::Settled { toss } => {
            watcher_for_events.remove_wallet(&toss.wallet_address);
        }
        _ => {}
    }));

    // Watcher deliveries feed the correlation layer, then the engine.
    let correlation_for_watcher = Arc::clone(&correlation);
    let engine_for_watcher = Arc::clone(&engine);
    watcher.on_transaction(Arc::new(move |event, wallet| {
        let correlation = Arc::clone(&correlation_for_watcher);
        let engine = Arc::clone(&engine_for_watcher);
        Box::pin(async move {
            let outcome = correlation
                .resolve(TxSource::Event(event), &MetadataBag::new(), None)
                .await;
            match outcome {
                Ok(CorrelationOutcome::Matched { toss_id, option, sender }) => {
                    match engine.add_participant(&toss_id, &sender, &option, true).await {
                        Ok(_) => {}
                        Err(TossError::DuplicateParticipant { .. }) => {
                            tracing::debug!(toss_id = %toss_id, "redelivered payment already applied");
                        }
                        Err(e) => {
                            tracing::warn!(toss_id = %toss_id, error = %e, "watcher join failed");
                        }
                    }
                }
                Ok(CorrelationOutcome::Discarded(reason)) => {
                    tracing::debug!(?reason, toss_id = %wallet.toss_id, "watcher payment discarded");
                }
                Err(e) => {
                    tracing::warn!(toss_id = %wallet.toss_id, error = %e, "watcher payment unresolved");
                }
            }
        })
    }));

    // Rebuild the monitored set from the surviving records.
    reconcile_on_startup(&engine, &watcher).await?;
    watcher.start(Duration::from_secs(args.poll_interval_secs));

    // Front-end and transport.
    let parser: Arc<dyn TossParser> = match &args.llm_api_key {
        Some(key) => Arc::new(LlmParser::new(LlmParserConfig::new(key.clone()))),
        None => Arc::new(RuleBasedParser::new()),
    };
    let front = Arc::new(AgentFront::new(
        Arc::clone(&engine),
        Arc::clone(&correlation),
        parser,
        Arc::clone(&watcher),
        FrontConfig {
            command_prefix: args.command_prefix.clone(),
            allowed_commands: args.allowed_command_list(),
            welcome_dm: args.welcome_dm.clone(),
            welcome_group: args.welcome_group.clone(),
        },
    ));

    let factory: Arc<dyn TransportFactory> = match args.network_env {
        NetworkEnv::Local => Arc::new(LocalFactory),
        env => Arc::new(GatewayFactory::new(GatewayConfig {
            base_url: args.gateway_url.clone(),
            wallet_key: args.wallet_key.clone().unwrap_or_default(),
            db_encryption_key: args.db_encryption_key.clone().unwrap_or_default(),
            env: if env == NetworkEnv::Production { "production" } else { "dev" }.to_string(),
        })),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(run_message_worker(
        factory,
        front,
        StreamWorkerConfig::default(),
        shutdown_rx,
    ));

    shutdown_signal().await;

    // Stop intake, drain in-flight work, then stop the watcher.
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(10), worker).await;
    watcher.stop().await;

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match args.log_format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().with_target(true)).init(),
    }
    Ok(())
}

/// Re-register escrow wallets for every surviving non-terminal toss and
/// flag records stranded mid-distribution.
async fn reconcile_on_startup(
    engine: &Arc<TossEngine>,
    watcher: &Arc<ChainWatcher>,
) -> anyhow::Result<()> {
    let active = engine.list_active().await?;
    for toss in &active {
        if toss.status == TossStatus::InProgress {
            // Payouts may or may not have gone out before the crash;
            // never retried automatically.
            tracing::warn!(
                toss_id = %toss.id,
                "toss was IN_PROGRESS at shutdown; operator review required"
            );
        }
        watcher.add_wallet(toss.wallet_address.clone(), toss.id.clone());
    }
    tracing::info!(count = active.len(), "restored monitored escrow wallets");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
