//! Escrow-wallet transfer watcher.
//!
//! A long-running poller that walks the chain log by block range, one
//! checkpoint per monitored wallet, and feeds USDC `Transfer` events to
//! a single callback. Delivery is at-least-once: a failed scan leaves
//! the checkpoint where it was and the next tick retries the same
//! range, so the downstream correlation layer must be idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tossbot_types::{EvmAddress, TossId, TransferEvent};

use crate::rpc::ChainReader;

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How far behind head a freshly added wallet starts scanning.
const INITIAL_LOOKBACK_BLOCKS: u64 = 100;

/// A wallet on the scan list, with its per-wallet checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredWallet {
    pub address: EvmAddress,
    pub toss_id: TossId,
    /// Highest block already scanned; `None` until the first scan.
    pub last_scanned_block: Option<u64>,
}

/// Async callback invoked once per delivered transfer event.
pub type TransactionCallback =
    Arc<dyn Fn(TransferEvent, MonitoredWallet) -> BoxFuture<'static, ()> + Send + Sync>;

struct WatcherCore {
    reader: Arc<dyn ChainReader>,
    /// The stablecoin contract whose Transfer logs are scanned.
    token: EvmAddress,
    wallets: Mutex<HashMap<EvmAddress, MonitoredWallet>>,
    callback: Mutex<Option<TransactionCallback>>,
}

impl WatcherCore {
    /// One full pass over the monitored set.
    async fn scan_once(&self) {
        let head = match self.reader.block_number().await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(error = %e, "head block fetch failed; retrying next tick");
                return;
            }
        };

        let snapshot: Vec<MonitoredWallet> = self.wallets.lock().values().cloned().collect();
        for wallet in snapshot {
            self.scan_wallet(&wallet, head).await;
        }
    }

    async fn scan_wallet(&self, wallet: &MonitoredWallet, head: u64) {
        let from_block = match wallet.last_scanned_block {
            Some(last) => last + 1,
            None => head.saturating_sub(INITIAL_LOOKBACK_BLOCKS),
        };
        if from_block > head {
            return;
        }

        let events = match self
            .reader
            .transfer_logs_to(&self.token, &wallet.address, from_block, head)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                // Checkpoint untouched: the same range is retried next tick.
                tracing::warn!(wallet = %wallet.address, from_block, to_block = head, error = %e, "log scan failed");
                return;
            }
        };

        let callback = self.callback.lock().clone();
        for event in events {
            tracing::info!(
                wallet = %wallet.address,
                toss_id = %wallet.toss_id,
                tx = %event.tx_hash,
                value_micros = event.value_micros,
                block = event.block_number,
                "transfer observed"
            );
            if let Some(callback) = &callback {
                callback(event, wallet.clone()).await;
            }
        }

        // Advance only if the wallet was not removed mid-scan.
        if let Some(entry) = self.wallets.lock().get_mut(&wallet.address) {
            entry.last_scanned_block = Some(head);
        }
    }
}

/// The watcher worker: owns the monitored set and the polling task.
pub struct ChainWatcher {
    core: Arc<WatcherCore>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChainWatcher {
    pub fn new(reader: Arc<dyn ChainReader>, token: EvmAddress) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                reader,
                token,
                wallets: Mutex::new(HashMap::new()),
                callback: Mutex::new(None),
            }),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Begin monitoring an escrow wallet. The first scan looks back up
    /// to [`INITIAL_LOOKBACK_BLOCKS`] behind the head.
    pub fn add_wallet(&self, address: EvmAddress, toss_id: TossId) {
        tracing::info!(wallet = %address, toss_id = %toss_id, "monitoring escrow wallet");
        self.core.wallets.lock().insert(
            address.clone(),
            MonitoredWallet { address, toss_id, last_scanned_block: None },
        );
    }

    /// Stop monitoring and forget the checkpoint.
    pub fn remove_wallet(&self, address: &EvmAddress) {
        if self.core.wallets.lock().remove(address).is_some() {
            tracing::info!(wallet = %address, "stopped monitoring escrow wallet");
        }
    }

    /// Register the single delivery callback.
    pub fn on_transaction(&self, callback: TransactionCallback) {
        *self.core.callback.lock() = Some(callback);
    }

    /// Snapshot of the scan list, for the `monitor` report.
    pub fn monitored(&self) -> Vec<MonitoredWallet> {
        let mut wallets: Vec<_> = self.core.wallets.lock().values().cloned().collect();
        wallets.sort_by(|a, b| a.toss_id.numeric().cmp(&b.toss_id.numeric()));
        wallets
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the polling loop. A second call while running is a no-op.
    pub fn start(&self, interval: Duration) {
        let mut handle_slot = self.handle.lock();
        if handle_slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => core.scan_once().await,
                    changed = stop_rx.changed() => {
                        // A closed channel means the watcher was dropped.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("chain watcher stopped");
        });

        *self.stop_tx.lock() = Some(stop_tx);
        *handle_slot = Some(handle);
    }

    /// Halt polling. Completes well within one polling interval.
    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
