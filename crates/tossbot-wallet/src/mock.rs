//! Scriptable in-memory wallet provider for tests and the local profile.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use tossbot_types::{ChainNetwork, EvmAddress, TxHash, UsdcAmount, UserId};

use crate::{
    check_transfer_cap, ProviderWallet, TransferReceipt, WalletError, WalletProvider, WalletResult,
};

/// One recorded outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub from: UserId,
    pub to: EvmAddress,
    pub amount: UsdcAmount,
}

#[derive(Default)]
struct MockState {
    wallets: HashMap<UserId, ProviderWallet>,
    balances: HashMap<UserId, UsdcAmount>,
    transfers: Vec<RecordedTransfer>,
    failing_recipients: HashSet<EvmAddress>,
    unavailable: bool,
    next_wallet: u64,
    next_tx: u64,
}

/// Deterministic wallet provider: addresses and hashes are derived from
/// counters, transfers are recorded, and failures can be scripted per
/// recipient or globally.
#[derive(Default)]
pub struct MockWalletProvider {
    state: Mutex<MockState>,
}

impl MockWalletProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// All transfers submitted so far, in call order.
    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.state.lock().transfers.clone()
    }

    /// Make every transfer to `address` fail with `ProviderUnavailable`.
    pub fn fail_transfers_to(&self, address: EvmAddress) {
        self.state.lock().failing_recipients.insert(address);
    }

    /// Make every call fail until [`Self::set_available`] is called.
    pub fn set_unavailable(&self) {
        self.state.lock().unavailable = true;
    }

    pub fn set_available(&self) {
        self.state.lock().unavailable = false;
    }

    /// Seed a balance, as if stakes had arrived on-chain.
    pub fn set_balance(&self, user_id: &UserId, amount: UsdcAmount) {
        self.state.lock().balances.insert(user_id.clone(), amount);
    }

    /// The deterministic address assigned to `user_id`, if created.
    pub fn address_of(&self, user_id: &UserId) -> Option<EvmAddress> {
        self.state.lock().wallets.get(user_id).map(|w| w.address.clone())
    }

    fn guard_available(state: &MockState) -> WalletResult<()> {
        if state.unavailable {
            return Err(WalletError::ProviderUnavailable {
                message: "mock provider set unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn create(&self, user_id: &UserId) -> WalletResult<ProviderWallet> {
        let mut state = self.state.lock();
        Self::guard_available(&state)?;
        if let Some(existing) = state.wallets.get(user_id) {
            return Ok(existing.clone());
        }
        state.next_wallet += 1;
        let address = EvmAddress::parse(&format!("0x{:040x}", 0xe5c0000u64 + state.next_wallet))
            .expect("derived address is well-formed");
        let wallet = ProviderWallet {
            user_id: user_id.clone(),
            address,
            provider_blob: format!("mock-blob-{}", state.next_wallet),
        };
        state.wallets.insert(user_id.clone(), wallet.clone());
        Ok(wallet)
    }

    async fn load(&self, user_id: &UserId) -> WalletResult<ProviderWallet> {
        let state = self.state.lock();
        Self::guard_available(&state)?;
        state
            .wallets
            .get(user_id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound { user_id: user_id.to_string() })
    }

    async fn balance(&self, user_id: &UserId) -> WalletResult<UsdcAmount> {
        let state = self.state.lock();
        Self::guard_available(&state)?;
        Ok(state.balances.get(user_id).copied().unwrap_or(UsdcAmount::ZERO))
    }

    async fn transfer(
        &self,
        from_user_id: &UserId,
        to_address: &EvmAddress,
        amount: UsdcAmount,
    ) -> WalletResult<TransferReceipt> {
        check_transfer_cap(amount)?;

        let mut state = self.state.lock();
        Self::guard_available(&state)?;
        if state.failing_recipients.contains(to_address) {
            return Err(WalletError::ProviderUnavailable {
                message: format!("scripted failure for {to_address}"),
            });
        }

        state.next_tx += 1;
        let hash = TxHash::parse(&format!("0x{:064x}", state.next_tx))
            .expect("derived hash is well-formed");
        state.transfers.push(RecordedTransfer {
            from: from_user_id.clone(),
            to: to_address.clone(),
            amount,
        });
        let link = ChainNetwork::BaseSepolia.explorer_tx_link(&hash);
        Ok(TransferReceipt { hash, link })
    }
}
