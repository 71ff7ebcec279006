//! Custodial wallet provider capability.
//!
//! The bot never touches private keys: wallets are created, loaded, and
//! spent from through an external custodial service. This crate defines
//! the capability trait the engine depends on, an HTTP adapter for the
//! hosted service, and a scriptable mock for tests.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use tossbot_types::{EvmAddress, TossError, TxHash, UsdcAmount, UserId};

pub use http::{HttpWalletProvider, WalletServiceConfig};
pub use mock::MockWalletProvider;

/// A wallet as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderWallet {
    pub user_id: UserId,
    pub address: EvmAddress,
    /// Opaque rehydration token, persisted alongside the address.
    pub provider_blob: String,
}

/// Outcome of a submitted transfer. The hash is the engine's sole
/// evidence of success; the call does not wait for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub hash: TxHash,
    pub link: String,
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet for user {user_id}")]
    NotFound { user_id: String },

    #[error("Insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: String, required: String },

    #[error("Invalid destination address: {address}")]
    InvalidAddress { address: String },

    #[error("Transfer amount {amount} exceeds the {max} per-call cap")]
    AmountTooLarge { amount: String, max: String },

    #[error("Wallet provider unavailable: {message}")]
    ProviderUnavailable { message: String },
}

impl From<WalletError> for TossError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::NotFound { user_id } => TossError::NotFound { id: user_id },
            WalletError::InvalidAddress { address } => TossError::InvalidAddress { address },
            WalletError::AmountTooLarge { amount, max } => TossError::AmountTooLarge { amount, max },
            WalletError::InsufficientFunds { .. } | WalletError::ProviderUnavailable { .. } => {
                TossError::ProviderUnavailable { message: e.to_string() }
            }
        }
    }
}

pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// The custodial wallet capability.
///
/// `user_id` is an arbitrary key; escrow wallets are keyed by toss id,
/// human wallets by transport user id. Transfers are gasless where the
/// underlying chain sponsors them, best-effort otherwise, and capped at
/// [`UsdcAmount::MAX_STAKE`] per call.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Create (or return the existing) wallet for `user_id`.
    async fn create(&self, user_id: &UserId) -> WalletResult<ProviderWallet>;

    async fn load(&self, user_id: &UserId) -> WalletResult<ProviderWallet>;

    /// Current spendable USDC balance of the wallet.
    async fn balance(&self, user_id: &UserId) -> WalletResult<UsdcAmount>;

    /// Submit a USDC transfer out of `from_user_id`'s wallet.
    async fn transfer(
        &self,
        from_user_id: &UserId,
        to_address: &EvmAddress,
        amount: UsdcAmount,
    ) -> WalletResult<TransferReceipt>;
}

/// Shared per-call cap check used by every provider implementation.
pub(crate) fn check_transfer_cap(amount: UsdcAmount) -> WalletResult<()> {
    if amount > UsdcAmount::MAX_STAKE {
        return Err(WalletError::AmountTooLarge {
            amount: amount.to_display_string(),
            max: UsdcAmount::MAX_STAKE.to_display_string(),
        });
    }
    Ok(())
}
