//! Durable persistence for tosses and wallets.
//!
//! Two collections (`tosses`, `wallets`) plus one secondary index
//! (address → wallet). Reads after successful writes return the written
//! value; writes are atomic at single-record granularity. Cross-record
//! consistency is the engine's job (per-toss locking), not the store's.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use tossbot_types::{EvmAddress, Toss, TossError, TossId, UserId, WalletRecord};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Store-level failures. Absence is not an error: lookups return
/// `Ok(None)` for missing records.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}: {message}")]
    Corrupt { path: String, message: String },
}

impl From<StoreError> for TossError {
    fn from(e: StoreError) -> Self {
        TossError::Store { message: e.to_string() }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence capability over the two record namespaces.
#[async_trait]
pub trait Store: Send + Sync {
    /// Overwrite; durable on return.
    async fn put_toss(&self, toss: &Toss) -> StoreResult<()>;

    async fn get_toss(&self, id: &TossId) -> StoreResult<Option<Toss>>;

    async fn delete_toss(&self, id: &TossId) -> StoreResult<()>;

    async fn list_tosses(&self) -> StoreResult<Vec<Toss>>;

    async fn put_wallet(&self, wallet: &WalletRecord) -> StoreResult<()>;

    async fn get_wallet(&self, user_id: &UserId) -> StoreResult<Option<WalletRecord>>;

    async fn delete_wallet(&self, user_id: &UserId) -> StoreResult<()>;

    async fn list_wallets(&self) -> StoreResult<Vec<WalletRecord>>;

    /// Address lookup, case-insensitive over the hex address.
    async fn find_wallet_by_address(
        &self,
        address: &EvmAddress,
    ) -> StoreResult<Option<WalletRecord>> {
        // Addresses are normalized at parse time, so a linear scan over
        // the (small) wallet set compares normalized forms.
        Ok(self
            .list_wallets()
            .await?
            .into_iter()
            .find(|w| &w.address == address))
    }
}
