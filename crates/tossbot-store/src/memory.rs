//! In-memory store backend, used by tests and the local dev profile.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use tossbot_types::{Toss, TossId, UserId, WalletRecord};

use crate::{Store, StoreResult};

/// HashMap-backed store with the same contracts as the file backend.
#[derive(Default)]
pub struct MemoryStore {
    tosses: Mutex<HashMap<TossId, Toss>>,
    wallets: Mutex<HashMap<UserId, WalletRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_toss(&self, toss: &Toss) -> StoreResult<()> {
        self.tosses.lock().insert(toss.id.clone(), toss.clone());
        Ok(())
    }

    async fn get_toss(&self, id: &TossId) -> StoreResult<Option<Toss>> {
        Ok(self.tosses.lock().get(id).cloned())
    }

    async fn delete_toss(&self, id: &TossId) -> StoreResult<()> {
        self.tosses.lock().remove(id);
        Ok(())
    }

    async fn list_tosses(&self) -> StoreResult<Vec<Toss>> {
        Ok(self.tosses.lock().values().cloned().collect())
    }

    async fn put_wallet(&self, wallet: &WalletRecord) -> StoreResult<()> {
        self.wallets.lock().insert(wallet.user_id.clone(), wallet.clone());
        Ok(())
    }

    async fn get_wallet(&self, user_id: &UserId) -> StoreResult<Option<WalletRecord>> {
        Ok(self.wallets.lock().get(user_id).cloned())
    }

    async fn delete_wallet(&self, user_id: &UserId) -> StoreResult<()> {
        self.wallets.lock().remove(user_id);
        Ok(())
    }

    async fn list_wallets(&self) -> StoreResult<Vec<WalletRecord>> {
        Ok(self.wallets.lock().values().cloned().collect())
    }
}
