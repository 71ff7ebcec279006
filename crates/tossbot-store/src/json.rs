//! JSON-file store backend.
//!
//! One file per record: `.data/tosses/<id>-<network>.json` and
//! `.data/wallets/<user_id>-<network>.json`. Writes go to a temp file
//! in the same directory and are renamed into place, so a record is
//! either the old version or the new one, never a torn write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

use tossbot_types::{ChainNetwork, Toss, TossId, UserId, WalletRecord};

use crate::{Store, StoreError, StoreResult};

const TOSSES_DIR: &str = "tosses";
const WALLETS_DIR: &str = "wallets";

/// File-per-record JSON store rooted at a data directory.
pub struct JsonFileStore {
    root: PathBuf,
    network: ChainNetwork,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>, network: ChainNetwork) -> Self {
        Self { root: root.into(), network }
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root
            .join(collection)
            .join(format!("{id}-{}.json", self.network.name()))
    }

    fn io_err(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io { path: path.display().to_string(), source }
    }

    async fn write_record<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> StoreResult<()> {
        let dir = self.root.join(collection);
        fs::create_dir_all(&dir).await.map_err(|e| Self::io_err(&dir, e))?;

        let path = self.record_path(collection, id);
        let tmp = dir.join(format!(".{id}-{}.json.tmp", self.network.name()));
        let body = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        fs::write(&tmp, &body).await.map_err(|e| Self::io_err(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| Self::io_err(&path, e))?;
        Ok(())
    }

    async fn read_record<T: DeserializeOwned>(&self, collection: &str, id: &str) -> StoreResult<Option<T>> {
        let path = self.record_path(collection, id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(&path, e)),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn delete_record(&self, collection: &str, id: &str) -> StoreResult<()> {
        let path = self.record_path(collection, id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(&path, e)),
        }
    }

    async fn list_records<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        let dir = self.root.join(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(&dir, e)),
        };

        let suffix = format!("-{}.json", self.network.name());
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::io_err(&dir, e))? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(&suffix) {
                continue;
            }
            let path = entry.path();
            let body = fs::read(&path).await.map_err(|e| Self::io_err(&path, e))?;
            match serde_json::from_slice(&body) {
                Ok(value) => out.push(value),
                Err(e) => {
                    // A corrupt record must not hide the healthy rest.
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt record");
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn put_toss(&self, toss: &Toss) -> StoreResult<()> {
        self.write_record(TOSSES_DIR, toss.id.as_str(), toss).await
    }

    async fn get_toss(&self, id: &TossId) -> StoreResult<Option<Toss>> {
        self.read_record(TOSSES_DIR, id.as_str()).await
    }

    async fn delete_toss(&self, id: &TossId) -> StoreResult<()> {
        self.delete_record(TOSSES_DIR, id.as_str()).await
    }

    async fn list_tosses(&self) -> StoreResult<Vec<Toss>> {
        self.list_records(TOSSES_DIR).await
    }

    async fn put_wallet(&self, wallet: &WalletRecord) -> StoreResult<()> {
        self.write_record(WALLETS_DIR, wallet.user_id.as_str(), wallet).await
    }

    async fn get_wallet(&self, user_id: &UserId) -> StoreResult<Option<WalletRecord>> {
        self.read_record(WALLETS_DIR, user_id.as_str()).await
    }

    async fn delete_wallet(&self, user_id: &UserId) -> StoreResult<()> {
        self.delete_record(WALLETS_DIR, user_id.as_str()).await
    }

    async fn list_wallets(&self) -> StoreResult<Vec<WalletRecord>> {
        self.list_records(WALLETS_DIR).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tossbot_types::{EvmAddress, TossStatus, UsdcAmount};

    fn sample_toss(id: &str) -> Toss {
        Toss {
            id: TossId::new(id),
            creator: UserId::new("alice"),
            conversation_id: None,
            stake: UsdcAmount::DEFAULT_STAKE,
            topic: "rain tomorrow".to_string(),
            options: ["yes".to_string(), "no".to_string()],
            wallet_address: EvmAddress::parse("0x036cbd53842c5426634e7929541ec2318f3dcf7e")
                .unwrap(),
            created_at: 1_700_000_000_000,
            status: TossStatus::Created,
            participants: vec![],
            participant_options: vec![],
            result: None,
            payment_success: false,
            tx_hash: None,
            tx_link: None,
            failed_winners: vec![],
            failed_refunds: vec![],
        }
    }

    #[tokio::test]
    async fn test_toss_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);

        let toss = sample_toss("1");
        store.put_toss(&toss).await.unwrap();

        let loaded = store.get_toss(&TossId::new("1")).await.unwrap().unwrap();
        assert_eq!(loaded.topic, "rain tomorrow");
        assert_eq!(loaded.status, TossStatus::Created);

        assert!(store.get_toss(&TossId::new("2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_read_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);

        let mut toss = sample_toss("1");
        store.put_toss(&toss).await.unwrap();
        toss.status = TossStatus::WaitingForPlayer;
        store.put_toss(&toss).await.unwrap();

        let loaded = store.get_toss(&toss.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TossStatus::WaitingForPlayer);
    }

    #[tokio::test]
    async fn test_list_filters_by_network() {
        let dir = tempfile::tempdir().unwrap();
        let sepolia = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);
        let mainnet = JsonFileStore::new(dir.path(), ChainNetwork::BaseMainnet);

        sepolia.put_toss(&sample_toss("1")).await.unwrap();
        mainnet.put_toss(&sample_toss("2")).await.unwrap();

        let sepolia_tosses = sepolia.list_tosses().await.unwrap();
        assert_eq!(sepolia_tosses.len(), 1);
        assert_eq!(sepolia_tosses[0].id.as_str(), "1");
        assert_eq!(mainnet.list_tosses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_address_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);

        let wallet = WalletRecord {
            user_id: UserId::new("7"),
            address: EvmAddress::parse("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap(),
            provider_blob: "blob".to_string(),
        };
        store.put_wallet(&wallet).await.unwrap();

        let needle = EvmAddress::parse("0x833589FCD6EDB6E08F4C7C32D4F71B54BDA02913").unwrap();
        let found = store.find_wallet_by_address(&needle).await.unwrap().unwrap();
        assert_eq!(found.user_id.as_str(), "7");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);

        store.put_toss(&sample_toss("1")).await.unwrap();
        store.delete_toss(&TossId::new("1")).await.unwrap();
        store.delete_toss(&TossId::new("1")).await.unwrap();
        assert!(store.get_toss(&TossId::new("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_does_not_poison_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), ChainNetwork::BaseSepolia);

        store.put_toss(&sample_toss("1")).await.unwrap();
        let bad = dir.path().join("tosses").join("2-base-sepolia.json");
        tokio::fs::write(&bad, b"{not json").await.unwrap();

        let tosses = store.list_tosses().await.unwrap();
        assert_eq!(tosses.len(), 1);
    }
}
