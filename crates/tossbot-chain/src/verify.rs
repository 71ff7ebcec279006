//! On-chain transaction verification with exponential backoff.
//!
//! Fail-closed: a payment that cannot be proven on-chain never admits a
//! participant. Verification retries cover the window between a wallet
//! broadcasting a transaction and the RPC node indexing it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tossbot_types::{EvmAddress, Result, TossError, TxHash};

use crate::calldata;
use crate::rpc::ChainReader;

/// A transfer proven on-chain: sender, escrow recipient, exact amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub hash: TxHash,
    pub sender: EvmAddress,
    pub recipient: EvmAddress,
    pub value_micros: u64,
}

/// Verifies that a transaction hash is a confirmed stablecoin transfer.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    async fn verify(&self, hash: &TxHash) -> Result<VerifiedTransfer>;
}

/// Retry schedule for [`RpcVerifier`].
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_retries: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
            max_retries: 5,
        }
    }
}

/// Chain-backed verifier.
pub struct RpcVerifier {
    reader: Arc<dyn ChainReader>,
    /// The stablecoin contract; transfers on any other contract are
    /// rejected so a worthless token cannot impersonate a stake.
    token: EvmAddress,
    config: VerifyConfig,
}

impl RpcVerifier {
    pub fn new(reader: Arc<dyn ChainReader>, token: EvmAddress, config: VerifyConfig) -> Self {
        Self { reader, token, config }
    }

    async fn fetch_confirmed(&self, hash: &TxHash) -> Result<VerifiedTransfer> {
        let receipt = self
            .reader
            .transaction_receipt(hash)
            .await
            .map_err(|e| {
                tracing::debug!(tx = %hash, error = %e, "receipt fetch failed");
                TossError::UnverifiedTx { tx: hash.to_string() }
            })?
            .ok_or_else(|| TossError::UnverifiedTx { tx: hash.to_string() })?;

        if !receipt.succeeded() {
            return Err(TossError::FailedTx { tx: hash.to_string() });
        }

        let tx = self
            .reader
            .transaction_by_hash(hash)
            .await
            .map_err(|_| TossError::UnverifiedTx { tx: hash.to_string() })?
            .ok_or_else(|| TossError::UnverifiedTx { tx: hash.to_string() })?;

        let target = tx
            .to
            .as_deref()
            .and_then(|to| EvmAddress::parse(to).ok())
            .ok_or_else(|| TossError::UnverifiedTx { tx: hash.to_string() })?;
        if target != self.token {
            return Err(TossError::UnverifiedTx { tx: hash.to_string() });
        }

        let (recipient, value_micros) = calldata::decode_transfer(&tx.input)
            .ok_or_else(|| TossError::UnverifiedTx { tx: hash.to_string() })?;
        let sender = EvmAddress::parse(&tx.from)
            .map_err(|_| TossError::UnverifiedTx { tx: hash.to_string() })?;

        Ok(VerifiedTransfer { hash: hash.clone(), sender, recipient, value_micros })
    }
}

#[async_trait]
impl TransactionVerifier for RpcVerifier {
    async fn verify(&self, hash: &TxHash) -> Result<VerifiedTransfer> {
        let mut delay = self.config.initial_delay;
        let mut last_err = TossError::UnverifiedTx { tx: hash.to_string() };

        for attempt in 0..=self.config.max_retries {
            match self.fetch_confirmed(hash).await {
                Ok(verified) => return Ok(verified),
                // A reverted transaction will not un-revert; stop early.
                Err(e @ TossError::FailedTx { .. }) => return Err(e),
                Err(e) => {
                    tracing::debug!(tx = %hash, attempt, error = %e, "verification pending");
                    last_err = e;
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(self.config.backoff_factor);
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::rpc::{RpcReceipt, RpcResult, RpcTransaction};
    use tossbot_types::TransferEvent;

    struct ScriptedChain {
        /// Receipts returned per call, front first; `None` = not indexed yet.
        receipts: Mutex<Vec<Option<RpcReceipt>>>,
        tx: Option<RpcTransaction>,
    }

    #[async_trait]
    impl ChainReader for ScriptedChain {
        async fn block_number(&self) -> RpcResult<u64> {
            Ok(0)
        }

        async fn transfer_logs_to(
            &self,
            _token: &EvmAddress,
            _wallet: &EvmAddress,
            _from_block: u64,
            _to_block: u64,
        ) -> RpcResult<Vec<TransferEvent>> {
            Ok(vec![])
        }

        async fn transaction_by_hash(&self, _hash: &TxHash) -> RpcResult<Option<RpcTransaction>> {
            Ok(self.tx.clone())
        }

        async fn transaction_receipt(&self, _hash: &TxHash) -> RpcResult<Option<RpcReceipt>> {
            let mut receipts = self.receipts.lock();
            if receipts.is_empty() {
                Ok(None)
            } else {
                Ok(receipts.remove(0))
            }
        }
    }

    fn token() -> EvmAddress {
        EvmAddress::parse("0x036cbd53842c5426634e7929541ec2318f3dcf7e").unwrap()
    }

    fn escrow() -> EvmAddress {
        EvmAddress::parse("0x000000000000000000000000000000000e5c0001").unwrap()
    }

    fn hash() -> TxHash {
        TxHash::parse("0x00000000000000000000000000000000000000000000000000000000000000aa")
            .unwrap()
    }

    fn fast_config(max_retries: u32) -> VerifyConfig {
        VerifyConfig {
            initial_delay: Duration::from_millis(1),
            backoff_factor: 1.5,
            max_retries,
        }
    }

    fn transfer_tx(target: &EvmAddress, amount: u64) -> RpcTransaction {
        RpcTransaction {
            from: "0x00000000000000000000000000000000000000a1".to_string(),
            to: Some(token().as_str().to_string()),
            input: calldata::encode_transfer(target, amount),
        }
    }

    #[tokio::test]
    async fn test_verifies_after_pending_retries() {
        let chain = ScriptedChain {
            receipts: Mutex::new(vec![None, None, Some(RpcReceipt { status: "0x1".to_string() })]),
            tx: Some(transfer_tx(&escrow(), 1_000_001)),
        };
        let verifier = RpcVerifier::new(Arc::new(chain), token(), fast_config(5));

        let verified = verifier.verify(&hash()).await.unwrap();
        assert_eq!(verified.recipient, escrow());
        assert_eq!(verified.value_micros, 1_000_001);
    }

    #[tokio::test]
    async fn test_fail_closed_when_never_indexed() {
        let chain = ScriptedChain { receipts: Mutex::new(vec![]), tx: None };
        let verifier = RpcVerifier::new(Arc::new(chain), token(), fast_config(2));

        let err = verifier.verify(&hash()).await.unwrap_err();
        assert!(matches!(err, TossError::UnverifiedTx { .. }));
    }

    #[tokio::test]
    async fn test_reverted_tx_fails_without_retry() {
        let chain = ScriptedChain {
            receipts: Mutex::new(vec![Some(RpcReceipt { status: "0x0".to_string() })]),
            tx: Some(transfer_tx(&escrow(), 1_000_001)),
        };
        let verifier = RpcVerifier::new(Arc::new(chain), token(), fast_config(5));

        let err = verifier.verify(&hash()).await.unwrap_err();
        assert!(matches!(err, TossError::FailedTx { .. }));
    }

    #[tokio::test]
    async fn test_rejects_transfer_on_foreign_token() {
        let other_token = EvmAddress::parse("0x00000000000000000000000000000000000000ff").unwrap();
        let mut tx = transfer_tx(&escrow(), 1_000_001);
        tx.to = Some(other_token.as_str().to_string());
        let chain = ScriptedChain {
            receipts: Mutex::new(vec![Some(RpcReceipt { status: "0x1".to_string() })]),
            tx: Some(tx),
        };
        let verifier = RpcVerifier::new(Arc::new(chain), token(), fast_config(0));

        let err = verifier.verify(&hash()).await.unwrap_err();
        assert!(matches!(err, TossError::UnverifiedTx { .. }));
    }
}
