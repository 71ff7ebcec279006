//! Minimal EVM JSON-RPC client.
//!
//! Only the four methods the bot needs: `eth_blockNumber`,
//! `eth_getLogs` (Transfer events to a wallet), `eth_getTransactionByHash`,
//! and `eth_getTransactionReceipt`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tossbot_types::{EvmAddress, TransferEvent, TxHash};

/// keccak256("Transfer(address,address,uint256)"), topic0 of every
/// ERC-20 Transfer log.
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Malformed RPC response: {message}")]
    Malformed { message: String },
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// The chain-read surface the watcher and verifier depend on.
/// Split from the concrete client so tests can script a chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> RpcResult<u64>;

    /// Transfer logs on `token` with `to == wallet`, inclusive range.
    async fn transfer_logs_to(
        &self,
        token: &EvmAddress,
        wallet: &EvmAddress,
        from_block: u64,
        to_block: u64,
    ) -> RpcResult<Vec<TransferEvent>>;

    async fn transaction_by_hash(&self, hash: &TxHash) -> RpcResult<Option<RpcTransaction>>;

    async fn transaction_receipt(&self, hash: &TxHash) -> RpcResult<Option<RpcReceipt>>;
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    /// Calldata.
    pub input: String,
}

/// A receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcReceipt {
    /// `0x1` on success, `0x0` on revert.
    pub status: String,
}

impl RpcReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == "0x1"
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
struct RpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
}

/// HTTP JSON-RPC client for a single endpoint.
pub struct EvmRpcClient {
    url: String,
    client: reqwest::Client,
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> RpcResult<Option<T>> {
        let request = RpcRequest { jsonrpc: "2.0", id: 1, method, params };
        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(RpcError::Server { code: error.code, message: error.message });
        }
        Ok(response.result)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> RpcResult<T> {
        self.call(method, params).await?.ok_or_else(|| RpcError::Malformed {
            message: format!("{method} returned null"),
        })
    }
}

/// Parse an `0x`-prefixed hex quantity.
fn parse_quantity(value: &str) -> RpcResult<u64> {
    let body = value.strip_prefix("0x").ok_or_else(|| RpcError::Malformed {
        message: format!("quantity '{value}' lacks 0x prefix"),
    })?;
    u64::from_str_radix(body, 16).map_err(|_| RpcError::Malformed {
        message: format!("bad hex quantity '{value}'"),
    })
}

/// Extract the address packed into a 32-byte log topic.
fn topic_address(topic: &str) -> RpcResult<EvmAddress> {
    let body = topic.strip_prefix("0x").unwrap_or(topic);
    if body.len() != 64 {
        return Err(RpcError::Malformed { message: format!("bad topic '{topic}'") });
    }
    EvmAddress::parse(&format!("0x{}", &body[24..]))
        .map_err(|_| RpcError::Malformed { message: format!("bad address topic '{topic}'") })
}

/// 32-byte wallet address padded for a topic filter.
fn address_topic(address: &EvmAddress) -> String {
    format!("0x{:0>64}", &address.as_str()[2..])
}

/// Parse a 32-byte big-endian log data word into micro-USDC.
fn parse_value_word(data: &str) -> RpcResult<u64> {
    let body = data.strip_prefix("0x").unwrap_or(data);
    let wide = u128::from_str_radix(body, 16).map_err(|_| RpcError::Malformed {
        message: format!("bad value word '{data}'"),
    })?;
    u64::try_from(wide).map_err(|_| RpcError::Malformed {
        message: format!("value '{data}' exceeds u64"),
    })
}

#[async_trait]
impl ChainReader for EvmRpcClient {
    async fn block_number(&self) -> RpcResult<u64> {
        let hex: String = self.call_required("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&hex)
    }

    async fn transfer_logs_to(
        &self,
        token: &EvmAddress,
        wallet: &EvmAddress,
        from_block: u64,
        to_block: u64,
    ) -> RpcResult<Vec<TransferEvent>> {
        let filter = serde_json::json!([{
            "address": token.as_str(),
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "topics": [TRANSFER_TOPIC, serde_json::Value::Null, address_topic(wallet)],
        }]);
        let logs: Vec<RpcLog> = self.call_required("eth_getLogs", filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            if log.topics.len() != 3 {
                tracing::warn!(tx = %log.transaction_hash, "skipping Transfer log with unexpected topics");
                continue;
            }
            let tx_hash = match TxHash::parse(&log.transaction_hash) {
                Ok(hash) => hash,
                Err(_) => {
                    tracing::warn!(tx = %log.transaction_hash, "skipping log with malformed hash");
                    continue;
                }
            };
            events.push(TransferEvent {
                tx_hash,
                from: topic_address(&log.topics[1])?,
                to: topic_address(&log.topics[2])?,
                value_micros: parse_value_word(&log.data)?,
                block_number: parse_quantity(&log.block_number)?,
            });
        }
        Ok(events)
    }

    async fn transaction_by_hash(&self, hash: &TxHash) -> RpcResult<Option<RpcTransaction>> {
        self.call("eth_getTransactionByHash", serde_json::json!([hash.as_str()])).await
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> RpcResult<Option<RpcReceipt>> {
        self.call("eth_getTransactionReceipt", serde_json::json!([hash.as_str()])).await
    }
}
