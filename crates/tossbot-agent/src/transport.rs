//! The transport boundary: message shapes and the `ChatTransport` trait.
//!
//! The secure-messaging network, its codecs, and its key handling live
//! outside this workspace. What crosses the boundary is defined here:
//! inbound text and transaction-reference messages, outbound text and
//! wallet-send-calls payment intents.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tossbot_engine::MetadataBag;
use tossbot_types::{ConversationId, UserId};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport connection error: {0}")]
    Connection(String),

    #[error("Message delivery failed: {0}")]
    Delivery(String),
}

/// Whether a conversation is a direct message or a group channel.
/// Command-surface rules differ between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Dm,
    Group,
}

/// A transaction-reference message: a chain + tx hash, nothing else.
#[derive(Debug, Clone)]
pub struct TransactionReference {
    pub network_id: String,
    /// 0x-prefixed transaction hash.
    pub reference: String,
    /// Option markers found anywhere in the payload, extracted at
    /// ingress from the enumerated set of known paths.
    pub metadata: MetadataBag,
}

/// Message bodies the bot consumes.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    TransactionReference(TransactionReference),
}

/// One inbound chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub conversation_kind: ConversationKind,
    pub sender: UserId,
    pub content: MessageContent,
}

/// One ERC-20 call inside a wallet-send-calls payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCall {
    /// The stablecoin contract.
    pub to: String,
    /// ERC-20 `transfer(address,uint256)` calldata targeting the
    /// escrow wallet, amount remainder-tagged with the option index.
    pub data: String,
    pub metadata: WalletCallMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCallMetadata {
    pub description: String,
    #[serde(rename = "transactionType")]
    pub transaction_type: String,
    pub currency: String,
    /// Micro-USDC amount, matching the calldata.
    pub amount: u64,
    #[serde(rename = "toAddress")]
    pub to_address: String,
}

/// A payment-intent message that renders as an action button in the
/// recipient's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSendCalls {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub calls: Vec<WalletCall>,
}

/// Message bodies the bot emits.
#[derive(Debug, Clone)]
pub enum OutboundContent {
    Text(String),
    WalletSendCalls(WalletSendCalls),
}

/// One outbound chat message, addressed to a conversation.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,
    pub content: OutboundContent,
}

impl OutboundMessage {
    pub fn text(conversation_id: ConversationId, body: impl Into<String>) -> Self {
        Self { conversation_id, content: OutboundContent::Text(body.into()) }
    }

    pub fn wallet_calls(conversation_id: ConversationId, payload: WalletSendCalls) -> Self {
        Self { conversation_id, content: OutboundContent::WalletSendCalls(payload) }
    }
}

/// A live connection to the messaging network.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver one outbound message on its conversation.
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// The inbound message stream. Ends (or errors) when the
    /// connection drops; the stream worker reconnects.
    async fn stream(&self) -> Result<BoxStream<'static, InboundMessage>, TransportError>;
}

/// Builds transport connections; the stream worker asks for a fresh
/// client after repeated consecutive failures.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self) -> Result<std::sync::Arc<dyn ChatTransport>, TransportError>;
}
