//! Messaging-gateway transport for the dev and production envs.
//!
//! The secure-messaging network itself (key handling, group state, the
//! content-type codecs) lives in a gateway sidecar; this adapter opens
//! a session with the bot's identity material and exchanges messages
//! over plain HTTP: POST to send, long-poll GET to receive.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use tossbot_agent::{
    ChatTransport, ConversationKind, InboundMessage, MessageContent, OutboundContent,
    OutboundMessage, TransactionReference, TransportError, TransportFactory,
};
use tossbot_engine::MetadataBag;
use tossbot_types::{ConversationId, UserId};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Signing material for the bot's messaging identity.
    pub wallet_key: String,
    /// 32-byte hex key for the gateway's encrypted message store.
    pub db_encryption_key: String,
    /// Messaging network set: `dev` or `production`.
    pub env: String,
}

pub struct GatewayFactory {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayFactory {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    wallet_key: &'a str,
    db_encryption_key: &'a str,
    env: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    session: String,
}

#[async_trait]
impl TransportFactory for GatewayFactory {
    async fn connect(&self) -> Result<Arc<dyn ChatTransport>, TransportError> {
        let response = self
            .client
            .post(format!("{}/v1/session", self.config.base_url.trim_end_matches('/')))
            .json(&SessionRequest {
                wallet_key: &self.config.wallet_key,
                db_encryption_key: &self.config.db_encryption_key,
                env: &self.config.env,
            })
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Connection(format!(
                "gateway session refused: {}",
                response.status()
            )));
        }
        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        tracing::info!(env = %self.config.env, "gateway session established");
        Ok(Arc::new(GatewayTransport {
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            session: body.session,
            client: self.client.clone(),
        }))
    }
}

pub struct GatewayTransport {
    base_url: String,
    session: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum OutboundBody<'a> {
    Text { body: &'a str },
    WalletSendCalls { payload: &'a tossbot_agent::WalletSendCalls },
}

#[derive(Deserialize)]
struct PollResponse {
    messages: Vec<GatewayMessage>,
    cursor: String,
}

#[derive(Deserialize)]
struct GatewayMessage {
    conversation_id: String,
    /// `"dm"` or `"group"`.
    kind: String,
    sender: String,
    content: GatewayContent,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum GatewayContent {
    Text {
        body: String,
    },
    TransactionReference {
        network_id: String,
        reference: String,
        /// Flattened string metadata the gateway found in the payload
        /// (top-level, per-call, and `extras` paths).
        #[serde(default)]
        metadata: std::collections::HashMap<String, String>,
    },
}

impl GatewayMessage {
    fn into_inbound(self) -> InboundMessage {
        let kind = if self.kind == "dm" { ConversationKind::Dm } else { ConversationKind::Group };
        let content = match self.content {
            GatewayContent::Text { body } => MessageContent::Text(body),
            GatewayContent::TransactionReference { network_id, reference, metadata } => {
                let mut bag = MetadataBag::new();
                for (key, value) in metadata {
                    bag.insert(key, value);
                }
                MessageContent::TransactionReference(TransactionReference {
                    network_id,
                    reference,
                    metadata: bag,
                })
            }
        };
        InboundMessage {
            conversation_id: ConversationId::new(self.conversation_id),
            conversation_kind: kind,
            sender: UserId::new(self.sender),
            content,
        }
    }
}

#[async_trait]
impl ChatTransport for GatewayTransport {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let body = match &message.content {
            OutboundContent::Text(text) => OutboundBody::Text { body: text },
            OutboundContent::WalletSendCalls(payload) => {
                OutboundBody::WalletSendCalls { payload }
            }
        };
        let response = self
            .client
            .post(format!(
                "{}/v1/conversations/{}/messages",
                self.base_url, message.conversation_id
            ))
            .bearer_auth(&self.session)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Delivery(format!(
                "gateway send refused: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn stream(&self) -> Result<BoxStream<'static, InboundMessage>, TransportError> {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let session = self.session.clone();

        // Long-poll with a cursor; a transport error ends the stream
        // and the worker layer reconnects with backoff.
        struct PollState {
            client: reqwest::Client,
            url: String,
            session: String,
            cursor: String,
            pending: Vec<InboundMessage>,
        }

        let state = PollState {
            client,
            url: format!("{base_url}/v1/messages"),
            session,
            cursor: String::new(),
            pending: Vec::new(),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(message) = state.pending.pop() {
                    return Some((message, state));
                }

                let response = state
                    .client
                    .get(&state.url)
                    .bearer_auth(&state.session)
                    .query(&[("cursor", state.cursor.as_str()), ("wait", "30")])
                    .send()
                    .await;

                let response = match response {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        tracing::warn!(status = %response.status(), "gateway poll refused; closing stream");
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway poll failed; closing stream");
                        return None;
                    }
                };

                match response.json::<PollResponse>().await {
                    Ok(poll) => {
                        state.cursor = poll.cursor;
                        // Pop from the back; reverse to keep arrival order.
                        state.pending = poll
                            .messages
                            .into_iter()
                            .map(GatewayMessage::into_inbound)
                            .rev()
                            .collect();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway poll body malformed; closing stream");
                        return None;
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_mapping() {
        let raw = r#"{
            "conversation_id": "conv-9",
            "kind": "group",
            "sender": "0xfeed",
            "content": {
                "type": "transaction-reference",
                "network_id": "base-sepolia",
                "reference": "0xabc",
                "metadata": {"selectedOption": "yes"}
            }
        }"#;
        let message: GatewayMessage = serde_json::from_str(raw).unwrap();
        let inbound = message.into_inbound();
        assert_eq!(inbound.conversation_kind, ConversationKind::Group);
        let MessageContent::TransactionReference(reference) = inbound.content else {
            panic!("expected transaction reference");
        };
        assert_eq!(reference.reference, "0xabc");
        assert_eq!(reference.metadata.option_marker(), Some("yes"));
    }

    #[test]
    fn test_text_mapping() {
        let raw = r#"{
            "conversation_id": "dm-1",
            "kind": "dm",
            "sender": "0xfeed",
            "content": {"type": "text", "body": "@toss balance"}
        }"#;
        let message: GatewayMessage = serde_json::from_str(raw).unwrap();
        let inbound = message.into_inbound();
        assert_eq!(inbound.conversation_kind, ConversationKind::Dm);
        assert!(matches!(inbound.content, MessageContent::Text(_)));
    }
}
