//! Stdin/stdout transport for the `local` network env.
//!
//! Each stdin line is a group message from a fixed local user; lines
//! starting with `dm:` arrive as direct messages, and `txref <hash>`
//! arrives as a transaction-reference. Replies print to stdout. This
//! exists so the whole pipeline can be driven end-to-end without the
//! messaging network.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::AsyncBufReadExt;

use tossbot_agent::{
    ChatTransport, ConversationKind, InboundMessage, MessageContent, OutboundContent,
    OutboundMessage, TransactionReference, TransportError, TransportFactory,
};
use tossbot_engine::MetadataBag;
use tossbot_types::{ConversationId, UserId};

const LOCAL_USER: &str = "local-user";
const LOCAL_GROUP: &str = "local-group";
const LOCAL_DM: &str = "local-dm";

pub struct LocalTransport;

fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix("dm:") {
        return Some(InboundMessage {
            conversation_id: ConversationId::new(LOCAL_DM),
            conversation_kind: ConversationKind::Dm,
            sender: UserId::new(LOCAL_USER),
            content: MessageContent::Text(rest.trim().to_string()),
        });
    }

    if let Some(rest) = line.strip_prefix("txref ") {
        return Some(InboundMessage {
            conversation_id: ConversationId::new(LOCAL_GROUP),
            conversation_kind: ConversationKind::Group,
            sender: UserId::new(LOCAL_USER),
            content: MessageContent::TransactionReference(TransactionReference {
                network_id: "local".to_string(),
                reference: rest.trim().to_string(),
                metadata: MetadataBag::new(),
            }),
        });
    }

    Some(InboundMessage {
        conversation_id: ConversationId::new(LOCAL_GROUP),
        conversation_kind: ConversationKind::Group,
        sender: UserId::new(LOCAL_USER),
        content: MessageContent::Text(line.to_string()),
    })
}

#[async_trait]
impl ChatTransport for LocalTransport {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        match message.content {
            OutboundContent::Text(body) => {
                println!("[{}] {body}", message.conversation_id);
            }
            OutboundContent::WalletSendCalls(payload) => {
                let json = serde_json::to_string_pretty(&payload)
                    .map_err(|e| TransportError::Delivery(e.to_string()))?;
                println!("[{}] payment intent:\n{json}", message.conversation_id);
            }
        }
        Ok(())
    }

    async fn stream(&self) -> Result<BoxStream<'static, InboundMessage>, TransportError> {
        let lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let stream = futures::stream::unfold(lines, |mut lines| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(message) = parse_line(&line) {
                            return Some((message, lines));
                        }
                    }
                    Ok(None) | Err(_) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

pub struct LocalFactory;

#[async_trait]
impl TransportFactory for LocalFactory {
    async fn connect(&self) -> Result<Arc<dyn ChatTransport>, TransportError> {
        Ok(Arc::new(LocalTransport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_shapes() {
        let group = parse_line("@toss rain tomorrow").unwrap();
        assert_eq!(group.conversation_kind, ConversationKind::Group);
        assert!(matches!(group.content, MessageContent::Text(_)));

        let dm = parse_line("dm: @toss balance").unwrap();
        assert_eq!(dm.conversation_kind, ConversationKind::Dm);
        let MessageContent::Text(body) = dm.content else { panic!() };
        assert_eq!(body, "@toss balance");

        let txref = parse_line("txref 0xabc").unwrap();
        let MessageContent::TransactionReference(reference) = txref.content else { panic!() };
        assert_eq!(reference.reference, "0xabc");

        assert!(parse_line("   ").is_none());
    }
}
