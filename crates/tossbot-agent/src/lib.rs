//! Chat front-end for the toss bot.
//!
//! Marshals between the secure-messaging transport and the engine:
//! inbound messages become engine calls, engine results become replies
//! and payment-intent buttons. The transport itself is an external
//! collaborator behind the [`ChatTransport`] trait.

pub mod commands;
pub mod front;
pub mod messages;
pub mod parser;
pub mod stream;
pub mod transport;

pub use commands::Command;
pub use front::{AgentFront, FrontConfig};
pub use parser::{LlmParser, LlmParserConfig, ParseError, ParsedToss, RuleBasedParser, TossParser};
pub use stream::{run_message_worker, StreamWorkerConfig};
pub use transport::{
    ChatTransport, ConversationKind, InboundMessage, MessageContent, OutboundContent,
    OutboundMessage, TransactionReference, TransportError, TransportFactory, WalletCall,
    WalletSendCalls,
};
