//! Inbound dispatch: chat events in, engine calls and replies out.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use tossbot_chain::{calldata, ChainWatcher};
use tossbot_engine::{CorrelationLayer, CorrelationOutcome, NewToss, TossEngine, TxSource};
use tossbot_types::{tag, ConversationId, Toss, TossError, TxHash};

use crate::commands::{parse_command, Command};
use crate::messages;
use crate::parser::TossParser;
use crate::transport::{
    ConversationKind, InboundMessage, MessageContent, OutboundMessage, TransactionReference,
    WalletCall, WalletCallMetadata, WalletSendCalls,
};

/// Front-end configuration.
#[derive(Debug, Clone)]
pub struct FrontConfig {
    pub command_prefix: String,
    /// When set, only these command names are dispatched.
    pub allowed_commands: Option<Vec<String>>,
    /// Sent once per DM on first interaction.
    pub welcome_dm: Option<String>,
    /// Sent once per group on first interaction.
    pub welcome_group: Option<String>,
}

impl Default for FrontConfig {
    fn default() -> Self {
        Self {
            command_prefix: "@toss".to_string(),
            allowed_commands: None,
            welcome_dm: None,
            welcome_group: None,
        }
    }
}

/// Stateless marshal between the transport and the engine, apart from
/// the held references and the per-process welcome set.
pub struct AgentFront {
    engine: Arc<TossEngine>,
    correlation: Arc<CorrelationLayer>,
    parser: Arc<dyn TossParser>,
    watcher: Arc<ChainWatcher>,
    config: FrontConfig,
    welcomed: Mutex<HashSet<ConversationId>>,
}

impl AgentFront {
    pub fn new(
        engine: Arc<TossEngine>,
        correlation: Arc<CorrelationLayer>,
        parser: Arc<dyn TossParser>,
        watcher: Arc<ChainWatcher>,
        config: FrontConfig,
    ) -> Self {
        Self {
            engine,
            correlation,
            parser,
            watcher,
            config,
            welcomed: Mutex::new(HashSet::new()),
        }
    }

    /// Process one inbound message and return the replies to send.
    pub async fn handle_message(&self, message: InboundMessage) -> Vec<OutboundMessage> {
        let mut replies = Vec::new();
        self.maybe_welcome(&message, &mut replies);

        match &message.content {
            MessageContent::TransactionReference(reference) => {
                self.handle_transaction_reference(&message, reference, &mut replies).await;
            }
            MessageContent::Text(text) => {
                let Some(command) = parse_command(text, &self.config.command_prefix) else {
                    return replies;
                };
                if !self.is_allowed(&command) {
                    tracing::debug!(command = command.name(), "command not in whitelist; ignoring");
                    return replies;
                }
                self.dispatch(&message, command, &mut replies).await;
            }
        }
        replies
    }

    fn maybe_welcome(&self, message: &InboundMessage, replies: &mut Vec<OutboundMessage>) {
        if !self.welcomed.lock().insert(message.conversation_id.clone()) {
            return;
        }
        let welcome = match message.conversation_kind {
            ConversationKind::Dm => &self.config.welcome_dm,
            ConversationKind::Group => &self.config.welcome_group,
        };
        if let Some(welcome) = welcome {
            replies.push(OutboundMessage::text(message.conversation_id.clone(), welcome.clone()));
        }
    }

    fn is_allowed(&self, command: &Command) -> bool {
        self.config
            .allowed_commands
            .as_ref()
            .map(|allowed| allowed.iter().any(|name| name == command.name()))
            .unwrap_or(true)
    }

    // ------------------------------------------------------------------
    // Transaction references
    // ------------------------------------------------------------------

    async fn handle_transaction_reference(
        &self,
        message: &InboundMessage,
        reference: &TransactionReference,
        replies: &mut Vec<OutboundMessage>,
    ) {
        let conversation_id = message.conversation_id.clone();
        let hash = match TxHash::parse(&reference.reference) {
            Ok(hash) => hash,
            Err(e) => {
                replies.push(OutboundMessage::text(conversation_id, messages::error_reply(&e)));
                return;
            }
        };

        let outcome = self
            .correlation
            .resolve(TxSource::Reference(hash), &reference.metadata, Some(&message.sender))
            .await;

        match outcome {
            Ok(CorrelationOutcome::Matched { toss_id, option, sender }) => {
                match self.engine.add_participant(&toss_id, &sender, &option, true).await {
                    Ok(toss) => replies.push(OutboundMessage::text(
                        conversation_id,
                        messages::joined(&toss, sender.as_str(), &option),
                    )),
                    Err(TossError::DuplicateParticipant { .. }) => {
                        // Raced with the watcher delivering the same payment.
                    }
                    Err(e) => replies.push(OutboundMessage::text(
                        conversation_id,
                        messages::error_reply(&e),
                    )),
                }
            }
            Ok(CorrelationOutcome::Discarded(reason)) => {
                tracing::debug!(?reason, "transaction reference discarded");
            }
            Err(e @ TossError::UnresolvedOption { .. }) => {
                let reply = match self.active_toss(message).await {
                    Some(toss) => messages::unresolved_option(&toss),
                    None => messages::error_reply(&e),
                };
                replies.push(OutboundMessage::text(conversation_id, reply));
            }
            Err(e) => {
                replies.push(OutboundMessage::text(conversation_id, messages::error_reply(&e)));
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn dispatch(
        &self,
        message: &InboundMessage,
        command: Command,
        replies: &mut Vec<OutboundMessage>,
    ) {
        let conversation_id = message.conversation_id.clone();
        let is_dm = message.conversation_kind == ConversationKind::Dm;

        match command {
            Command::Help => {
                replies.push(OutboundMessage::text(
                    conversation_id,
                    messages::help_text(&self.config.command_prefix),
                ));
            }

            Command::Balance => {
                if !is_dm {
                    replies.push(OutboundMessage::text(conversation_id, messages::dm_only()));
                    return;
                }
                match self.engine.user_balance(&message.sender).await {
                    Ok(balance) => replies.push(OutboundMessage::text(
                        conversation_id,
                        format!("Your wallet holds {}.", balance.to_display_string()),
                    )),
                    Err(e) => replies.push(OutboundMessage::text(
                        conversation_id,
                        messages::error_reply(&e),
                    )),
                }
            }

            Command::Monitor => {
                if !is_dm {
                    replies.push(OutboundMessage::text(conversation_id, messages::dm_only()));
                    return;
                }
                replies.push(OutboundMessage::text(
                    conversation_id,
                    messages::monitor_summary(self.watcher.is_running(), &self.watcher.monitored()),
                ));
            }

            Command::Status => {
                if let Some(toss) = self.require_active(message, replies).await {
                    replies.push(OutboundMessage::text(conversation_id, messages::status(&toss)));
                }
            }

            Command::Join => {
                if let Some(toss) = self.require_active(message, replies).await {
                    self.push_payment_intents(&toss, &message.conversation_id, replies);
                }
            }

            Command::Close { winning_option } => {
                let Some(toss) = self.require_active(message, replies).await else {
                    return;
                };
                let result = match &winning_option {
                    Some(option) => self.engine.close(&toss.id, &message.sender, option).await,
                    None => self.engine.force_close(&toss.id, &message.sender).await,
                };
                let reply = match (result, winning_option.is_some()) {
                    (Ok(toss), true) => messages::closed_summary(&toss),
                    (Ok(toss), false) => messages::force_closed_summary(&toss),
                    (Err(e), _) => messages::error_reply(&e),
                };
                replies.push(OutboundMessage::text(conversation_id, reply));
            }

            Command::Refresh => {
                let Some(toss) = self.require_active(message, replies).await else {
                    return;
                };
                let reply = match self.engine.refresh(&toss.id).await {
                    Ok(outcome) => messages::refresh_summary(&outcome),
                    Err(e) => messages::error_reply(&e),
                };
                replies.push(OutboundMessage::text(conversation_id, reply));
            }

            Command::NewToss { prompt } => {
                if is_dm {
                    replies.push(OutboundMessage::text(conversation_id, messages::groups_only()));
                    return;
                }
                self.create_toss(message, &prompt, replies).await;
            }
        }
    }

    async fn create_toss(
        &self,
        message: &InboundMessage,
        prompt: &str,
        replies: &mut Vec<OutboundMessage>,
    ) {
        let conversation_id = message.conversation_id.clone();
        let parsed = match self.parser.parse(prompt).await {
            Ok(parsed) => parsed,
            Err(e) => {
                replies.push(OutboundMessage::text(conversation_id, e.reason));
                return;
            }
        };

        let created = self
            .engine
            .create(
                &message.sender,
                NewToss {
                    topic: parsed.topic,
                    options: parsed.options,
                    stake: parsed.stake,
                    conversation_id: Some(conversation_id.clone()),
                },
            )
            .await;

        match created {
            Ok(toss) => {
                replies.push(OutboundMessage::text(
                    conversation_id.clone(),
                    messages::toss_created(&toss),
                ));
                self.push_payment_intents(&toss, &conversation_id, replies);
            }
            Err(e) => {
                replies.push(OutboundMessage::text(conversation_id, messages::error_reply(&e)));
            }
        }
    }

    /// One wallet-send-calls button per option, amounts remainder-tagged.
    fn push_payment_intents(
        &self,
        toss: &Toss,
        conversation_id: &ConversationId,
        replies: &mut Vec<OutboundMessage>,
    ) {
        let network = self.engine.network();
        for (index, option) in toss.options.iter().enumerate() {
            // Two options always fit the one-digit tag.
            let Some(amount) = tag::encode_option(toss.stake, index) else {
                continue;
            };
            let payload = WalletSendCalls {
                version: "1.0".to_string(),
                from: None,
                chain_id: format!("0x{:x}", network.chain_id()),
                calls: vec![WalletCall {
                    to: network.usdc_address().to_string(),
                    data: calldata::encode_transfer(&toss.wallet_address, amount),
                    metadata: WalletCallMetadata {
                        description: messages::payment_button_description(toss, option),
                        transaction_type: "transfer".to_string(),
                        currency: "USDC".to_string(),
                        amount,
                        to_address: toss.wallet_address.to_string(),
                    },
                }],
            };
            replies.push(OutboundMessage::wallet_calls(conversation_id.clone(), payload));
        }
    }

    // ------------------------------------------------------------------
    // Group / active-toss predicates
    // ------------------------------------------------------------------

    async fn active_toss(&self, message: &InboundMessage) -> Option<Toss> {
        self.engine
            .active_for_conversation(&message.conversation_id)
            .await
            .ok()
            .flatten()
    }

    /// Group-only commands that need a running toss; replies with the
    /// appropriate nudge otherwise.
    async fn require_active(
        &self,
        message: &InboundMessage,
        replies: &mut Vec<OutboundMessage>,
    ) -> Option<Toss> {
        if message.conversation_kind == ConversationKind::Dm {
            replies.push(OutboundMessage::text(
                message.conversation_id.clone(),
                messages::groups_only(),
            ));
            return None;
        }
        match self.active_toss(message).await {
            Some(toss) => Some(toss),
            None => {
                replies.push(OutboundMessage::text(
                    message.conversation_id.clone(),
                    messages::no_active_toss(&self.config.command_prefix),
                ));
                None
            }
        }
    }
}
