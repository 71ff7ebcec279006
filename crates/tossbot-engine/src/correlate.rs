//! Payment-intent correlation.
//!
//! Maps a verified on-chain transfer to the `(toss, option, sender)`
//! it represents. The option ladder is ordered metadata-first (explicit
//! markers are authoritative when present) with the amount-encoded tag
//! as fallback, because the tag survives hostile re-serialization by
//! intermediate wallets.

use std::collections::HashMap;
use std::sync::Arc;

use tossbot_chain::{TransactionVerifier, VerifiedTransfer};
use tossbot_store::Store;
use tossbot_types::tag;
use tossbot_types::{Result, Toss, TossError, TossId, TransferEvent, TxHash, UserId};

/// Flat string-to-string metadata extracted from the transport payload
/// at ingress. Replaces the source's reflective walk over arbitrary
/// nested objects: each ingress point extracts the small, enumerated
/// set of paths it knows about.
#[derive(Debug, Clone, Default)]
pub struct MetadataBag(HashMap<String, String>);

/// Keys that explicitly name the chosen option.
const OPTION_KEYS: [&str; 3] = ["option", "selectedoption", "choice"];

impl MetadataBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// The explicit option marker, if any key case-folds to one of the
    /// known names.
    pub fn option_marker(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| OPTION_KEYS.contains(&key.to_ascii_lowercase().as_str()))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where the payment came in from.
#[derive(Debug, Clone)]
pub enum TxSource {
    /// A transaction-reference chat message carrying only the hash.
    Reference(TxHash),
    /// A Transfer event surfaced by the chain watcher.
    Event(TransferEvent),
}

impl TxSource {
    fn hash(&self) -> &TxHash {
        match self {
            TxSource::Reference(hash) => hash,
            TxSource::Event(event) => &event.tx_hash,
        }
    }
}

/// Why a payment was dropped without an error reply. These are normal:
/// the watcher redelivers, strangers pay unrelated wallets, and late
/// transfers land on settled tosses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Recipient is not one of our escrow wallets.
    UnknownRecipient,
    /// The owning toss no longer accepts participants.
    TossSettled,
    /// The sender is already a recorded participant (at-least-once
    /// redelivery, or a double payment).
    AlreadyParticipant,
}

/// Outcome of a correlation attempt that did not error.
#[derive(Debug, Clone)]
pub enum CorrelationOutcome {
    /// The payment joins `sender` to `toss_id` on `option`.
    Matched {
        toss_id: TossId,
        option: String,
        sender: UserId,
    },
    Discarded(DiscardReason),
}

/// The correlation layer: verification, wallet lookup, option ladder.
pub struct CorrelationLayer {
    store: Arc<dyn Store>,
    verifier: Arc<dyn TransactionVerifier>,
}

impl CorrelationLayer {
    pub fn new(store: Arc<dyn Store>, verifier: Arc<dyn TransactionVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Resolve a payment to a join intent.
    ///
    /// `chat_sender` is the transport identity that delivered a
    /// transaction-reference, when there is one; it takes precedence
    /// over reverse-mapping the on-chain sender address.
    pub async fn resolve(
        &self,
        source: TxSource,
        metadata: &MetadataBag,
        chat_sender: Option<&UserId>,
    ) -> Result<CorrelationOutcome> {
        // Fail-closed verification, even for watcher events: the chain
        // is the authority on success and on the exact payload.
        let verified = self.verifier.verify(source.hash()).await?;

        let Some(wallet) = self.store.find_wallet_by_address(&verified.recipient).await? else {
            tracing::debug!(tx = %verified.hash, recipient = %verified.recipient, "payment to unknown wallet; discarding");
            return Ok(CorrelationOutcome::Discarded(DiscardReason::UnknownRecipient));
        };

        // Escrow wallets are keyed by their toss's id.
        let toss_id = TossId::new(wallet.user_id.as_str());
        let Some(toss) = self.store.get_toss(&toss_id).await? else {
            tracing::debug!(tx = %verified.hash, toss_id = %toss_id, "wallet has no toss; discarding");
            return Ok(CorrelationOutcome::Discarded(DiscardReason::UnknownRecipient));
        };
        if toss.is_terminal() {
            tracing::debug!(tx = %verified.hash, toss_id = %toss_id, "toss settled; discarding");
            return Ok(CorrelationOutcome::Discarded(DiscardReason::TossSettled));
        }

        let option = self.resolve_option(&toss, metadata, &verified)?;
        let sender = self.resolve_sender(&verified, chat_sender).await?;

        if toss.has_participant(&sender) {
            tracing::debug!(tx = %verified.hash, toss_id = %toss_id, sender = %sender, "duplicate payment; discarding");
            return Ok(CorrelationOutcome::Discarded(DiscardReason::AlreadyParticipant));
        }

        tracing::info!(tx = %verified.hash, toss_id = %toss_id, sender = %sender, option = %option, "payment correlated");
        Ok(CorrelationOutcome::Matched { toss_id, option, sender })
    }

    /// The option ladder: explicit metadata first, amount tag second.
    fn resolve_option(
        &self,
        toss: &Toss,
        metadata: &MetadataBag,
        verified: &VerifiedTransfer,
    ) -> Result<String> {
        if let Some(marker) = metadata.option_marker() {
            if let Some(option) = toss.match_option(marker) {
                return Ok(option.to_string());
            }
            tracing::debug!(toss_id = %toss.id, marker = %marker, "option marker not on toss; falling back to amount tag");
        }

        tag::decode_option_for(verified.value_micros, toss.options.len())
            .map(|index| toss.options[index].clone())
            .ok_or_else(|| TossError::UnresolvedOption { tx: verified.hash.to_string() })
    }

    /// The joining identity: the chat sender when present, otherwise
    /// the owner of the paying wallet, otherwise the raw address.
    async fn resolve_sender(
        &self,
        verified: &VerifiedTransfer,
        chat_sender: Option<&UserId>,
    ) -> Result<UserId> {
        if let Some(sender) = chat_sender {
            return Ok(sender.clone());
        }
        if let Some(wallet) = self.store.find_wallet_by_address(&verified.sender).await? {
            return Ok(wallet.user_id);
        }
        Ok(UserId::new(verified.sender.as_str()))
    }
}
