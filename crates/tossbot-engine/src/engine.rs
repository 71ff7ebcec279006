//! The per-toss state machine.
//!
//! Every mutation happens under that toss's lock, and the store write
//! is the commit point: nothing is acknowledged to a user before the
//! record is durable. Terminal states are written once and never
//! mutated again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use tossbot_store::Store;
use tossbot_types::{
    ChainNetwork, ConversationId, ParticipantPick, Result, Toss, TossError, TossId, TossResult,
    TossStatus, UsdcAmount, UserId, WalletRecord, UNKNOWN_OPTION,
};
use tossbot_wallet::{TransferReceipt, WalletError, WalletProvider};

use crate::events::TossEvent;

/// Participant ids minted by `refresh` for unattributed payments.
pub const UNKNOWN_PARTICIPANT_PREFIX: &str = "unknown-";

/// Validated input for a new toss, as produced by the parser.
#[derive(Debug, Clone)]
pub struct NewToss {
    pub topic: String,
    pub options: [String; 2],
    pub stake: UsdcAmount,
    pub conversation_id: Option<ConversationId>,
}

/// What `refresh` found when reconciling the escrow balance.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub toss: Toss,
    pub escrow_balance: UsdcAmount,
    pub expected_balance: UsdcAmount,
    /// Participant slots added for payments with no recorded join.
    pub unknown_added: usize,
}

type EventSubscriber = Box<dyn Fn(&TossEvent) + Send + Sync>;

/// Result of one pot distribution pass.
struct Distribution {
    first_receipt: Option<TransferReceipt>,
    failed: Vec<UserId>,
    successes: usize,
    /// Transfers attempted against the provider (excludes unknown slots).
    attempted: usize,
    unavailable_failures: usize,
}

impl Distribution {
    /// True when the provider was down for every attempted transfer:
    /// nothing was submitted, so the close may be retried safely.
    fn provider_down(&self) -> bool {
        self.attempted > 0 && self.unavailable_failures == self.attempted
    }
}

/// The toss lifecycle engine.
pub struct TossEngine {
    store: Arc<dyn Store>,
    provider: Arc<dyn WalletProvider>,
    network: ChainNetwork,
    /// Per-toss mutation locks. The engine never yields while holding
    /// more than one.
    locks: Mutex<HashMap<TossId, Arc<AsyncMutex<()>>>>,
    /// Serializes id allocation and the single-active-per-conversation
    /// check across concurrent creates.
    create_lock: AsyncMutex<()>,
    subscribers: Mutex<Vec<EventSubscriber>>,
}

impl TossEngine {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn WalletProvider>,
        network: ChainNetwork,
    ) -> Self {
        Self {
            store,
            provider,
            network,
            locks: Mutex::new(HashMap::new()),
            create_lock: AsyncMutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to lifecycle events. Subscribers run synchronously on
    /// the engine task and must not block.
    pub fn subscribe(&self, subscriber: EventSubscriber) {
        self.subscribers.lock().push(subscriber);
    }

    fn emit(&self, event: TossEvent) {
        tracing::debug!("{}", event.summary());
        for subscriber in self.subscribers.lock().iter() {
            subscriber(&event);
        }
    }

    fn lock_for(&self, id: &TossId) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    async fn require(&self, id: &TossId) -> Result<Toss> {
        self.store
            .get_toss(id)
            .await?
            .ok_or_else(|| TossError::NotFound { id: id.to_string() })
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Allocate a toss, create its escrow wallet, persist, and announce.
    pub async fn create(&self, creator: &UserId, new_toss: NewToss) -> Result<Toss> {
        if new_toss.stake.is_zero() {
            return Err(TossError::InvalidAmount {
                message: "stake must be greater than zero".to_string(),
            });
        }
        if new_toss.stake > UsdcAmount::MAX_STAKE {
            return Err(TossError::AmountTooLarge {
                amount: new_toss.stake.to_display_string(),
                max: UsdcAmount::MAX_STAKE.to_display_string(),
            });
        }
        if new_toss.options[0].eq_ignore_ascii_case(&new_toss.options[1]) {
            return Err(TossError::InvalidOption { option: new_toss.options[1].clone() });
        }

        let _alloc = self.create_lock.lock().await;

        if let Some(conversation_id) = &new_toss.conversation_id {
            if let Some(active) = self.active_for_conversation(conversation_id).await? {
                return Err(TossError::ActiveTossExists { id: active.id.to_string() });
            }
        }

        let id = self.next_id().await?;
        let escrow_user = UserId::new(id.as_str());
        let escrow = self.provider.create(&escrow_user).await.map_err(TossError::from)?;
        self.store
            .put_wallet(&WalletRecord {
                user_id: escrow_user,
                address: escrow.address.clone(),
                provider_blob: escrow.provider_blob,
            })
            .await?;

        let toss = Toss {
            id,
            creator: creator.clone(),
            conversation_id: new_toss.conversation_id,
            stake: new_toss.stake,
            topic: new_toss.topic,
            options: new_toss.options,
            wallet_address: escrow.address,
            created_at: chrono::Utc::now().timestamp_millis(),
            status: TossStatus::Created,
            participants: Vec::new(),
            participant_options: Vec::new(),
            result: None,
            payment_success: false,
            tx_hash: None,
            tx_link: None,
            failed_winners: Vec::new(),
            failed_refunds: Vec::new(),
        };
        self.store.put_toss(&toss).await?;

        tracing::info!(toss_id = %toss.id, creator = %creator, stake = %toss.stake, "toss created");
        self.emit(TossEvent::Created { toss: toss.clone() });
        Ok(toss)
    }

    async fn next_id(&self) -> Result<TossId> {
        let highest = self
            .store
            .list_tosses()
            .await?
            .into_iter()
            .map(|t| t.id.numeric())
            .max()
            .unwrap_or(0);
        Ok(TossId::new((highest + 1).to_string()))
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    /// Admit a participant whose stake payment has been proven.
    pub async fn add_participant(
        &self,
        toss_id: &TossId,
        user: &UserId,
        option: &str,
        paid: bool,
    ) -> Result<Toss> {
        let lock = self.lock_for(toss_id);
        let _guard = lock.lock().await;

        let mut toss = self.require(toss_id).await?;
        if toss.is_terminal() || toss.status == TossStatus::InProgress {
            return Err(TossError::BadState {
                id: toss_id.to_string(),
                status: toss.status.as_str().to_string(),
            });
        }
        if !paid {
            return Err(TossError::Unpaid);
        }
        if toss.has_participant(user) {
            return Err(TossError::DuplicateParticipant {
                id: toss_id.to_string(),
                user: user.to_string(),
            });
        }
        let option = toss
            .match_option(option)
            .ok_or_else(|| TossError::InvalidOption { option: option.to_string() })?
            .to_string();

        toss.participants.push(user.clone());
        toss.participant_options.push(ParticipantPick { user_id: user.clone(), option: option.clone() });
        toss.status = TossStatus::WaitingForPlayer;
        self.store.put_toss(&toss).await?;

        tracing::info!(toss_id = %toss_id, user = %user, option = %option, "participant joined");
        self.emit(TossEvent::ParticipantJoined {
            toss_id: toss_id.clone(),
            user_id: user.clone(),
            option,
            participant_count: toss.participants.len(),
        });
        Ok(toss)
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    /// Declare the winning option and distribute the pot equally among
    /// winners. Transfer failures are partial-success: the toss still
    /// completes and failed recipients are recorded for manual recovery.
    pub async fn close(&self, toss_id: &TossId, caller: &UserId, winning_option: &str) -> Result<Toss> {
        let lock = self.lock_for(toss_id);
        let _guard = lock.lock().await;

        let mut toss = self.require(toss_id).await?;
        if toss.creator != *caller {
            return Err(TossError::NotCreator { id: toss_id.to_string() });
        }
        match toss.status {
            TossStatus::WaitingForPlayer => {}
            // A close stranded by a provider outage (nothing paid out)
            // may be retried by the creator.
            TossStatus::InProgress if Self::retry_safe(&toss) => {}
            status => {
                return Err(TossError::BadState {
                    id: toss_id.to_string(),
                    status: status.as_str().to_string(),
                })
            }
        }
        if toss.participants.len() < 2 {
            return Err(TossError::NotEnoughPlayers { id: toss_id.to_string(), required: 2 });
        }
        let winning = toss
            .match_option(winning_option)
            .ok_or_else(|| TossError::InvalidOption { option: winning_option.to_string() })?
            .to_string();

        toss.status = TossStatus::InProgress;
        self.store.put_toss(&toss).await?;

        let winners = toss.winners_of(&winning);
        if winners.is_empty() {
            toss.status = TossStatus::Completed;
            toss.result = Some(TossResult::Won(winning));
            toss.payment_success = true;
            self.store.put_toss(&toss).await?;
            tracing::info!(toss_id = %toss_id, "closed with no winners; pot stays in escrow");
            self.emit(TossEvent::Settled { toss: toss.clone() });
            return Ok(toss);
        }

        // Winners is non-empty, so the division cannot fail.
        let prize = toss
            .pot()
            .checked_div(winners.len() as u64)
            .unwrap_or(UsdcAmount::ZERO);
        let distribution = self.distribute(&toss, &winners, prize).await;
        if distribution.provider_down() {
            // Toss stays IN_PROGRESS on disk; nothing was submitted.
            return Err(TossError::ProviderUnavailable {
                message: format!("payout provider unavailable; toss {toss_id} left in progress"),
            });
        }

        self.record_distribution(&mut toss, &distribution, prize);
        toss.failed_winners = distribution.failed;
        toss.status = TossStatus::Completed;
        toss.result = Some(TossResult::Won(winning.clone()));
        self.store.put_toss(&toss).await?;

        tracing::info!(
            toss_id = %toss_id,
            winning = %winning,
            winners = toss.participants.len() - toss.failed_winners.len(),
            failed = toss.failed_winners.len(),
            "toss completed"
        );
        self.emit(TossEvent::Settled { toss: toss.clone() });
        Ok(toss)
    }

    /// Refund every participant their stake and cancel the toss. A toss
    /// with no participants cancels immediately with no transfers.
    pub async fn force_close(&self, toss_id: &TossId, caller: &UserId) -> Result<Toss> {
        let lock = self.lock_for(toss_id);
        let _guard = lock.lock().await;

        let mut toss = self.require(toss_id).await?;
        if toss.creator != *caller {
            return Err(TossError::NotCreator { id: toss_id.to_string() });
        }
        match toss.status {
            TossStatus::Created | TossStatus::WaitingForPlayer => {}
            TossStatus::InProgress if Self::retry_safe(&toss) => {}
            status => {
                return Err(TossError::BadState {
                    id: toss_id.to_string(),
                    status: status.as_str().to_string(),
                })
            }
        }

        if toss.participants.is_empty() {
            toss.status = TossStatus::Cancelled;
            toss.result = Some(TossResult::ForceClosed);
            toss.payment_success = true;
            self.store.put_toss(&toss).await?;
            self.emit(TossEvent::Settled { toss: toss.clone() });
            return Ok(toss);
        }

        toss.status = TossStatus::InProgress;
        self.store.put_toss(&toss).await?;

        let participants = toss.participants.clone();
        let distribution = self.distribute(&toss, &participants, toss.stake).await;
        if distribution.provider_down() {
            return Err(TossError::ProviderUnavailable {
                message: format!("refund provider unavailable; toss {toss_id} left in progress"),
            });
        }

        let stake = toss.stake;
        self.record_distribution(&mut toss, &distribution, stake);
        toss.failed_refunds = distribution.failed;
        toss.status = TossStatus::Cancelled;
        toss.result = Some(TossResult::ForceClosed);
        self.store.put_toss(&toss).await?;

        tracing::info!(
            toss_id = %toss_id,
            refunded = toss.participants.len() - toss.failed_refunds.len(),
            failed = toss.failed_refunds.len(),
            "toss force-closed"
        );
        self.emit(TossEvent::Settled { toss: toss.clone() });
        Ok(toss)
    }

    /// An `IN_PROGRESS` record with no payout evidence can be driven
    /// forward again without risking a double payment.
    fn retry_safe(toss: &Toss) -> bool {
        toss.tx_hash.is_none()
            && !toss.payment_success
            && toss.failed_winners.is_empty()
            && toss.failed_refunds.is_empty()
    }

    fn record_distribution(&self, toss: &mut Toss, distribution: &Distribution, amount: UsdcAmount) {
        toss.payment_success = distribution.successes > 0;
        if let Some(receipt) = &distribution.first_receipt {
            toss.tx_hash = Some(receipt.hash.clone());
            toss.tx_link = Some(receipt.link.clone());
        }
        for user in &distribution.failed {
            self.emit(TossEvent::TransferFailed {
                toss_id: toss.id.clone(),
                user_id: user.clone(),
                amount,
            });
        }
    }

    /// Send `amount` from the toss's escrow wallet to each recipient.
    /// Failures are per-recipient; the pass never aborts early.
    async fn distribute(&self, toss: &Toss, recipients: &[UserId], amount: UsdcAmount) -> Distribution {
        let escrow_user = UserId::new(toss.id.as_str());
        let mut result = Distribution {
            first_receipt: None,
            failed: Vec::new(),
            successes: 0,
            attempted: 0,
            unavailable_failures: 0,
        };

        for user in recipients {
            if user.as_str().starts_with(UNKNOWN_PARTICIPANT_PREFIX) {
                // No identity to pay out to; the creator resolves these.
                tracing::warn!(toss_id = %toss.id, user = %user, "skipping transfer to unknown participant");
                result.failed.push(user.clone());
                continue;
            }

            result.attempted += 1;
            let address = match self.recipient_address(user).await {
                Ok(address) => address,
                Err(WalletError::ProviderUnavailable { message }) => {
                    tracing::warn!(toss_id = %toss.id, user = %user, %message, "wallet lookup unavailable");
                    result.unavailable_failures += 1;
                    result.failed.push(user.clone());
                    continue;
                }
                Err(e) => {
                    tracing::warn!(toss_id = %toss.id, user = %user, error = %e, "wallet lookup failed");
                    result.failed.push(user.clone());
                    continue;
                }
            };

            match self.provider.transfer(&escrow_user, &address, amount).await {
                Ok(receipt) => {
                    tracing::info!(toss_id = %toss.id, user = %user, %amount, tx = %receipt.hash, "transfer sent");
                    result.successes += 1;
                    if result.first_receipt.is_none() {
                        result.first_receipt = Some(receipt);
                    }
                }
                Err(WalletError::ProviderUnavailable { message }) => {
                    tracing::warn!(toss_id = %toss.id, user = %user, %message, "transfer unavailable");
                    result.unavailable_failures += 1;
                    result.failed.push(user.clone());
                }
                Err(e) => {
                    tracing::warn!(toss_id = %toss.id, user = %user, error = %e, "transfer failed");
                    result.failed.push(user.clone());
                }
            }
        }
        result
    }

    /// Address to pay a participant at: their stored wallet, or a fresh
    /// custodial wallet created (and persisted) on demand.
    async fn recipient_address(
        &self,
        user: &UserId,
    ) -> std::result::Result<tossbot_types::EvmAddress, WalletError> {
        if let Ok(Some(record)) = self.store.get_wallet(user).await {
            return Ok(record.address);
        }
        let wallet = self.provider.create(user).await?;
        if let Err(e) = self
            .store
            .put_wallet(&WalletRecord {
                user_id: user.clone(),
                address: wallet.address.clone(),
                provider_blob: wallet.provider_blob,
            })
            .await
        {
            tracing::warn!(user = %user, error = %e, "failed to persist recipient wallet");
        }
        Ok(wallet.address)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Reconcile the escrow balance with the recorded participants.
    ///
    /// Surplus whole stakes become `unknown-n` slots with the UNKNOWN
    /// option marker; each slot is persisted individually so a crash
    /// loses at most the uncommitted tail.
    pub async fn refresh(&self, toss_id: &TossId) -> Result<RefreshOutcome> {
        let lock = self.lock_for(toss_id);
        let _guard = lock.lock().await;

        let mut toss = self.require(toss_id).await?;
        if toss.is_terminal() {
            return Err(TossError::BadState {
                id: toss_id.to_string(),
                status: toss.status.as_str().to_string(),
            });
        }

        let escrow_user = UserId::new(toss.id.as_str());
        let balance = self.provider.balance(&escrow_user).await.map_err(TossError::from)?;
        let expected = toss
            .stake
            .checked_mul(toss.participants.len() as u64)
            .unwrap_or(UsdcAmount::ZERO);

        let mut added = 0usize;
        if balance > expected && !toss.stake.is_zero() {
            let surplus = balance.checked_sub(&expected).unwrap_or(UsdcAmount::ZERO);
            let unaccounted = surplus.micros() / toss.stake.micros();
            let mut next_unknown = toss
                .participants
                .iter()
                .filter(|u| u.as_str().starts_with(UNKNOWN_PARTICIPANT_PREFIX))
                .count();
            for _ in 0..unaccounted {
                next_unknown += 1;
                let user = UserId::new(format!("{UNKNOWN_PARTICIPANT_PREFIX}{next_unknown}"));
                toss.participants.push(user.clone());
                toss.participant_options.push(ParticipantPick {
                    user_id: user.clone(),
                    option: UNKNOWN_OPTION.to_string(),
                });
                toss.status = TossStatus::WaitingForPlayer;
                self.store.put_toss(&toss).await?;
                added += 1;
                tracing::warn!(toss_id = %toss_id, user = %user, "recorded unattributed paid participant");
            }
        }

        Ok(RefreshOutcome {
            toss,
            escrow_balance: balance,
            expected_balance: expected,
            unknown_added: added,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn status(&self, toss_id: &TossId) -> Result<Toss> {
        self.require(toss_id).await
    }

    /// The single non-terminal toss bound to this conversation, if any.
    pub async fn active_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Toss>> {
        Ok(self
            .store
            .list_tosses()
            .await?
            .into_iter()
            .find(|t| !t.is_terminal() && t.conversation_id.as_ref() == Some(conversation_id)))
    }

    /// Toss owning the escrow wallet at `address`, if any.
    pub async fn by_address(&self, address: &tossbot_types::EvmAddress) -> Result<Option<Toss>> {
        let Some(wallet) = self.store.find_wallet_by_address(address).await? else {
            return Ok(None);
        };
        self.store
            .get_toss(&TossId::new(wallet.user_id.as_str()))
            .await
            .map_err(Into::into)
    }

    /// All non-terminal tosses, used to rebuild the watcher at startup.
    pub async fn list_active(&self) -> Result<Vec<Toss>> {
        let mut tosses: Vec<Toss> = self
            .store
            .list_tosses()
            .await?
            .into_iter()
            .filter(|t| !t.is_terminal())
            .collect();
        tosses.sort_by_key(|t| t.id.numeric());
        Ok(tosses)
    }

    /// Balance of an arbitrary user's custodial wallet (DM `balance`).
    pub async fn user_balance(&self, user: &UserId) -> Result<UsdcAmount> {
        self.provider.balance(user).await.map_err(TossError::from)
    }

    pub fn network(&self) -> ChainNetwork {
        self.network
    }
}
