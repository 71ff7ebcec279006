//! End-to-end lifecycle scenarios for the toss engine and the
//! correlation layer, over the in-memory store and mock collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tossbot_chain::{TransactionVerifier, VerifiedTransfer};
use tossbot_engine::{
    CorrelationLayer, CorrelationOutcome, DiscardReason, MetadataBag, NewToss, TossEngine,
    TossEvent, TxSource,
};
use tossbot_store::{MemoryStore, Store};
use tossbot_types::{
    ChainNetwork, ConversationId, EvmAddress, Toss, TossError, TossResult, TossStatus,
    TransferEvent, TxHash, UsdcAmount, UserId, WalletRecord,
};
use tossbot_wallet::MockWalletProvider;

/// Verifier scripted with known-good transfers.
#[derive(Default)]
struct ScriptedVerifier {
    transfers: Mutex<HashMap<TxHash, VerifiedTransfer>>,
}

impl ScriptedVerifier {
    fn script(&self, verified: VerifiedTransfer) {
        self.transfers.lock().insert(verified.hash.clone(), verified);
    }
}

#[async_trait]
impl TransactionVerifier for ScriptedVerifier {
    async fn verify(&self, hash: &TxHash) -> tossbot_types::Result<VerifiedTransfer> {
        self.transfers
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| TossError::UnverifiedTx { tx: hash.to_string() })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    provider: Arc<MockWalletProvider>,
    verifier: Arc<ScriptedVerifier>,
    engine: Arc<TossEngine>,
    correlation: CorrelationLayer,
    events: Arc<Mutex<Vec<String>>>,
    next_hash: Mutex<u64>,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let provider = Arc::new(MockWalletProvider::new());
        let verifier = Arc::new(ScriptedVerifier::default());
        let engine = Arc::new(TossEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&provider) as _,
            ChainNetwork::BaseSepolia,
        ));

        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&events);
        engine.subscribe(Box::new(move |event: &TossEvent| {
            sink.lock().push(event.summary());
        }));

        let correlation = CorrelationLayer::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&verifier) as _,
        );

        Self { store, provider, verifier, engine, correlation, events, next_hash: Mutex::new(0) }
    }

    async fn create_toss(
        &self,
        creator: &str,
        topic: &str,
        options: [&str; 2],
        stake: &str,
        conv: Option<&str>,
    ) -> Toss {
        self.engine
            .create(
                &UserId::new(creator),
                NewToss {
                    topic: topic.to_string(),
                    options: [options[0].to_string(), options[1].to_string()],
                    stake: UsdcAmount::from_decimal_str(stake).unwrap(),
                    conversation_id: conv.map(ConversationId::new),
                },
            )
            .await
            .unwrap()
    }

    /// Register a user's custodial wallet so reverse address lookups
    /// resolve them, and return the paying address.
    async fn register_user_wallet(&self, user: &str) -> EvmAddress {
        let address =
            EvmAddress::parse(&format!("0x{:040x}", 0xab000000u64 + user.len() as u64 * 7919
                + user.bytes().map(u64::from).sum::<u64>())).unwrap();
        self.store
            .put_wallet(&WalletRecord {
                user_id: UserId::new(user),
                address: address.clone(),
                provider_blob: String::new(),
            })
            .await
            .unwrap();
        address
    }

    /// Script an on-chain stake payment and return the watcher event.
    fn stake_payment(&self, from: &EvmAddress, toss: &Toss, micros: u64) -> TransferEvent {
        let mut counter = self.next_hash.lock();
        *counter += 1;
        let hash = TxHash::parse(&format!("0x{:064x}", 0xf000 + *counter)).unwrap();
        let verified = VerifiedTransfer {
            hash: hash.clone(),
            sender: from.clone(),
            recipient: toss.wallet_address.clone(),
            value_micros: micros,
        };
        self.verifier.script(verified);
        TransferEvent {
            tx_hash: hash,
            from: from.clone(),
            to: toss.wallet_address.clone(),
            value_micros: micros,
            block_number: 1_000,
        }
    }

    /// Full join path: correlate the payment, then admit through the engine.
    async fn join_via_payment(&self, user: &str, toss: &Toss, micros: u64) {
        let address = self.register_user_wallet(user).await;
        let event = self.stake_payment(&address, toss, micros);
        let outcome = self
            .correlation
            .resolve(TxSource::Event(event), &MetadataBag::new(), None)
            .await
            .unwrap();
        let CorrelationOutcome::Matched { toss_id, option, sender } = outcome else {
            panic!("expected payment to match, got {outcome:?}");
        };
        assert_eq!(sender, UserId::new(user));
        self.engine.add_participant(&toss_id, &sender, &option, true).await.unwrap();
    }

    /// The stored wallet address for a user.
    async fn address_of(&self, user: &str) -> EvmAddress {
        self.store
            .get_wallet(&UserId::new(user))
            .await
            .unwrap()
            .unwrap()
            .address
    }

    async fn payouts_to(&self, user: &str) -> Vec<UsdcAmount> {
        let address = self.address_of(user).await;
        self.provider
            .transfers()
            .into_iter()
            .filter(|t| t.to == address)
            .map(|t| t.amount)
            .collect()
    }
}

fn assert_parallel_invariants(toss: &Toss) {
    assert_eq!(toss.participants.len(), toss.participant_options.len());
    for (user, pick) in toss.participants.iter().zip(&toss.participant_options) {
        assert_eq!(user, &pick.user_id);
    }
}

// ---------------------------------------------------------------------
// Scenario 1: happy path, two participants, creator wins.
// ---------------------------------------------------------------------

#[tokio::test]
async fn happy_path_creator_wins_whole_pot() {
    let h = Harness::new();
    let toss = h
        .create_toss("A", "Lakers vs Celtics", ["Lakers", "Celtics"], "1.0", Some("C"))
        .await;
    assert_eq!(toss.status, TossStatus::Created);

    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_002).await;

    let closed = h.engine.close(&toss.id, &UserId::new("A"), "Lakers").await.unwrap();
    assert_eq!(closed.status, TossStatus::Completed);
    assert_eq!(closed.result, Some(TossResult::Won("Lakers".to_string())));
    assert!(closed.payment_success);
    assert!(closed.tx_hash.is_some());
    assert!(closed.failed_winners.is_empty());
    assert_parallel_invariants(&closed);

    let payouts = h.payouts_to("A").await;
    assert_eq!(payouts, vec![UsdcAmount::from_micros(2_000_000)]);
    assert!(h.payouts_to("B").await.is_empty());

    assert!(h.events.lock().iter().any(|e| e.contains("settled as COMPLETED")));
}

// ---------------------------------------------------------------------
// Scenario 2: tie on option, equal split.
// ---------------------------------------------------------------------

#[tokio::test]
async fn tie_splits_pot_equally() {
    let h = Harness::new();
    let toss = h
        .create_toss("A", "Lakers vs Celtics", ["Lakers", "Celtics"], "1.0", Some("C"))
        .await;

    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_001).await;

    let closed = h.engine.close(&toss.id, &UserId::new("A"), "Lakers").await.unwrap();
    assert!(closed.payment_success);
    assert_eq!(h.payouts_to("A").await, vec![UsdcAmount::ONE]);
    assert_eq!(h.payouts_to("B").await, vec![UsdcAmount::ONE]);
}

// ---------------------------------------------------------------------
// Scenario 3: the non-creator wins.
// ---------------------------------------------------------------------

#[tokio::test]
async fn non_creator_winner_takes_pot() {
    let h = Harness::new();
    let toss = h
        .create_toss("A", "Lakers vs Celtics", ["Lakers", "Celtics"], "1.0", Some("C"))
        .await;

    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_002).await;

    let closed = h.engine.close(&toss.id, &UserId::new("A"), "Celtics").await.unwrap();
    assert_eq!(closed.status, TossStatus::Completed);
    assert_eq!(closed.result, Some(TossResult::Won("Celtics".to_string())));
    assert_eq!(h.payouts_to("B").await, vec![UsdcAmount::from_micros(2_000_000)]);
    assert!(h.payouts_to("A").await.is_empty());
}

// ---------------------------------------------------------------------
// Scenario 4: force-close refunds every participant.
// ---------------------------------------------------------------------

#[tokio::test]
async fn force_close_refunds_all_stakes() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "0.1", Some("C")).await;

    h.join_via_payment("A", &toss, 100_001).await;
    h.join_via_payment("B", &toss, 100_002).await;

    let closed = h.engine.force_close(&toss.id, &UserId::new("A")).await.unwrap();
    assert_eq!(closed.status, TossStatus::Cancelled);
    assert_eq!(closed.result, Some(TossResult::ForceClosed));
    assert!(closed.payment_success);
    assert!(closed.failed_refunds.is_empty());

    assert_eq!(h.payouts_to("A").await, vec![UsdcAmount::DEFAULT_STAKE]);
    assert_eq!(h.payouts_to("B").await, vec![UsdcAmount::DEFAULT_STAKE]);
}

#[tokio::test]
async fn force_close_with_no_participants_is_a_success() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "0.1", Some("C")).await;

    let closed = h.engine.force_close(&toss.id, &UserId::new("A")).await.unwrap();
    assert_eq!(closed.status, TossStatus::Cancelled);
    assert!(closed.payment_success);
    assert!(h.provider.transfers().is_empty());
}

// ---------------------------------------------------------------------
// Scenario 5: duplicate payment delivery is idempotent.
// ---------------------------------------------------------------------

#[tokio::test]
async fn replayed_transfer_admits_participant_once() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;

    let address = h.register_user_wallet("A").await;
    let event = h.stake_payment(&address, &toss, 1_000_001);

    // First delivery joins.
    let outcome = h
        .correlation
        .resolve(TxSource::Event(event.clone()), &MetadataBag::new(), None)
        .await
        .unwrap();
    let CorrelationOutcome::Matched { toss_id, option, sender } = outcome else {
        panic!("first delivery should match");
    };
    h.engine.add_participant(&toss_id, &sender, &option, true).await.unwrap();

    // The watcher redelivers the same log: correlation discards it.
    let outcome = h
        .correlation
        .resolve(TxSource::Event(event), &MetadataBag::new(), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        CorrelationOutcome::Discarded(DiscardReason::AlreadyParticipant)
    ));

    let toss = h.engine.status(&toss.id).await.unwrap();
    assert_eq!(toss.participants, vec![UserId::new("A")]);
    assert_parallel_invariants(&toss);
}

// ---------------------------------------------------------------------
// Scenario 6: remainder outside the option range resolves nothing.
// ---------------------------------------------------------------------

#[tokio::test]
async fn out_of_range_remainder_is_unresolved() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["a", "b"], "0.1", Some("C")).await;

    let address = h.register_user_wallet("B").await;
    let event = h.stake_payment(&address, &toss, 100_005);

    let err = h
        .correlation
        .resolve(TxSource::Event(event), &MetadataBag::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TossError::UnresolvedOption { .. }));
}

// ---------------------------------------------------------------------
// Scenario 7: one active toss per conversation.
// ---------------------------------------------------------------------

#[tokio::test]
async fn second_toss_in_conversation_is_rejected() {
    let h = Harness::new();
    let first = h.create_toss("A", "rain tomorrow", ["yes", "no"], "0.1", Some("C")).await;

    let err = h
        .engine
        .create(
            &UserId::new("B"),
            NewToss {
                topic: "snow tomorrow".to_string(),
                options: ["yes".to_string(), "no".to_string()],
                stake: UsdcAmount::DEFAULT_STAKE,
                conversation_id: Some(ConversationId::new("C")),
            },
        )
        .await
        .unwrap_err();
    match err {
        TossError::ActiveTossExists { id } => assert_eq!(id, first.id.to_string()),
        other => panic!("expected ActiveTossExists, got {other}"),
    }

    // A different conversation is unaffected.
    h.create_toss("B", "snow tomorrow", ["yes", "no"], "0.1", Some("D")).await;
}

// ---------------------------------------------------------------------
// Metadata takes precedence over the amount tag.
// ---------------------------------------------------------------------

#[tokio::test]
async fn explicit_option_marker_beats_amount_tag() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;

    let address = h.register_user_wallet("B").await;
    // Amount says option 0, metadata says "no": metadata wins.
    let event = h.stake_payment(&address, &toss, 1_000_001);
    let mut metadata = MetadataBag::new();
    metadata.insert("selectedOption", "no");

    let outcome = h
        .correlation
        .resolve(TxSource::Event(event), &metadata, None)
        .await
        .unwrap();
    let CorrelationOutcome::Matched { option, .. } = outcome else {
        panic!("expected match");
    };
    assert_eq!(option, "no");
}

// ---------------------------------------------------------------------
// Precondition and terminality checks.
// ---------------------------------------------------------------------

#[tokio::test]
async fn close_preconditions_are_enforced() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;
    h.join_via_payment("A", &toss, 1_000_001).await;

    // Too few players.
    let err = h.engine.close(&toss.id, &UserId::new("A"), "yes").await.unwrap_err();
    assert!(matches!(err, TossError::NotEnoughPlayers { required: 2, .. }));

    h.join_via_payment("B", &toss, 1_000_002).await;

    // Not the creator.
    let err = h.engine.close(&toss.id, &UserId::new("B"), "yes").await.unwrap_err();
    assert!(matches!(err, TossError::NotCreator { .. }));

    // Option not on the toss.
    let err = h.engine.close(&toss.id, &UserId::new("A"), "maybe").await.unwrap_err();
    assert!(matches!(err, TossError::InvalidOption { .. }));

    // Case-insensitive winning option works.
    let closed = h.engine.close(&toss.id, &UserId::new("A"), "YES").await.unwrap();
    assert_eq!(closed.result, Some(TossResult::Won("yes".to_string())));
}

#[tokio::test]
async fn terminal_tosses_reject_every_mutation() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;
    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_002).await;
    h.engine.close(&toss.id, &UserId::new("A"), "yes").await.unwrap();

    let join = h
        .engine
        .add_participant(&toss.id, &UserId::new("D"), "yes", true)
        .await
        .unwrap_err();
    assert!(matches!(join, TossError::BadState { .. }));

    let close = h.engine.close(&toss.id, &UserId::new("A"), "no").await.unwrap_err();
    assert!(matches!(close, TossError::BadState { .. }));

    let force = h.engine.force_close(&toss.id, &UserId::new("A")).await.unwrap_err();
    assert!(matches!(force, TossError::BadState { .. }));
}

#[tokio::test]
async fn unpaid_and_duplicate_joins_are_rejected() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;

    let err = h
        .engine
        .add_participant(&toss.id, &UserId::new("A"), "yes", false)
        .await
        .unwrap_err();
    assert!(matches!(err, TossError::Unpaid));

    h.engine.add_participant(&toss.id, &UserId::new("A"), "yes", true).await.unwrap();
    let err = h
        .engine
        .add_participant(&toss.id, &UserId::new("A"), "no", true)
        .await
        .unwrap_err();
    assert!(matches!(err, TossError::DuplicateParticipant { .. }));

    let err = h
        .engine
        .add_participant(&toss.id, &UserId::new("B"), "maybe", true)
        .await
        .unwrap_err();
    assert!(matches!(err, TossError::InvalidOption { .. }));
}

// ---------------------------------------------------------------------
// Pot conservation under partial transfer failure.
// ---------------------------------------------------------------------

#[tokio::test]
async fn partial_payout_failure_completes_and_records_losers() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;
    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_001).await;

    // B's payout wallet is broken; A's works.
    h.provider.fail_transfers_to(h.address_of("B").await);

    let closed = h.engine.close(&toss.id, &UserId::new("A"), "yes").await.unwrap();
    assert_eq!(closed.status, TossStatus::Completed);
    assert!(closed.payment_success);
    assert_eq!(closed.failed_winners, vec![UserId::new("B")]);

    // Pot conservation: successful payouts + failed winners' shares = pot.
    let paid: u64 = h.payouts_to("A").await.iter().map(|a| a.micros()).sum();
    let failed_share = 1_000_000u64 * closed.failed_winners.len() as u64;
    assert_eq!(paid + failed_share, closed.pot().micros());
}

#[tokio::test]
async fn provider_outage_leaves_toss_retriable() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;
    h.join_via_payment("A", &toss, 1_000_001).await;
    h.join_via_payment("B", &toss, 1_000_002).await;

    h.provider.set_unavailable();
    let err = h.engine.close(&toss.id, &UserId::new("A"), "yes").await.unwrap_err();
    assert!(matches!(err, TossError::ProviderUnavailable { .. }));

    // Stuck IN_PROGRESS on disk, no payout evidence recorded.
    let stuck = h.engine.status(&toss.id).await.unwrap();
    assert_eq!(stuck.status, TossStatus::InProgress);
    assert!(stuck.tx_hash.is_none());
    assert!(stuck.failed_winners.is_empty());

    // The creator retries once the provider is back.
    h.provider.set_available();
    let closed = h.engine.close(&toss.id, &UserId::new("A"), "yes").await.unwrap();
    assert_eq!(closed.status, TossStatus::Completed);
    assert_eq!(h.payouts_to("A").await, vec![UsdcAmount::from_micros(2_000_000)]);
}

// ---------------------------------------------------------------------
// Refresh reconciliation.
// ---------------------------------------------------------------------

#[tokio::test]
async fn refresh_marks_surplus_payments_as_unknown() {
    let h = Harness::new();
    let toss = h.create_toss("A", "rain tomorrow", ["yes", "no"], "1.0", Some("C")).await;
    h.join_via_payment("A", &toss, 1_000_001).await;

    // Escrow holds three stakes but only one join is recorded.
    h.provider
        .set_balance(&UserId::new(toss.id.as_str()), UsdcAmount::from_micros(3_000_000));

    let outcome = h.engine.refresh(&toss.id).await.unwrap();
    assert_eq!(outcome.unknown_added, 2);
    assert_eq!(outcome.toss.participants.len(), 3);
    assert_parallel_invariants(&outcome.toss);
    assert!(outcome
        .toss
        .participant_options
        .iter()
        .skip(1)
        .all(|p| p.option == tossbot_types::UNKNOWN_OPTION));

    // Unknown slots never win; on force-close they land in failed_refunds.
    h.join_via_payment("B", &toss, 1_000_002).await;
    let closed = h.engine.force_close(&toss.id, &UserId::new("A")).await.unwrap();
    assert_eq!(closed.failed_refunds.len(), 2);
    assert!(closed.failed_refunds.iter().all(|u| u.as_str().starts_with("unknown-")));
}

// ---------------------------------------------------------------------
// Ids and lookups.
// ---------------------------------------------------------------------

#[tokio::test]
async fn ids_are_monotonic_and_lookups_resolve() {
    let h = Harness::new();
    let first = h.create_toss("A", "one", ["yes", "no"], "0.1", Some("C1")).await;
    let second = h.create_toss("B", "two", ["yes", "no"], "0.1", Some("C2")).await;
    assert!(second.id.numeric() > first.id.numeric());

    let by_conv = h
        .engine
        .active_for_conversation(&ConversationId::new("C2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_conv.id, second.id);

    let by_address = h.engine.by_address(&first.wallet_address).await.unwrap().unwrap();
    assert_eq!(by_address.id, first.id);

    assert_eq!(h.engine.list_active().await.unwrap().len(), 2);
}
