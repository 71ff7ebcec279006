//! The toss record and its state machine vocabulary.

use serde::{Deserialize, Serialize};

use crate::amount::UsdcAmount;
use crate::identity::{ConversationId, EvmAddress, TossId, TxHash, UserId};

/// Option marker for participants whose on-chain payment was detected
/// by `refresh` but whose choice could not be recovered. Never matches
/// a winning option; the creator resolves these slots out-of-band.
pub const UNKNOWN_OPTION: &str = "UNKNOWN";

/// Lifecycle states of a toss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TossStatus {
    /// Allocated, escrow wallet live, no participants yet.
    Created,
    /// At least one participant; still open for joins.
    WaitingForPlayer,
    /// Close has begun; new participants are rejected. Survives on disk
    /// across a crash mid-distribution, for operator review.
    InProgress,
    /// Terminal: a winning option was declared and the pot distributed.
    Completed,
    /// Terminal: force-closed (refunds) or failed validation.
    Cancelled,
}

impl TossStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TossStatus::Completed | TossStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TossStatus::Created => "CREATED",
            TossStatus::WaitingForPlayer => "WAITING_FOR_PLAYER",
            TossStatus::InProgress => "IN_PROGRESS",
            TossStatus::Completed => "COMPLETED",
            TossStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Declared outcome of a closed toss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TossResult {
    /// The creator declared this option the winner.
    Won(String),
    /// The toss was force-closed and all stakes refunded.
    ForceClosed,
}

const FORCE_CLOSED_MARKER: &str = "FORCE_CLOSED";

impl From<TossResult> for String {
    fn from(result: TossResult) -> Self {
        match result {
            TossResult::Won(option) => option,
            TossResult::ForceClosed => FORCE_CLOSED_MARKER.to_string(),
        }
    }
}

impl From<String> for TossResult {
    fn from(value: String) -> Self {
        if value == FORCE_CLOSED_MARKER {
            TossResult::ForceClosed
        } else {
            TossResult::Won(value)
        }
    }
}

/// One participant's recorded choice, parallel to `Toss::participants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPick {
    pub user_id: UserId,
    pub option: String,
}

/// A wager round: topic, two options, uniform stake, per-toss escrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toss {
    pub id: TossId,
    pub creator: UserId,
    /// Binds the toss to one chat channel when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub stake: UsdcAmount,
    pub topic: String,
    pub options: [String; 2],
    /// Escrow wallet receiving the stakes. Its provider `user_id` is
    /// this toss's id.
    pub wallet_address: EvmAddress,
    /// Unix-ms creation timestamp.
    pub created_at: i64,
    pub status: TossStatus,
    /// Join order; index here is the participant's displayed P-number.
    pub participants: Vec<UserId>,
    /// Parallel to `participants`, same order.
    pub participant_options: Vec<ParticipantPick>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TossResult>,
    /// True once at least one payout/refund transfer succeeded; also
    /// true for a zero-participant force-close.
    #[serde(default)]
    pub payment_success: bool,
    /// First successful payout/refund transaction, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_winners: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_refunds: Vec<UserId>,
}

impl Toss {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// Case-insensitive option lookup, returning the canonical spelling.
    pub fn match_option(&self, option: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(option))
            .map(String::as_str)
    }

    /// Participants whose recorded pick matches `winning` (case-folded).
    pub fn winners_of(&self, winning: &str) -> Vec<UserId> {
        self.participant_options
            .iter()
            .filter(|p| p.option.eq_ignore_ascii_case(winning))
            .map(|p| p.user_id.clone())
            .collect()
    }

    /// `stake × participants`.
    pub fn pot(&self) -> UsdcAmount {
        self.stake
            .checked_mul(self.participants.len() as u64)
            .unwrap_or(UsdcAmount::ZERO)
    }

    /// Count of recorded picks per option, in option order.
    pub fn tallies(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for pick in &self.participant_options {
            for (i, option) in self.options.iter().enumerate() {
                if pick.option.eq_ignore_ascii_case(option) {
                    counts[i] += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toss() -> Toss {
        Toss {
            id: TossId::new("7"),
            creator: UserId::new("alice"),
            conversation_id: Some(ConversationId::new("conv-1")),
            stake: UsdcAmount::ONE,
            topic: "Lakers vs Celtics".to_string(),
            options: ["Lakers".to_string(), "Celtics".to_string()],
            wallet_address: EvmAddress::parse("0x036cbd53842c5426634e7929541ec2318f3dcf7e")
                .unwrap(),
            created_at: 1_700_000_000_000,
            status: TossStatus::WaitingForPlayer,
            participants: vec![UserId::new("alice"), UserId::new("bob")],
            participant_options: vec![
                ParticipantPick { user_id: UserId::new("alice"), option: "Lakers".to_string() },
                ParticipantPick { user_id: UserId::new("bob"), option: "celtics".to_string() },
            ],
            result: None,
            payment_success: false,
            tx_hash: None,
            tx_link: None,
            failed_winners: vec![],
            failed_refunds: vec![],
        }
    }

    #[test]
    fn test_match_option_is_case_insensitive() {
        let toss = sample_toss();
        assert_eq!(toss.match_option("LAKERS"), Some("Lakers"));
        assert_eq!(toss.match_option("celtics"), Some("Celtics"));
        assert_eq!(toss.match_option("Heat"), None);
    }

    #[test]
    fn test_winners_fold_case() {
        let toss = sample_toss();
        assert_eq!(toss.winners_of("Celtics"), vec![UserId::new("bob")]);
        assert_eq!(toss.winners_of("lakers"), vec![UserId::new("alice")]);
    }

    #[test]
    fn test_pot_and_tallies() {
        let toss = sample_toss();
        assert_eq!(toss.pot().micros(), 2_000_000);
        assert_eq!(toss.tallies(), [1, 1]);
    }

    #[test]
    fn test_result_serializes_as_plain_string() {
        let won = serde_json::to_string(&TossResult::Won("Lakers".to_string())).unwrap();
        assert_eq!(won, "\"Lakers\"");
        let forced = serde_json::to_string(&TossResult::ForceClosed).unwrap();
        assert_eq!(forced, "\"FORCE_CLOSED\"");

        let back: TossResult = serde_json::from_str("\"FORCE_CLOSED\"").unwrap();
        assert_eq!(back, TossResult::ForceClosed);
    }

    #[test]
    fn test_status_terminality() {
        assert!(TossStatus::Completed.is_terminal());
        assert!(TossStatus::Cancelled.is_terminal());
        assert!(!TossStatus::InProgress.is_terminal());
        assert!(!TossStatus::Created.is_terminal());
    }
}
