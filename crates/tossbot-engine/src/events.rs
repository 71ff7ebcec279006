//! Lifecycle events emitted by the engine.
//!
//! The engine holds no reference to the transport or the watcher;
//! subscribers (the supervisor, logging) react to these instead, so the
//! ownership graph stays acyclic.

use tossbot_types::{Toss, TossId, UsdcAmount, UserId};

/// A state change the rest of the system may care about.
#[derive(Debug, Clone)]
pub enum TossEvent {
    /// A toss was created and its escrow wallet should be monitored.
    Created { toss: Toss },

    /// A paid participant was admitted.
    ParticipantJoined {
        toss_id: TossId,
        user_id: UserId,
        option: String,
        participant_count: usize,
    },

    /// The toss reached a terminal state; its escrow wallet can stop
    /// being monitored. Covers both declared wins and force-closes.
    Settled { toss: Toss },

    /// An individual payout or refund could not be completed.
    TransferFailed {
        toss_id: TossId,
        user_id: UserId,
        amount: UsdcAmount,
    },
}

impl TossEvent {
    /// Short description for logging.
    pub fn summary(&self) -> String {
        match self {
            TossEvent::Created { toss } => {
                format!("toss {} created ({})", toss.id, toss.topic)
            }
            TossEvent::ParticipantJoined { toss_id, user_id, option, participant_count } => {
                format!("toss {toss_id}: {user_id} joined '{option}' ({participant_count} in)")
            }
            TossEvent::Settled { toss } => {
                format!("toss {} settled as {}", toss.id, toss.status.as_str())
            }
            TossEvent::TransferFailed { toss_id, user_id, amount } => {
                format!("toss {toss_id}: transfer of {amount} to {user_id} failed")
            }
        }
    }
}
