//! Error types for toss operations.
//!
//! The engine fails closed: when a precondition cannot be proven, the
//! operation is rejected and the state on disk is left untouched.

use thiserror::Error;

/// Errors surfaced by the engine, the correlation layer, and the chain
/// boundary. User-visible variants render directly into chat replies.
#[derive(Error, Debug)]
pub enum TossError {
    #[error("Toss {id} not found")]
    NotFound { id: String },

    #[error("Toss {id} is {status} and cannot be changed")]
    BadState { id: String, status: String },

    #[error("{user} has already joined toss {id}")]
    DuplicateParticipant { id: String, user: String },

    #[error("'{option}' is not one of this toss's options")]
    InvalidOption { option: String },

    #[error("Joining requires a confirmed on-chain stake payment")]
    Unpaid,

    #[error("Only the creator can close toss {id}")]
    NotCreator { id: String },

    #[error("Toss {id} needs at least {required} players before it can be closed")]
    NotEnoughPlayers { id: String, required: usize },

    #[error("Stake {amount} exceeds the {max} maximum")]
    AmountTooLarge { amount: String, max: String },

    #[error("Another toss ({id}) is already running in this chat")]
    ActiveTossExists { id: String },

    #[error("Could not tell which option payment {tx} was for")]
    UnresolvedOption { tx: String },

    #[error("Transaction {tx} could not be verified on-chain")]
    UnverifiedTx { tx: String },

    #[error("Transaction {tx} failed on-chain")]
    FailedTx { tx: String },

    #[error("Wallet provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Transfer to {recipient} failed: {message}")]
    TransferFailed { recipient: String, message: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Invalid transaction hash: {hash}")]
    InvalidTxHash { hash: String },

    #[error("Storage error: {message}")]
    Store { message: String },
}

impl TossError {
    /// Whether this kind should be shown to the chat user verbatim.
    /// Internal kinds are logged instead and answered generically.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            TossError::ProviderUnavailable { .. } | TossError::Store { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TossError>;
