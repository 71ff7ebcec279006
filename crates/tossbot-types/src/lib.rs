//! Shared types for the tossbot wagering agent.
//!
//! Everything that crosses a crate boundary lives here: identity
//! newtypes, the fixed-point USDC amount, the option-tag amount codec,
//! the toss and wallet records, chain network constants, and the error
//! enum the engine reports to users.

pub mod amount;
pub mod chain;
pub mod error;
pub mod identity;
pub mod tag;
pub mod toss;
pub mod wallet;

pub use amount::UsdcAmount;
pub use chain::{ChainNetwork, TransferEvent};
pub use error::{Result, TossError};
pub use identity::{ConversationId, EvmAddress, TossId, TxHash, UserId};
pub use toss::{ParticipantPick, Toss, TossResult, TossStatus, UNKNOWN_OPTION};
pub use wallet::WalletRecord;
