//! The toss lifecycle engine and payment correlation layer.
//!
//! This crate is the custody-critical heart of the bot: it owns every
//! state transition a toss can make, serializes mutations per toss id,
//! treats the store write as the commit point, and pairs the watcher's
//! at-least-once delivery with idempotent participant admission.

pub mod correlate;
pub mod engine;
pub mod events;

pub use correlate::{CorrelationLayer, CorrelationOutcome, DiscardReason, MetadataBag, TxSource};
pub use engine::{NewToss, RefreshOutcome, TossEngine};
pub use events::TossEvent;
