//! Persisted custodial wallet record.

use serde::{Deserialize, Serialize};

use crate::identity::{EvmAddress, UserId};

/// A custodial wallet known to the bot.
///
/// Escrow wallets use the owning toss's id as `user_id`; the
/// address→wallet→toss chain in the correlation layer relies on that.
/// Wallets for human users (balance queries) share the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: UserId,
    pub address: EvmAddress,
    /// Opaque token the wallet provider uses to rehydrate the wallet.
    pub provider_blob: String,
}
