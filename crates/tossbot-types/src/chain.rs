//! Chain network constants and watcher event types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identity::{EvmAddress, TxHash};

/// The EVM layer-2 networks the bot can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainNetwork {
    BaseSepolia,
    BaseMainnet,
}

impl ChainNetwork {
    pub fn chain_id(&self) -> u64 {
        match self {
            ChainNetwork::BaseSepolia => 84532,
            ChainNetwork::BaseMainnet => 8453,
        }
    }

    /// Canonical name, also the suffix on persisted store files.
    pub fn name(&self) -> &'static str {
        match self {
            ChainNetwork::BaseSepolia => "base-sepolia",
            ChainNetwork::BaseMainnet => "base-mainnet",
        }
    }

    /// The six-decimal USDC contract on this network.
    pub fn usdc_address(&self) -> EvmAddress {
        let hex = match self {
            ChainNetwork::BaseSepolia => "0x036cbd53842c5426634e7929541ec2318f3dcf7e",
            ChainNetwork::BaseMainnet => "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
        };
        EvmAddress::parse(hex).expect("well-known USDC address")
    }

    /// Block explorer URL for a transaction.
    pub fn explorer_tx_link(&self, hash: &TxHash) -> String {
        match self {
            ChainNetwork::BaseSepolia => format!("https://sepolia.basescan.org/tx/{hash}"),
            ChainNetwork::BaseMainnet => format!("https://basescan.org/tx/{hash}"),
        }
    }

    /// Default public JSON-RPC endpoint; deployments override this.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            ChainNetwork::BaseSepolia => "https://sepolia.base.org",
            ChainNetwork::BaseMainnet => "https://mainnet.base.org",
        }
    }
}

impl FromStr for ChainNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base-sepolia" => Ok(ChainNetwork::BaseSepolia),
            "base-mainnet" => Ok(ChainNetwork::BaseMainnet),
            other => Err(format!("unknown chain '{other}' (expected base-sepolia or base-mainnet)")),
        }
    }
}

impl fmt::Display for ChainNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A stablecoin `Transfer` log targeting a monitored escrow wallet,
/// as delivered by the chain watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub tx_hash: TxHash,
    pub from: EvmAddress,
    pub to: EvmAddress,
    /// Transferred amount in micro-USDC.
    pub value_micros: u64,
    pub block_number: u64,
}
