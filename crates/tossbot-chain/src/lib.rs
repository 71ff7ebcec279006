//! On-chain boundary: JSON-RPC access, ERC-20 transfer calldata, the
//! transaction verifier, and the escrow-wallet watcher.

pub mod calldata;
pub mod rpc;
pub mod verify;
pub mod watcher;

pub use rpc::{ChainReader, EvmRpcClient, RpcError, RpcResult};
pub use verify::{RpcVerifier, TransactionVerifier, VerifiedTransfer, VerifyConfig};
pub use watcher::{ChainWatcher, MonitoredWallet, TransactionCallback};
