//! ERC-20 `transfer(address,uint256)` calldata encoding and decoding.
//!
//! Layout: 4-byte selector `0xa9059cbb`, then the recipient address
//! left-padded to 32 bytes, then the amount as a 32-byte big-endian
//! unsigned integer.

use tossbot_types::EvmAddress;

/// Method selector for `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Build `0x`-prefixed transfer calldata.
pub fn encode_transfer(to: &EvmAddress, amount_micros: u64) -> String {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&to.to_bytes());
    data.extend_from_slice(&[0u8; 24]);
    data.extend_from_slice(&amount_micros.to_be_bytes());
    format!("0x{}", hex::encode(data))
}

/// Decode transfer calldata into `(recipient, micro-USDC amount)`.
///
/// Returns `None` for anything that is not a plain ERC-20 transfer, or
/// for amounts wider than 64 bits (no USDC transfer this bot handles
/// comes close).
pub fn decode_transfer(input: &str) -> Option<(EvmAddress, u64)> {
    let body = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(body).ok()?;
    if bytes.len() < 4 + 32 + 32 || bytes[..4] != TRANSFER_SELECTOR {
        return None;
    }

    // Address word: 12 padding bytes must be zero.
    if bytes[4..16].iter().any(|&b| b != 0) {
        return None;
    }
    let recipient = EvmAddress::parse(&format!("0x{}", hex::encode(&bytes[16..36]))).ok()?;

    // Amount word: reject values beyond u64.
    if bytes[36..60].iter().any(|&b| b != 0) {
        return None;
    }
    let mut amount_bytes = [0u8; 8];
    amount_bytes.copy_from_slice(&bytes[60..68]);
    Some((recipient, u64::from_be_bytes(amount_bytes)))
}
