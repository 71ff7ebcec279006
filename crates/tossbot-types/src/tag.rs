//! The option-tag amount codec.
//!
//! A joiner's stake transfer carries its chosen option in the low
//! decimal digit of the micro-USDC amount: option index `i` is sent as
//! `stake_micros + (i + 1)`. The tag survives any intermediary that
//! preserves the amount, which is why it is the fallback when message
//! metadata is stripped (see the correlation ladder).
//!
//! Remainders of 0 or ≥ 6 carry no signal. Decoders must additionally
//! validate the recovered index against the toss's option count.

use crate::amount::UsdcAmount;

/// Highest option index the one-digit tag can express (remainders 1..=5).
pub const MAX_TAGGED_OPTIONS: usize = 5;

/// Encode an option choice into a transfer amount, in micro-USDC.
///
/// Returns `None` when `option_index` cannot be expressed in one digit.
pub fn encode_option(stake: UsdcAmount, option_index: usize) -> Option<u64> {
    if option_index >= MAX_TAGGED_OPTIONS {
        return None;
    }
    stake.micros().checked_add(option_index as u64 + 1)
}

/// Decode the option index from a received micro-USDC amount, if any.
pub fn decode_option(micros: u64) -> Option<usize> {
    match micros % 10 {
        r @ 1..=5 => Some(r as usize - 1),
        _ => None,
    }
}

/// Decode and validate against the number of options on the toss.
pub fn decode_option_for(micros: u64, option_count: usize) -> Option<usize> {
    decode_option(micros).filter(|&i| i < option_count)
}
