//! Fixed-point amount handling.
//!
//! Output amounts arrive as 8-decimal fixed-point coin values and are
//! converted to integer satoshis by scaling and truncation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::AmountError;

/// Decimal places carried by every supported chain.
pub const COIN_PRECISION: u32 = 8;

/// Converts a coin amount to satoshis: absolute value, scaled by 10⁸,
/// truncated toward zero.
pub fn to_satoshis(amount: Decimal) -> Result<u64, AmountError> {
    let scale = Decimal::from(10u64.pow(COIN_PRECISION));
    amount
        .abs()
        .checked_mul(scale)
        .and_then(|scaled| scaled.trunc().to_u64())
        .ok_or_else(|| AmountError::OutOfRange(amount.to_string()))
}
