//! Fixed-point ratios scaled by `RATIO_BASE`
//!
//! Ratios are `u32` values where `RATIO_BASE` stands for 100%. Products are
//! widened to 256 bits so that `Amount * ratio` can never overflow.

use primitive_types::U256;
use thiserror::Error;

use crate::types::Amount;

/// 100% expressed as a ratio
pub const RATIO_BASE: u32 = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatioError {
    #[error("Ratio out of bounds: limit {limit}, actual {actual}")]
    OutOfBounds { limit: u32, actual: u32 },

    #[error("Invalid ratio literal: {0}")]
    InvalidLiteral(String),
}

/// Fails if `actual` exceeds `limit`
pub fn check_ratio(limit: u32, actual: u32) -> Result<(), RatioError> {
    if actual > limit {
        return Err(RatioError::OutOfBounds { limit, actual });
    }
    Ok(())
}

/// `ceil(value * ratio / RATIO_BASE)`
pub fn apply_ratio_ceiled(value: Amount, ratio: u32) -> Amount {
    let product = U256::from(value) * U256::from(ratio);
    let base = U256::from(RATIO_BASE);
    let (quotient, remainder) = product.div_mod(base);
    let ceiled = if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::one()
    };
    // ratio <= RATIO_BASE keeps the result <= value
    ceiled.low_u128()
}

/// `lhs_amount * lhs_ratio > rhs_amount * rhs_ratio`, without overflow
pub fn weighted_gt(lhs_ratio: u32, lhs_amount: Amount, rhs_ratio: u32, rhs_amount: Amount) -> bool {
    U256::from(lhs_ratio) * U256::from(lhs_amount) > U256::from(rhs_ratio) * U256::from(rhs_amount)
}

/// Parse "0.5", "50%" or a raw scaled integer such as "500000".
pub fn parse_ratio(text: &str) -> Result<u32, RatioError> {
    let text = text.trim();
    let invalid = || RatioError::InvalidLiteral(text.to_string());

    if let Some(percent) = text.strip_suffix('%') {
        let value: f64 = percent.trim().parse().map_err(|_| invalid())?;
        return scale(value / 100.0).ok_or_else(invalid);
    }
    if text.contains('.') {
        let value: f64 = text.parse().map_err(|_| invalid())?;
        return scale(value).ok_or_else(invalid);
    }
    text.parse::<u32>().map_err(|_| invalid())
}

fn scale(fraction: f64) -> Option<u32> {
    if !(0.0..=1.0).contains(&fraction) {
        return None;
    }
    Some((fraction * RATIO_BASE as f64).round() as u32)
}

/// Human readable percentage, e.g. `500000 -> "50.00%"`
pub fn format_ratio(ratio: u32) -> String {
    format!("{:.2}%", ratio as f64 * 100.0 / RATIO_BASE as f64)
}
