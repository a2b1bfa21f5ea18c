//! Type conversion and formatting utilities.
//!
//! Raw on-chain balances are U256 integers; the mirror stores them both as an
//! exact decimal string and as a lossy f64 for arithmetic.

use alloy::primitives::utils::{self, UnitsError};
use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

// ============================================
// Hex / Address Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lowercase an address string so map lookups and SQL comparisons agree.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

// ============================================
// U256 Conversions
// ============================================

/// Convert U256 to f64 with decimal adjustment using BigDecimal for precision.
///
/// Returns 0.0 if the value cannot be represented as a finite f64.
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let adjusted = BigDecimal::from(big_int) / big_pow10(decimals);

    match adjusted.to_f64() {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Render a raw integer amount as a fixed-point decimal string.
///
/// Trailing fractional zeros are trimmed: `1500000000000000000` with 18
/// decimals becomes `"1.5"`, zero becomes `"0"`.
pub fn format_units(value: U256, decimals: u8) -> Result<String, UnitsError> {
    let formatted = utils::format_units(value, decimals)?;
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}

// ============================================
// String to f64 Conversions
// ============================================

/// Lenient decimal-string parse used for subgraph numeric fields.
///
/// Unparseable or non-finite input is treated as 0.
pub fn parse_f64(value: &str) -> f64 {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
