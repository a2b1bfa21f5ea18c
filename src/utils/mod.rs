//! Utility functions for the pool mirror.
//!
//! - [`conversion`] - Type conversions (U256, f64, decimal strings, hex encoding)

mod conversion;

/// The Ethereum zero address (0x0000000000000000000000000000000000000000)
/// Mint/burn counterparty; never stored as a balance holder.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub use conversion::{format_units, hex_encode, normalize_address, parse_f64, u256_to_f64};
