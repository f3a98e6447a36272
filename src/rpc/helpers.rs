//! Utility helpers for working with block payloads returned by Substrate RPC
//! calls (hex height decoding plus header extraction).

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// Decodes a hex-encoded block number such as `"0x1a2b"` into an integer.
///
/// The `0x` prefix is optional and surrounding whitespace is ignored.
pub fn parse_hex_number(hex: &str) -> Result<u64> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(anyhow!("empty block number"));
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex block number '{hex}'"))
}

/// Reads `block.header.number` out of a `chain_getBlock` result.
pub fn header_number(block: &Value) -> Result<u64> {
    let raw = block
        .pointer("/block/header/number")
        .ok_or_else(|| anyhow!("block payload has no block.header.number field"))?;
    let hex = raw
        .as_str()
        .ok_or_else(|| anyhow!("block.header.number is not a string: {raw}"))?;
    parse_hex_number(hex)
}
