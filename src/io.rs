use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{ParseError, Result};
use crate::translation;

/// Parse an address or page number: `0x`/`0X` prefix is hex, anything else decimal.
pub fn parse_address(text: &str) -> std::result::Result<u64, ParseError> {
    let token = text.trim();
    if token.is_empty() {
        return Err(ParseError::Empty);
    }

    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => token.parse::<u64>(),
    };
    parsed.map_err(|_| ParseError::InvalidAddress(token.to_string()))
}

/// Whitespace- or comma-separated addresses, in order
pub fn parse_addresses(content: &str) -> std::result::Result<Vec<u64>, ParseError> {
    content
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(parse_address)
        .collect()
}

pub fn read_addresses<P: AsRef<Path>>(path: P) -> Result<Vec<u64>> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(parse_addresses(&content)?)
}

/// Boundary conversion from virtual address to page number
pub fn to_vpns(addresses: &[u64]) -> Vec<u64> {
    addresses.iter().map(|&va| translation::vpn(va)).collect()
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
