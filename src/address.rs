//! Account identifiers and their display forms.
//!
//! Accounts are 20-byte EVM addresses written as `0x` + 40 hex digits. The
//! checksum casing is accepted but not enforced; comparisons are always on
//! the decoded bytes, so they are case-insensitive.

use std::collections::HashMap;
use std::str::FromStr;

use alloy_primitives::Address;
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address '{0}' must start with 0x")]
    MissingPrefix(String),

    #[error("address '{0}' must be 40 hex digits after 0x")]
    Malformed(String),
}

/// Parse a `0x`-prefixed account identifier.
pub fn parse_address(raw: &str) -> Result<Address, AddressError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddressError::Empty);
    }

    let body = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| AddressError::MissingPrefix(raw.to_string()))?;

    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::Malformed(raw.to_string()));
    }

    Address::from_str(body).map_err(|_| AddressError::Malformed(raw.to_string()))
}

/// Lower-case `0x` hex form, used wherever a stable key is needed.
pub fn lower_hex(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

/// `0x1234...abcd` form of an address string.
pub fn short_addr(addr: &str) -> String {
    if addr.len() <= 10 || !addr.is_ascii() {
        return addr.to_string();
    }
    format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
}

/// Known merchants and friends, keyed by lower-case address.
static ADDRESS_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("0x1c9cf0e5473914a0e705e8cf0bdd3efbbfe17e48", "Reg Horace"),
        ("0xc6b1ac76f1a697a3be5a56a9a0dd6d7e418bdca6", "Eat & Sleep"),
        ("0xd90891f098ee6762c919b110d4830d186c5f6bf4", "7Star"),
        ("0xbfdc6603dc5938d9d75b580c92b280183d4db020", "Shan Shan"),
    ])
});

pub fn address_label(addr: &Address) -> Option<&'static str> {
    ADDRESS_LABELS.get(lower_hex(addr).as_str()).copied()
}

/// Label if the address is known, short form otherwise.
pub fn format_address(addr: &Address) -> String {
    match address_label(addr) {
        Some(label) => label.to_string(),
        None => short_addr(&addr.to_string()),
    }
}
