//! Wallet address type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex characters after 0x, got {0}")]
    InvalidLength(usize),
    #[error("address contains a non-hex character: {0:?}")]
    InvalidCharacter(char),
}

/// EVM wallet (signer) address, stored lower-cased.
///
/// Only the strict `0x` + 40 hex character form is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Number of hex characters after the `0x` prefix.
    pub const HEX_LEN: usize = 40;

    /// Parse and normalize an address.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let hex = input
            .strip_prefix("0x")
            .ok_or(AddressError::MissingPrefix)?;

        if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidCharacter(c));
        }
        if hex.len() != Self::HEX_LEN {
            return Err(AddressError::InvalidLength(hex.len()));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Elided form for display: first 6 and last 4 characters.
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
