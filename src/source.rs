//! Funding sources a payment can be drawn from.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::address::{parse_address, AddressError};

/// Persisted identifier of the connected account's own balance.
pub const SELF_ID: &str = "SELF";

/// Either the connected account's own token balance or an allowance a
/// sponsor deposited for it in the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FundingSource {
    SelfBalance,
    Sponsor(Address),
}

impl FundingSource {
    pub fn sponsor(&self) -> Option<Address> {
        match self {
            FundingSource::SelfBalance => None,
            FundingSource::Sponsor(addr) => Some(*addr),
        }
    }
}

impl fmt::Display for FundingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingSource::SelfBalance => write!(f, "{}", SELF_ID),
            FundingSource::Sponsor(addr) => write!(f, "{}", addr),
        }
    }
}

impl FromStr for FundingSource {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == SELF_ID {
            return Ok(FundingSource::SelfBalance);
        }
        parse_address(s).map(FundingSource::Sponsor)
    }
}

impl From<FundingSource> for String {
    fn from(source: FundingSource) -> Self {
        source.to_string()
    }
}

impl TryFrom<String> for FundingSource {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
