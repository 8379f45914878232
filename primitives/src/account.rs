use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token amounts in the chain's smallest unit.
pub type Balance = u128;

pub type BlockNumber = u32;

/// Base58 alphabet used by SS58 encoded addresses.
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// An SS58 encoded account address.
///
/// The checksum is not verified here, the node rejects malformed addresses anyway.
/// We only make sure the string is plausible before it is used as a storage key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccountIdParseError {
    #[error("address is empty")]
    Empty,
    #[error("address has invalid length {0}")]
    InvalidLength(usize),
    #[error("address contains invalid character {0:?}")]
    InvalidCharacter(char),
}

impl AccountId {
    const MIN_LENGTH: usize = 5;
    const MAX_LENGTH: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened representation for log lines, e.g. `5Grw…utQY`.
    pub fn short(&self) -> String {
        if self.0.len() <= 10 {
            return self.0.clone();
        }
        format!("{}…{}", &self.0[..4], &self.0[self.0.len() - 4..])
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AccountIdParseError::Empty);
        }
        if s.len() < Self::MIN_LENGTH || s.len() > Self::MAX_LENGTH {
            return Err(AccountIdParseError::InvalidLength(s.len()));
        }
        if let Some(c) = s.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(AccountIdParseError::InvalidCharacter(c));
        }
        Ok(AccountId(s.to_owned()))
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
