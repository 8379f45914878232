use serde::{Deserialize, Serialize};

use crate::AccountId;

/// An account users can delegate their voting power to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub address: AccountId,
    pub name: Option<String>,
    pub manifesto: Option<String>,
}

impl Delegate {
    pub fn new(address: AccountId) -> Self {
        Self {
            address,
            name: None,
            manifesto: None,
        }
    }
}
