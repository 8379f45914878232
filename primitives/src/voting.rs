use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    referendum::ReferendumIndex,
    vote::{AccountVote, Conviction},
    AccountId, Balance, BlockNumber,
};

/// Voting power delegated to an account by others.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    pub votes: Balance,
    pub capital: Balance,
}

/// A lock that outlives the votes which caused it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorLock {
    pub unlock_at: BlockNumber,
    pub balance: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Casting {
    pub votes: BTreeMap<ReferendumIndex, AccountVote>,
    pub delegations: Delegations,
    pub prior: PriorLock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegating {
    pub target: AccountId,
    pub balance: Balance,
    pub conviction: Conviction,
    pub delegations: Delegations,
    pub prior: PriorLock,
}

/// On-chain voting posture of an account on one track. Casting and delegating are exclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Voting {
    Casting(Casting),
    Delegating(Delegating),
    Unknown,
}

impl Voting {
    pub fn casting(&self) -> Option<&Casting> {
        match self {
            Voting::Casting(casting) => Some(casting),
            _ => None,
        }
    }

    pub fn delegating(&self) -> Option<&Delegating> {
        match self {
            Voting::Delegating(delegating) => Some(delegating),
            _ => None,
        }
    }
}
