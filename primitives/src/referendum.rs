use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{track::TrackId, AccountId, Balance, BlockNumber};

pub type ReferendumIndex = u32;

/// Hash of the proposal a referendum would enact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalHash(pub [u8; 32]);

impl Display for ProposalHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub who: AccountId,
    pub amount: Balance,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub ayes: Balance,
    pub nays: Balance,
    pub support: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecidingStatus {
    pub since: BlockNumber,
    pub confirming: Option<BlockNumber>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enactment {
    At(BlockNumber),
    After(BlockNumber),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingReferendum {
    pub track: TrackId,
    pub origin: String,
    pub proposal: ProposalHash,
    pub enactment: Enactment,
    pub submitted: BlockNumber,
    pub submission_deposit: Deposit,
    pub decision_deposit: Option<Deposit>,
    pub deciding: Option<DecidingStatus>,
    pub tally: Tally,
    pub in_queue: bool,
    pub alarm: Option<BlockNumber>,
}

/// Data kept on chain once a referendum left the ongoing state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcludedReferendum {
    pub since: BlockNumber,
    pub submission_deposit: Option<Deposit>,
    pub decision_deposit: Option<Deposit>,
}

/// A referendum as reported by the chain. Each variant carries its own authoritative fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Referendum {
    Ongoing(OngoingReferendum),
    Approved(ConcludedReferendum),
    Rejected(ConcludedReferendum),
    Cancelled(ConcludedReferendum),
    TimedOut(ConcludedReferendum),
    Killed { since: BlockNumber },
    Unknown,
}

impl Referendum {
    pub fn ongoing(&self) -> Option<&OngoingReferendum> {
        match self {
            Referendum::Ongoing(referendum) => Some(referendum),
            _ => None,
        }
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(self, Referendum::Ongoing(_))
    }
}

/// Off-chain description of a referendum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferendumDetails {
    pub title: String,
    pub content: String,
}
