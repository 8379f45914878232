use serde::{Deserialize, Serialize};

use crate::{
    networks::Network,
    referendum::ReferendumIndex,
    track::TrackId,
    vote::{AccountVote, Conviction},
    AccountId, Balance, BlockNumber,
};

/// Governance calls the client knows how to assemble.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Vote {
        index: ReferendumIndex,
        vote: AccountVote,
    },
    RemoveVote {
        track: Option<TrackId>,
        index: ReferendumIndex,
    },
    Delegate {
        track: TrackId,
        to: AccountId,
        conviction: Conviction,
        balance: Balance,
    },
    Undelegate {
        track: TrackId,
    },
    /// All inner calls succeed or the whole batch reverts.
    BatchAll(Vec<Call>),
}

impl Call {
    /// Wraps `calls` into a single `BatchAll`, unless there's just one.
    pub fn batch(mut calls: Vec<Call>) -> Call {
        if calls.len() == 1 {
            return calls.remove(0);
        }
        Call::BatchAll(calls)
    }

    pub fn len(&self) -> usize {
        match self {
            Call::BatchAll(calls) => calls.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transaction ready to be signed by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub network: Network,
    pub call: Call,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    pub signer: AccountId,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// Progress of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Broadcast,
    InBlock(BlockNumber),
    Finalized(BlockNumber),
    Invalid(String),
    Dropped(String),
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(
            self,
            TransactionStatus::Broadcast | TransactionStatus::InBlock(_)
        )
    }
}
