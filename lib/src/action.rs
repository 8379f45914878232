use std::{collections::BTreeMap, sync::Arc};

use ballot_primitives::{
    chain::{AccountChainState, ChainState},
    delegate::Delegate,
    networks::Network,
    referendum::{ReferendumDetails, ReferendumIndex},
    vote::AccountVote,
    AccountId, BlockNumber,
};
use strum_macros::IntoStaticStr;

use crate::state::{Connectivity, Indexes, Processing, Report, Votes};

/// Every state change goes through one of these.
#[derive(Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum Action {
    SetConnectedAddress(Option<AccountId>),
    SetRestored {
        network: Network,
        votes: Votes,
        custom_delegates: Vec<Delegate>,
    },
    UpdateConnectivity(Connectivity),
    AddReport(Report),
    RemoveReport(usize),
    SetProcessing(Option<Processing>),
    UpdateChainDetails {
        block: BlockNumber,
        chain: Arc<ChainState>,
    },
    /// Ignored unless `address` is still the connected address.
    UpdateChainAccountDetails {
        address: AccountId,
        details: Arc<AccountChainState>,
    },
    StoreReferendumDetails(BTreeMap<ReferendumIndex, ReferendumDetails>),
    CastVote {
        index: ReferendumIndex,
        vote: AccountVote,
    },
    RemoveVote(ReferendumIndex),
    ClearVotes,
    SetIndexes(Indexes),
    SetDelegates(Vec<Delegate>),
    AddCustomDelegate(Delegate),
    RemoveCustomDelegate(AccountId),
}

impl Action {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}
