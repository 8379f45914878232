use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    referendum::{Referendum, ReferendumIndex},
    track::{Track, TrackId},
    voting::Voting,
    AccountId, Balance,
};

/// Rank of a member of the fellowship collective.
pub type Rank = u16;

/// Per-track votings of one account.
pub type Votings = BTreeMap<TrackId, Voting>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProperties {
    pub ss58_format: u16,
    pub token_decimals: u8,
    pub token_symbol: String,
}

impl Default for ChainProperties {
    fn default() -> Self {
        Self {
            ss58_format: 42,
            token_decimals: 12,
            token_symbol: "UNIT".to_owned(),
        }
    }
}

/// Everything fetched from the chain at a given block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub tracks: BTreeMap<TrackId, Track>,
    pub referenda: BTreeMap<ReferendumIndex, Referendum>,
    pub fellows: BTreeMap<AccountId, Rank>,
    pub properties: ChainProperties,
}

/// Chain state relevant to the connected account.
///
/// `all_votings` is keyed by address because the connected account's delegation
/// targets are fetched along with it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountChainState {
    pub balance: Balance,
    pub all_votings: BTreeMap<AccountId, Votings>,
}
