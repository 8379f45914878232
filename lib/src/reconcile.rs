//! Merging of locally recorded intent with the authoritative chain state.
//!
//! Everything here is a pure re-merge of its inputs, so it is safe to recompute after
//! any interleaving of block updates and local actions.

use std::collections::BTreeMap;

use ballot_primitives::{
    chain::Votings,
    referendum::{OngoingReferendum, Referendum, ReferendumIndex},
    track::TrackId,
    voting::Delegating,
    AccountId,
};

use crate::state::{ConnectedState, Votes};

pub type AllVotings = BTreeMap<AccountId, Votings>;

/// Keeps the ongoing referenda only.
pub fn filter_ongoing(
    referenda: &BTreeMap<ReferendumIndex, Referendum>,
) -> BTreeMap<ReferendumIndex, OngoingReferendum> {
    referenda
        .iter()
        .filter_map(|(index, referendum)| Some((*index, referendum.ongoing()?.clone())))
        .collect()
}

/// Drops votes on referenda that are no longer ongoing.
pub fn filter_old_votes(
    votes: &Votes,
    ongoing: &BTreeMap<ReferendumIndex, OngoingReferendum>,
) -> Votes {
    votes
        .iter()
        .filter(|(index, _)| ongoing.contains_key(*index))
        .map(|(index, vote)| (*index, vote.clone()))
        .collect()
}

/// Votes `address` cast on chain, restricted to the given referenda.
pub fn extract_user_votes<V>(
    address: &AccountId,
    all_votings: &AllVotings,
    referenda: &BTreeMap<ReferendumIndex, V>,
) -> Votes {
    let Some(votings) = all_votings.get(address) else {
        return Votes::new();
    };

    votings
        .values()
        .filter_map(|voting| voting.casting())
        .flat_map(|casting| casting.votes.iter())
        .filter(|(index, _)| referenda.contains_key(*index))
        .map(|(index, vote)| (*index, vote.clone()))
        .collect()
}

/// Local votes on ongoing referenda, overridden by what `address` voted on chain.
pub fn get_all_votes(
    local: &Votes,
    all_votings: &AllVotings,
    ongoing: &BTreeMap<ReferendumIndex, OngoingReferendum>,
    address: Option<&AccountId>,
) -> Votes {
    let mut votes = filter_old_votes(local, ongoing);
    if let Some(address) = address {
        votes.extend(extract_user_votes(address, all_votings, ongoing));
    }
    votes
}

/// Ongoing referenda without a decision yet. Empty once the user is caught up.
pub fn filter_to_be_voted(
    ongoing: &BTreeMap<ReferendumIndex, OngoingReferendum>,
    votes: &Votes,
) -> BTreeMap<ReferendumIndex, OngoingReferendum> {
    ongoing
        .iter()
        .filter(|(index, _)| !votes.contains_key(*index))
        .map(|(index, referendum)| (*index, referendum.clone()))
        .collect()
}

/// Tracks on which `address` delegates its voting power.
pub fn get_all_delegations(
    address: &AccountId,
    all_votings: &AllVotings,
) -> BTreeMap<TrackId, Delegating> {
    let Some(votings) = all_votings.get(address) else {
        return BTreeMap::new();
    };

    votings
        .iter()
        .filter_map(|(track, voting)| Some((*track, voting.delegating()?.clone())))
        .collect()
}

/// Indexes where a local vote differs from the one found on chain.
pub fn vote_conflicts(local: &Votes, on_chain: &Votes) -> Vec<ReferendumIndex> {
    local
        .iter()
        .filter(|(index, vote)| matches!(on_chain.get(*index), Some(other) if other != *vote))
        .map(|(index, _)| *index)
        .collect()
}

impl ConnectedState {
    pub fn ongoing(&self) -> BTreeMap<ReferendumIndex, OngoingReferendum> {
        filter_ongoing(&self.chain.referenda)
    }

    fn all_votings(&self) -> AllVotings {
        self.account
            .as_ref()
            .map(|account| account.all_votings.clone())
            .unwrap_or_default()
    }

    /// Merged local and on-chain votes of the connected address.
    pub fn all_votes(&self) -> Votes {
        get_all_votes(
            &self.votes,
            &self.all_votings(),
            &self.ongoing(),
            self.connected_address.as_ref(),
        )
    }

    pub fn to_be_voted(&self) -> BTreeMap<ReferendumIndex, OngoingReferendum> {
        filter_to_be_voted(&self.ongoing(), &self.all_votes())
    }

    pub fn delegations(&self) -> BTreeMap<TrackId, Delegating> {
        match &self.connected_address {
            Some(address) => get_all_delegations(address, &self.all_votings()),
            None => BTreeMap::new(),
        }
    }
}
