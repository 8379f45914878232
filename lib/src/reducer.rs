use std::{collections::BTreeMap, sync::Arc};

use crate::{
    action::Action,
    state::{AppState, ConnectedState, Report, RestoredState, Votes},
};

fn add_report(state: &mut AppState, report: Report) {
    let base = state.base_mut();
    let mut reports = Vec::with_capacity(base.reports.len() + 1);
    reports.push(report);
    reports.extend(base.reports.iter().cloned());
    base.reports = Arc::new(reports);
}

fn illegal(state: &mut AppState, action: &str) {
    let message = format!("{} is not possible in the {} phase", action, state.phase());
    add_report(state, Report::error(message));
}

/// Computes the state following `state` after `action`.
///
/// Never fails: an action the current phase doesn't allow leaves the state as is and
/// adds an error report instead. The input is never modified, and substructures the
/// action doesn't touch are shared with it.
pub fn reduce(state: &AppState, action: Action) -> AppState {
    let name = action.name();
    let mut next = state.clone();

    match action {
        Action::SetConnectedAddress(address) => {
            if let AppState::Connected(connected) = &mut next {
                connected.account = None;
            }
            next.base_mut().connected_address = address;
        }
        Action::SetRestored {
            network,
            votes,
            custom_delegates,
        } => {
            next = AppState::Restored(RestoredState {
                base: next.base().clone(),
                network,
                votes: Arc::new(votes),
                custom_delegates: Arc::new(custom_delegates),
            });
        }
        Action::UpdateConnectivity(connectivity) => {
            next.base_mut().connectivity = connectivity;
        }
        Action::AddReport(report) => add_report(&mut next, report),
        Action::RemoveReport(index) => {
            let base = next.base_mut();
            if index < base.reports.len() {
                let mut reports = Vec::clone(&base.reports);
                reports.remove(index);
                base.reports = Arc::new(reports);
            }
        }
        Action::SetProcessing(processing) => {
            if let AppState::Connected(connected) = &mut next {
                connected.processing = processing;
            } else {
                illegal(&mut next, name);
            }
        }
        Action::UpdateChainDetails { block, chain } => {
            next = match next {
                AppState::Restored(restored) => AppState::Connected(ConnectedState {
                    restored,
                    block,
                    chain,
                    account: None,
                    details: Arc::new(BTreeMap::new()),
                    processing: None,
                }),
                AppState::Connected(mut connected) => {
                    connected.block = block;
                    connected.chain = chain;
                    AppState::Connected(connected)
                }
                mut initial @ AppState::Initial(_) => {
                    illegal(&mut initial, name);
                    initial
                }
            };
        }
        Action::UpdateChainAccountDetails { address, details } => {
            if let AppState::Connected(connected) = &mut next {
                if connected.connected_address.as_ref() == Some(&address) {
                    connected.account = Some(details);
                }
            } else {
                illegal(&mut next, name);
            }
        }
        Action::StoreReferendumDetails(new_details) => {
            if let AppState::Connected(connected) = &mut next {
                let mut details = BTreeMap::clone(&connected.details);
                details.extend(new_details);
                connected.details = Arc::new(details);
            } else {
                illegal(&mut next, name);
            }
        }
        Action::CastVote { index, vote } => {
            if let Some(restored) = next.restored_mut() {
                let mut votes = Votes::clone(&restored.votes);
                votes.insert(index, vote);
                restored.votes = Arc::new(votes);
            } else {
                illegal(&mut next, name);
            }
        }
        Action::RemoveVote(index) => {
            if let Some(restored) = next.restored_mut() {
                if restored.votes.contains_key(&index) {
                    let mut votes = Votes::clone(&restored.votes);
                    votes.remove(&index);
                    restored.votes = Arc::new(votes);
                }
            } else {
                illegal(&mut next, name);
            }
        }
        Action::ClearVotes => {
            if let Some(restored) = next.restored_mut() {
                restored.votes = Arc::new(Votes::new());
            } else {
                illegal(&mut next, name);
            }
        }
        Action::SetIndexes(indexes) => next.base_mut().indexes = indexes,
        Action::SetDelegates(delegates) => next.base_mut().delegates = Arc::new(delegates),
        Action::AddCustomDelegate(delegate) => {
            if let Some(restored) = next.restored_mut() {
                let mut delegates = Vec::clone(&restored.custom_delegates);
                match delegates.iter_mut().find(|d| d.address == delegate.address) {
                    Some(existing) => *existing = delegate,
                    None => delegates.push(delegate),
                }
                restored.custom_delegates = Arc::new(delegates);
            } else {
                illegal(&mut next, name);
            }
        }
        Action::RemoveCustomDelegate(address) => {
            if let Some(restored) = next.restored_mut() {
                let mut delegates = Vec::clone(&restored.custom_delegates);
                delegates.retain(|d| d.address != address);
                restored.custom_delegates = Arc::new(delegates);
            } else {
                illegal(&mut next, name);
            }
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use ballot_primitives::{
        chain::{AccountChainState, ChainState},
        delegate::Delegate,
        networks::Network,
        referendum::ReferendumDetails,
        vote::{AccountVote, Conviction},
        AccountId,
    };

    use super::*;
    use crate::state::{Connectivity, Phase, Processing, ReportKind};

    fn alice() -> AccountId {
        "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
            .parse()
            .unwrap()
    }

    fn bob() -> AccountId {
        "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty"
            .parse()
            .unwrap()
    }

    fn restored() -> AppState {
        reduce(
            &AppState::default(),
            Action::SetRestored {
                network: Network::Polkadot,
                votes: Votes::new(),
                custom_delegates: vec![],
            },
        )
    }

    fn connected() -> AppState {
        reduce(
            &restored(),
            Action::UpdateChainDetails {
                block: 1,
                chain: Arc::new(ChainState::default()),
            },
        )
    }

    fn aye() -> AccountVote {
        AccountVote::aye(Conviction::Locked1x, 10)
    }

    #[test]
    fn restore_then_first_block_connects() {
        let state = restored();
        assert_eq!(state.phase(), Phase::Restored);
        assert_eq!(state.network(), Some(Network::Polkadot));
        assert!(state.restored().unwrap().votes.is_empty());

        let chain = Arc::new(ChainState::default());
        let state = reduce(
            &state,
            Action::UpdateChainDetails {
                block: 7,
                chain: Arc::clone(&chain),
            },
        );
        let connected = state.connected().unwrap();
        assert!(Arc::ptr_eq(&connected.chain, &chain));
        assert_eq!(connected.block, 7);
        assert_eq!(connected.network, Network::Polkadot);
    }

    #[test]
    fn chain_details_replace_snapshot_when_connected() {
        let state = reduce(
            &connected(),
            Action::SetProcessing(Some(Processing::new("Submitting"))),
        );
        let chain = Arc::new(ChainState::default());
        let next = reduce(
            &state,
            Action::UpdateChainDetails {
                block: 2,
                chain: Arc::clone(&chain),
            },
        );
        let connected = next.connected().unwrap();
        assert_eq!(connected.block, 2);
        assert!(Arc::ptr_eq(&connected.chain, &chain));
        assert_eq!(connected.processing, Some(Processing::new("Submitting")));
    }

    #[test]
    fn casting_vote_in_initial_phase_reports() {
        let state = AppState::default();
        let next = reduce(&state, Action::CastVote { index: 1, vote: aye() });

        assert_eq!(state.reports().len(), 0);
        assert_eq!(next.reports().len(), 1);
        assert_eq!(next.reports()[0].kind, ReportKind::Error);
        assert!(next.reports()[0].message.contains("CastVote"));
        assert_eq!(next.phase(), Phase::Initial);
        assert!(next.restored().is_none());
    }

    #[test]
    fn chain_details_in_initial_phase_report() {
        let next = reduce(
            &AppState::default(),
            Action::UpdateChainDetails {
                block: 1,
                chain: Arc::default(),
            },
        );
        assert_eq!(next.phase(), Phase::Initial);
        assert_eq!(next.reports().len(), 1);
    }

    #[test]
    fn connected_only_actions_report_before_connecting() {
        let state = restored();
        for action in [
            Action::SetProcessing(None),
            Action::StoreReferendumDetails(BTreeMap::new()),
            Action::UpdateChainAccountDetails {
                address: alice(),
                details: Arc::default(),
            },
        ] {
            let next = reduce(&state, action);
            assert_eq!(next.phase(), Phase::Restored);
            assert_eq!(next.reports().len(), 1);
        }
    }

    #[test]
    fn cast_vote_is_copy_on_write() {
        let state = reduce(&restored(), Action::CastVote { index: 1, vote: aye() });
        let next = reduce(
            &state,
            Action::CastVote {
                index: 2,
                vote: AccountVote::nay(Conviction::None, 5),
            },
        );

        let before = state.restored().unwrap();
        let after = next.restored().unwrap();
        assert_eq!(before.votes.len(), 1);
        assert_eq!(after.votes.len(), 2);
        assert_eq!(after.votes[&1], aye());
        assert!(!Arc::ptr_eq(&before.votes, &after.votes));
        assert!(Arc::ptr_eq(&before.reports, &after.reports));
        assert!(Arc::ptr_eq(&before.custom_delegates, &after.custom_delegates));
    }

    #[test]
    fn reducer_is_deterministic_and_leaves_input_alone() {
        let state = reduce(&connected(), Action::CastVote { index: 3, vote: aye() });
        let snapshot = state.clone();
        let action = Action::AddReport(Report::warning("careful"));

        let first = reduce(&state, action.clone());
        let second = reduce(&state, action);

        assert_eq!(first, second);
        assert_eq!(state, snapshot);
        let (first, state) = (first.connected().unwrap(), state.connected().unwrap());
        assert!(Arc::ptr_eq(&first.chain, &state.chain));
        assert!(Arc::ptr_eq(&first.votes, &state.votes));
        assert!(!Arc::ptr_eq(&first.reports, &state.reports));
    }

    #[test]
    fn reports_are_prepended_and_removed_by_index() {
        let state = reduce(&AppState::default(), Action::AddReport(Report::warning("first")));
        let state = reduce(&state, Action::AddReport(Report::error("second")));
        assert_eq!(state.reports()[0].message, "second");
        assert_eq!(state.reports()[1].message, "first");

        // Duplicates are kept.
        let state = reduce(&state, Action::AddReport(Report::error("second")));
        assert_eq!(state.reports().len(), 3);

        let removed = reduce(&state, Action::RemoveReport(1));
        assert_eq!(removed.reports().len(), 2);
        assert_eq!(removed.reports()[1].message, "first");
        assert_eq!(state.reports().len(), 3);

        let unchanged = reduce(&state, Action::RemoveReport(10));
        assert_eq!(unchanged, state);
    }

    #[test]
    fn changing_address_drops_account_details() {
        let state = reduce(&connected(), Action::SetConnectedAddress(Some(alice())));
        let state = reduce(
            &state,
            Action::UpdateChainAccountDetails {
                address: alice(),
                details: Arc::new(AccountChainState {
                    balance: 100,
                    all_votings: BTreeMap::new(),
                }),
            },
        );
        assert_eq!(state.connected().unwrap().account.as_ref().unwrap().balance, 100);

        let next = reduce(&state, Action::SetConnectedAddress(Some(bob())));
        let connected = next.connected().unwrap();
        assert!(connected.account.is_none());
        assert_eq!(connected.connected_address, Some(bob()));
        assert!(Arc::ptr_eq(&connected.chain, &state.connected().unwrap().chain));
    }

    #[test]
    fn account_details_of_previous_address_are_ignored() {
        let state = reduce(&connected(), Action::SetConnectedAddress(Some(bob())));
        let next = reduce(
            &state,
            Action::UpdateChainAccountDetails {
                address: alice(),
                details: Arc::default(),
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn restoring_another_network_leaves_connected_phase() {
        let state = reduce(&connected(), Action::CastVote { index: 1, vote: aye() });
        let state = reduce(&state, Action::SetConnectedAddress(Some(alice())));
        let next = reduce(
            &state,
            Action::SetRestored {
                network: Network::Kusama,
                votes: Votes::new(),
                custom_delegates: vec![],
            },
        );
        assert_eq!(next.phase(), Phase::Restored);
        assert_eq!(next.network(), Some(Network::Kusama));
        assert!(next.restored().unwrap().votes.is_empty());
        assert_eq!(next.connected_address(), Some(&alice()));
    }

    #[test]
    fn votes_can_be_removed_and_cleared() {
        let state = reduce(&restored(), Action::CastVote { index: 1, vote: aye() });
        let state = reduce(&state, Action::CastVote { index: 2, vote: aye() });

        let removed = reduce(&state, Action::RemoveVote(1));
        assert_eq!(removed.restored().unwrap().votes.keys().collect::<Vec<_>>(), vec![&2]);

        let cleared = reduce(&state, Action::ClearVotes);
        assert!(cleared.restored().unwrap().votes.is_empty());

        let cleared = reduce(&AppState::default(), Action::ClearVotes);
        assert_eq!(cleared.reports().len(), 1);
    }

    #[test]
    fn custom_delegates_are_unique_by_address() {
        let state = reduce(&restored(), Action::AddCustomDelegate(Delegate::new(alice())));
        let renamed = Delegate {
            name: Some("Alice".to_owned()),
            ..Delegate::new(alice())
        };
        let state = reduce(&state, Action::AddCustomDelegate(renamed.clone()));
        let state = reduce(&state, Action::AddCustomDelegate(Delegate::new(bob())));

        let delegates = &state.restored().unwrap().custom_delegates;
        assert_eq!(delegates.len(), 2);
        assert_eq!(delegates[0], renamed);

        let state = reduce(&state, Action::RemoveCustomDelegate(alice()));
        assert_eq!(state.restored().unwrap().custom_delegates.len(), 1);
    }

    #[test]
    fn phase_independent_actions() {
        let state = reduce(
            &AppState::default(),
            Action::UpdateConnectivity(Connectivity::Offline),
        );
        assert_eq!(state.connectivity(), &Connectivity::Offline);

        let state = reduce(
            &state,
            Action::SetIndexes(BTreeMap::from([("referendum".to_owned(), 3)])),
        );
        assert_eq!(state.base().indexes["referendum"], 3);

        let state = reduce(&state, Action::SetDelegates(vec![Delegate::new(alice())]));
        assert_eq!(state.base().delegates.len(), 1);
        assert_eq!(state.reports().len(), 0);
    }

    #[test]
    fn referendum_details_accumulate() {
        let details = |title: &str| ReferendumDetails {
            title: title.to_owned(),
            content: String::new(),
        };
        let state = reduce(
            &connected(),
            Action::StoreReferendumDetails(BTreeMap::from([(1, details("one"))])),
        );
        let state = reduce(
            &state,
            Action::StoreReferendumDetails(BTreeMap::from([(2, details("two"))])),
        );
        let connected = state.connected().unwrap();
        assert_eq!(connected.details.len(), 2);
        assert_eq!(connected.details[&1].title, "one");
    }
}
