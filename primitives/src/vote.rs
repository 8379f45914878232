use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::Balance;

/// Vote weight multiplier traded for a longer lock.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize,
)]
pub enum Conviction {
    #[default]
    None,
    Locked1x,
    Locked2x,
    Locked3x,
    Locked4x,
    Locked5x,
    Locked6x,
}

impl Conviction {
    /// Multiplier in tenths, `None` counts a tenth of the balance.
    pub fn votes_tenths(self) -> u8 {
        match self {
            Conviction::None => 1,
            Conviction::Locked1x => 10,
            Conviction::Locked2x => 20,
            Conviction::Locked3x => 30,
            Conviction::Locked4x => 40,
            Conviction::Locked5x => 50,
            Conviction::Locked6x => 60,
        }
    }

    /// Number of enactment periods the balance stays locked.
    pub fn lock_periods(self) -> u32 {
        match self {
            Conviction::None => 0,
            Conviction::Locked1x => 1,
            Conviction::Locked2x => 2,
            Conviction::Locked3x => 4,
            Conviction::Locked4x => 8,
            Conviction::Locked5x => 16,
            Conviction::Locked6x => 32,
        }
    }

    pub fn votes(self, balance: Balance) -> Balance {
        balance.saturating_mul(Balance::from(self.votes_tenths())) / 10
    }
}

/// A decision on one referendum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountVote {
    Standard {
        aye: bool,
        conviction: Conviction,
        balance: Balance,
    },
    Split {
        aye: Balance,
        nay: Balance,
    },
    SplitAbstain {
        aye: Balance,
        nay: Balance,
        abstain: Balance,
    },
}

impl AccountVote {
    pub fn aye(conviction: Conviction, balance: Balance) -> Self {
        AccountVote::Standard {
            aye: true,
            conviction,
            balance,
        }
    }

    pub fn nay(conviction: Conviction, balance: Balance) -> Self {
        AccountVote::Standard {
            aye: false,
            conviction,
            balance,
        }
    }

    /// Total balance put behind this vote.
    pub fn balance(&self) -> Balance {
        match *self {
            AccountVote::Standard { balance, .. } => balance,
            AccountVote::Split { aye, nay } => aye.saturating_add(nay),
            AccountVote::SplitAbstain { aye, nay, abstain } => {
                aye.saturating_add(nay).saturating_add(abstain)
            }
        }
    }
}
