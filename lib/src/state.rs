use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    ops::{Deref, DerefMut},
    sync::Arc,
};

use ballot_primitives::{
    chain::{AccountChainState, ChainState},
    delegate::Delegate,
    networks::Network,
    referendum::{ReferendumDetails, ReferendumIndex},
    vote::AccountVote,
    AccountId, BlockNumber,
};

/// Locally known decisions, by referendum.
pub type Votes = BTreeMap<ReferendumIndex, AccountVote>;

/// Positions of the presentation layer, e.g. the referendum currently shown.
pub type Indexes = BTreeMap<String, usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub kind: ReportKind,
    pub message: String,
}

impl Report {
    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ReportKind::Warning,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ReportKind::Error,
            message: message.into(),
        }
    }
}

/// What the transport to the node is doing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    Offline,
    #[default]
    Online,
    /// Transport open, no block seen yet.
    Connected(Vec<String>),
    /// At least one block streamed since connecting.
    Following(Vec<String>),
}

/// Progress of a long running operation, e.g. a vote submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Processing {
    pub title: String,
    pub message: Option<String>,
}

impl Processing {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            message: None,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Fields available in every phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BaseState {
    pub connectivity: Connectivity,
    /// Most recent first.
    pub reports: Arc<Vec<Report>>,
    pub connected_address: Option<AccountId>,
    pub indexes: Indexes,
    pub delegates: Arc<Vec<Delegate>>,
}

/// The store of a network has been read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoredState {
    pub base: BaseState,
    pub network: Network,
    pub votes: Arc<Votes>,
    pub custom_delegates: Arc<Vec<Delegate>>,
}

/// A block and the chain state at that block have been received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectedState {
    pub restored: RestoredState,
    pub block: BlockNumber,
    pub chain: Arc<ChainState>,
    /// Chain state of the connected address, once fetched.
    pub account: Option<Arc<AccountChainState>>,
    pub details: Arc<BTreeMap<ReferendumIndex, ReferendumDetails>>,
    pub processing: Option<Processing>,
}

impl Deref for RestoredState {
    type Target = BaseState;

    fn deref(&self) -> &BaseState {
        &self.base
    }
}

impl DerefMut for RestoredState {
    fn deref_mut(&mut self) -> &mut BaseState {
        &mut self.base
    }
}

impl Deref for ConnectedState {
    type Target = RestoredState;

    fn deref(&self) -> &RestoredState {
        &self.restored
    }
}

impl DerefMut for ConnectedState {
    fn deref_mut(&mut self) -> &mut RestoredState {
        &mut self.restored
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Restored,
    Connected,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Initial => "initial",
            Phase::Restored => "restored",
            Phase::Connected => "connected",
        })
    }
}

/// The application state. Each phase carries everything the previous one does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppState {
    Initial(BaseState),
    Restored(RestoredState),
    Connected(ConnectedState),
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Initial(BaseState::default())
    }
}

impl AppState {
    pub fn phase(&self) -> Phase {
        match self {
            AppState::Initial(_) => Phase::Initial,
            AppState::Restored(_) => Phase::Restored,
            AppState::Connected(_) => Phase::Connected,
        }
    }

    pub fn base(&self) -> &BaseState {
        match self {
            AppState::Initial(base) => base,
            AppState::Restored(restored) => &restored.base,
            AppState::Connected(connected) => &connected.restored.base,
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseState {
        match self {
            AppState::Initial(base) => base,
            AppState::Restored(restored) => &mut restored.base,
            AppState::Connected(connected) => &mut connected.restored.base,
        }
    }

    pub fn restored(&self) -> Option<&RestoredState> {
        match self {
            AppState::Initial(_) => None,
            AppState::Restored(restored) => Some(restored),
            AppState::Connected(connected) => Some(&connected.restored),
        }
    }

    pub(crate) fn restored_mut(&mut self) -> Option<&mut RestoredState> {
        match self {
            AppState::Initial(_) => None,
            AppState::Restored(restored) => Some(restored),
            AppState::Connected(connected) => Some(&mut connected.restored),
        }
    }

    pub fn connected(&self) -> Option<&ConnectedState> {
        match self {
            AppState::Connected(connected) => Some(connected),
            _ => None,
        }
    }

    pub fn network(&self) -> Option<Network> {
        self.restored().map(|restored| restored.network)
    }

    pub fn reports(&self) -> &[Report] {
        &self.base().reports
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.base().connectivity
    }

    pub fn connected_address(&self) -> Option<&AccountId> {
        self.base().connected_address.as_ref()
    }
}
