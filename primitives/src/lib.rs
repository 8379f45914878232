pub mod account;
pub mod chain;
pub mod delegate;
pub mod networks;
pub mod referendum;
pub mod track;
pub mod transaction;
pub mod vote;
pub mod voting;

pub use account::{AccountId, Balance, BlockNumber};
pub use referendum::ReferendumIndex;
pub use track::TrackId;
