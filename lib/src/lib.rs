//! Core of the ballot client: the application state and everything that drives it.
//!
//! The [`Updater`] owns the connection to the node, the stores and the metadata
//! service. It feeds [`Action`]s through the [`reducer`], and consumers observe the
//! resulting [`AppState`].

pub mod action;
pub mod config;
pub mod error;
pub mod extras;
pub mod location;
pub mod reconcile;
pub mod reducer;
pub mod state;
pub mod updater;

pub use action::Action;
pub use config::{ClientConfig, DatabaseConfig, NetworkConfig, UpdaterConfig};
pub use error::{ConfigError, UpdaterError};
pub use location::{Location, LocationError, NetworkTarget};
pub use reducer::reduce;
pub use state::{AppState, Connectivity, Phase, Processing, Report, ReportKind, Votes};
pub use updater::{EnvironmentEvent, HistoryEntry, Services, StopHandle, Updater};
