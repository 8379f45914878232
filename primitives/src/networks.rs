use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The governance-enabled networks the client knows how to reach.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub enum Network {
    Kusama,
    Polkadot,
    Westend,
    /// A node given explicitly through endpoint overrides.
    Local,
}

impl Default for Network {
    fn default() -> Self {
        Self::Kusama
    }
}

#[derive(Clone, Error, Debug, PartialEq, Eq)]
#[error("Input is not a valid network name: {0}")]
pub struct NetworkParseError(String);

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Kusama" | "kusama" => Ok(Network::Kusama),
            "Polkadot" | "polkadot" => Ok(Network::Polkadot),
            "Westend" | "westend" => Ok(Network::Westend),
            "Local" | "local" => Ok(Network::Local),
            _ => Err(NetworkParseError(String::from(s))),
        }
    }
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Kusama,
        Network::Polkadot,
        Network::Westend,
        Network::Local,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Kusama => "Kusama",
            Network::Polkadot => "Polkadot",
            Network::Westend => "Westend",
            Network::Local => "Local",
        }
    }

    /// Public RPC endpoints, in order of preference.
    pub fn default_endpoints(self) -> &'static [&'static str] {
        match self {
            Network::Kusama => &[
                "wss://kusama-rpc.polkadot.io",
                "wss://kusama.api.onfinality.io/public-ws",
                "wss://kusama-rpc.dwellir.com",
            ],
            Network::Polkadot => &[
                "wss://rpc.polkadot.io",
                "wss://polkadot.api.onfinality.io/public-ws",
                "wss://polkadot-rpc.dwellir.com",
            ],
            Network::Westend => &[
                "wss://westend-rpc.polkadot.io",
                "wss://westend-rpc.dwellir.com",
            ],
            Network::Local => &["ws://127.0.0.1:9944"],
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
