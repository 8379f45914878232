use ballot_network::{validate_endpoints, EndpointError};
use ballot_primitives::networks::{Network, NetworkParseError};
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::config::NetworkConfig;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("The `network` and `rpc` parameters can't be used together")]
    Conflict,
    #[error(transparent)]
    UnknownNetwork(#[from] NetworkParseError),
    #[error(transparent)]
    Endpoints(#[from] EndpointError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The URL parameters that select the network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub network: Option<String>,
    /// `|` separated endpoints of a custom node.
    pub rpc: Option<String>,
}

/// The network to use and how to reach it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkTarget {
    pub network: Network,
    pub endpoints: Vec<String>,
}

impl Location {
    pub fn from_query(query: &str) -> Self {
        let mut location = Location::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match &*key {
                "network" => location.network = Some(value.to_owned()),
                "rpc" => location.rpc = Some(value.to_owned()),
                _ => {}
            }
        }
        location
    }

    pub fn from_url(url: &str) -> Result<Self, LocationError> {
        let url = Url::parse(url)?;
        Ok(Self::from_query(url.query().unwrap_or_default()))
    }

    /// Picks the network: the `network` parameter, else the `rpc` endpoints (as a local
    /// network), else `fallback`, else the configured default.
    pub fn resolve(
        &self,
        fallback: Option<Network>,
        config: &NetworkConfig,
    ) -> Result<NetworkTarget, LocationError> {
        match (&self.network, &self.rpc) {
            (Some(_), Some(_)) => Err(LocationError::Conflict),
            (Some(network), None) => {
                let network: Network = network.parse()?;
                Ok(NetworkTarget {
                    network,
                    endpoints: config.endpoints(network),
                })
            }
            (None, Some(rpc)) => Ok(NetworkTarget {
                network: Network::Local,
                endpoints: validate_endpoints(rpc.split('|'))?,
            }),
            (None, None) => {
                let network = fallback.or(config.default).unwrap_or_default();
                Ok(NetworkTarget {
                    network,
                    endpoints: config.endpoints(network),
                })
            }
        }
    }
}
