use std::fmt::{self, Display, Formatter};

use thiserror::Error;
use url::Url;

/// Transport schemes a node can be reached through.
pub const SUPPORTED_SCHEMES: [&str; 2] = ["ws", "wss"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidEndpoint {
    pub endpoint: String,
    pub reason: String,
}

impl Display for InvalidEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.endpoint, self.reason)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("No endpoints given")]
    Empty,
    #[error("Invalid endpoints: {}", list(.0))]
    Invalid(Vec<InvalidEndpoint>),
}

fn list(invalid: &[InvalidEndpoint]) -> String {
    invalid
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check(endpoint: &str) -> Result<(), String> {
    let url = Url::parse(endpoint).map_err(|error| error.to_string())?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_owned());
    }
    Ok(())
}

/// Checks every candidate before anything is dialed.
///
/// Returns the trimmed candidates in their original order, or every invalid one.
pub fn validate_endpoints<I, S>(candidates: I) -> Result<Vec<String>, EndpointError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut valid = vec![];
    let mut invalid = vec![];
    for candidate in candidates {
        let endpoint = candidate.as_ref().trim();
        match check(endpoint) {
            Ok(()) => valid.push(endpoint.to_owned()),
            Err(reason) => invalid.push(InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason,
            }),
        }
    }

    if !invalid.is_empty() {
        return Err(EndpointError::Invalid(invalid));
    }
    if valid.is_empty() {
        return Err(EndpointError::Empty);
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_endpoints() {
        let endpoints =
            validate_endpoints([" wss://rpc.polkadot.io ", "ws://127.0.0.1:9944"]).unwrap();
        assert_eq!(endpoints, vec!["wss://rpc.polkadot.io", "ws://127.0.0.1:9944"]);
    }

    #[test]
    fn reports_every_invalid_endpoint() {
        let error =
            validate_endpoints(["https://rpc.polkadot.io", "wss://ok.example", "nonsense"])
                .unwrap_err();
        let EndpointError::Invalid(invalid) = error else {
            panic!("unexpected error {error:?}");
        };
        assert_eq!(invalid.len(), 2);
        assert_eq!(invalid[0].endpoint, "https://rpc.polkadot.io");
        assert_eq!(invalid[1].endpoint, "nonsense");
    }

    #[test]
    fn rejects_empty_list() {
        assert_eq!(
            validate_endpoints(Vec::<String>::new()),
            Err(EndpointError::Empty)
        );
    }
}
