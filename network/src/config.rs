use std::time::Duration;

/// Tuning of the connection supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Pause between two connection attempts.
    pub retry_delay: Duration,
    /// Upper bound for opening a transport and for single requests on it.
    pub request_timeout: Duration,
    /// Interval of the liveness check.
    pub liveness_interval: Duration,
    /// A connection that received no data for more consecutive checks than this is
    /// considered stalled.
    pub max_stalled_checks: usize,
    /// Consecutive rounds over all endpoints without a single successful connection
    /// after which the connection gives up. `None` retries forever.
    pub max_connect_rounds: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(2500),
            request_timeout: Duration::from_secs(15),
            liveness_interval: Duration::from_secs(5),
            max_stalled_checks: 5,
            max_connect_rounds: Some(3),
        }
    }
}
