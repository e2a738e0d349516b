//! Discovery configuration.

use std::time::Duration;

/// How often to check ECS for task changes under normal operation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How often to check ECS for task changes while a task is pending or about
/// to stop.
pub const DEFAULT_VOLATILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which of a host's addresses to dial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressKind {
    /// The host's private IP address.
    #[default]
    Private,
    /// The host's public IP address.
    Public,
}

/// Configuration for ECS task discovery.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// The ECS cluster the service runs in.
    pub cluster: String,

    /// The service name (or ARN) to discover tasks for.
    pub service: String,

    /// Polling interval while all tasks are stable.
    pub poll_interval: Duration,

    /// Polling interval while a task is transitioning between states.
    pub volatile_poll_interval: Duration,

    /// Which host address the load-balancing integration connects to.
    pub address: AddressKind,
}

impl DiscoveryConfig {
    /// Creates a new discovery configuration with default polling intervals.
    #[must_use]
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            volatile_poll_interval: DEFAULT_VOLATILE_POLL_INTERVAL,
            address: AddressKind::default(),
        }
    }

    /// Sets the polling interval used while all tasks are stable.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the polling interval used while tasks are transitioning.
    #[must_use]
    pub fn volatile_poll_interval(mut self, interval: Duration) -> Self {
        self.volatile_poll_interval = interval;
        self
    }

    /// Sets which host address endpoints are built from.
    #[must_use]
    pub fn address(mut self, address: AddressKind) -> Self {
        self.address = address;
        self
    }
}
