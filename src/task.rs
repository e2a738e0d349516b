//! Enriched task records produced by discovery.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Lifecycle state of an ECS task.
///
/// See <http://docs.aws.amazon.com/AmazonECS/latest/developerguide/task_life_cycle.html>.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    /// The task has been started but is not yet running.
    #[default]
    Pending,
    /// The task is running and taking traffic.
    Running,
    /// The task has been stopped.
    Stopped,
}

impl TaskStatus {
    /// Returns the wire name used by the ECS API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire status is not one of the known task states.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(
    /// The unrecognized status.
    pub String,
);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Information about one task of a service, joined with its host.
///
/// Host fields are empty while the task has not been placed yet, and `port`
/// is 0 until the container's network binding exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskInfo {
    /// Short name (`family:revision`) of the task definition.
    pub task_definition: String,
    /// The state ECS is driving the task towards.
    pub desired_status: TaskStatus,
    /// The last state reported for the task.
    pub last_status: TaskStatus,
    /// When the task started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task stopped.
    pub stopped_at: Option<DateTime<Utc>>,
    /// First host port published by the service's container.
    pub port: u16,
    /// Public DNS name of the host.
    pub public_dns_name: String,
    /// Public IP address of the host.
    pub public_ip_address: String,
    /// Private DNS name of the host.
    pub private_dns_name: String,
    /// Private IP address of the host.
    pub private_ip_address: String,
}

impl TaskInfo {
    /// Returns true if the task is in a transition between states.
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.desired_status != self.last_status
    }

    /// Returns true if the task is running and expected to keep running.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.last_status == TaskStatus::Running && self.desired_status == TaskStatus::Running
    }
}

// Ordered by public DNS name and then port; remaining fields only break ties.
impl Ord for TaskInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.public_dns_name
            .cmp(&other.public_dns_name)
            .then(self.port.cmp(&other.port))
            .then_with(|| self.private_dns_name.cmp(&other.private_dns_name))
            .then_with(|| self.public_ip_address.cmp(&other.public_ip_address))
            .then_with(|| self.private_ip_address.cmp(&other.private_ip_address))
            .then_with(|| self.task_definition.cmp(&other.task_definition))
            .then_with(|| self.last_status.cmp(&other.last_status))
            .then_with(|| self.desired_status.cmp(&other.desired_status))
            .then_with(|| self.started_at.cmp(&other.started_at))
            .then_with(|| self.stopped_at.cmp(&other.stopped_at))
    }
}

impl PartialOrd for TaskInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_transitioning() {
            write!(
                f,
                "[{} > {}] {} @ {}:{}",
                self.last_status,
                self.desired_status,
                self.task_definition,
                self.public_dns_name,
                self.port
            )
        } else {
            write!(
                f,
                "[{}] {} @ {}:{}",
                self.last_status, self.task_definition, self.public_dns_name, self.port
            )
        }
    }
}
