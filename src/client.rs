//! Interfaces to the remote ECS and EC2 APIs.
//!
//! Discovery only reads cluster state. Implementations wrap whatever SDK the
//! application already uses; each call must return a definitive result, the
//! finder does not retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BoxError;
use crate::task::TaskStatus;

/// Result type for collaborator calls.
pub type ClientResult<T> = std::result::Result<T, BoxError>;

/// One page of a paginated listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

/// Result of a batched describe call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Described<T> {
    /// Items that were found.
    pub items: Vec<T>,
    /// Items that could not be described.
    pub failures: Vec<Failure>,
}

impl<T> Default for Described<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// A per-item failure reported by a describe call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Failure {
    /// Identifier of the item.
    pub arn: String,
    /// Why it could not be described, e.g. `MISSING`.
    pub reason: String,
}

/// A task as described by ECS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Task {
    /// ARN of the task.
    pub task_arn: String,
    /// ARN of the task definition the task was launched from.
    pub task_definition_arn: String,
    /// State ECS is driving the task towards.
    pub desired_status: TaskStatus,
    /// Last reported state.
    pub last_status: TaskStatus,
    /// When the task started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task stopped.
    pub stopped_at: Option<DateTime<Utc>>,
    /// ARN of the container instance hosting the task, once placed.
    pub container_instance_arn: Option<String>,
    /// Containers run by the task.
    pub containers: Vec<Container>,
}

/// A container within a task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    /// Container name from the task definition.
    pub name: String,
    /// Published ports, empty while the task is pending.
    pub network_bindings: Vec<NetworkBinding>,
}

/// A port mapping between a container and its host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkBinding {
    /// Port inside the container.
    pub container_port: Option<u16>,
    /// Port published on the host.
    pub host_port: Option<u16>,
}

/// An ECS container instance (the agent host).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerInstance {
    /// ARN of the container instance.
    pub container_instance_arn: String,
    /// EC2 instance the agent runs on.
    pub ec2_instance_id: Option<String>,
}

/// A group of EC2 instances launched together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reservation {
    /// Instances in the reservation.
    pub instances: Vec<Instance>,
}

/// Network identity of an EC2 instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Instance {
    /// EC2 instance id.
    pub instance_id: String,
    /// Public DNS name.
    pub public_dns_name: Option<String>,
    /// Public IPv4 address.
    pub public_ip_address: Option<String>,
    /// Private DNS name.
    pub private_dns_name: Option<String>,
    /// Private IPv4 address.
    pub private_ip_address: Option<String>,
}

/// Read access to the ECS control plane.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Lists service ARNs in a cluster.
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ClientResult<Page<String>>;

    /// Lists ARNs of a service's tasks with the given desired status.
    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
        desired_status: TaskStatus,
        next_token: Option<String>,
    ) -> ClientResult<Page<String>>;

    /// Describes up to [`MAX_DESCRIBE_TASKS`](crate::MAX_DESCRIBE_TASKS) tasks.
    async fn describe_tasks(&self, cluster: &str, tasks: &[String])
    -> ClientResult<Described<Task>>;

    /// Describes container instances.
    async fn describe_container_instances(
        &self,
        cluster: &str,
        container_instances: &[String],
    ) -> ClientResult<Described<ContainerInstance>>;
}

/// Read access to the EC2 instance inventory.
#[async_trait]
pub trait ComputeInventory: Send + Sync {
    /// Describes EC2 instances, grouped by reservation.
    async fn describe_instances(&self, instance_ids: &[String]) -> ClientResult<Vec<Reservation>>;
}
