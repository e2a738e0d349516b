//! Resolution of an ECS service into its reachable tasks.
//!
//! ECS does not return addressable endpoints directly. A service's tasks know
//! their container instance, the container instance knows its EC2 instance,
//! and only the EC2 instance knows the host's DNS names and IP addresses.
//!
//! # How It Works
//!
//! 1. Lists task ARNs with desired status `RUNNING`, then `STOPPED` so that
//!    tasks in the process of stopping remain visible
//! 2. Describes the tasks in batches of [`MAX_DESCRIBE_TASKS`] and drops the
//!    ones that have fully stopped
//! 3. Describes the hosting container instances and their EC2 instances
//! 4. Joins each task with its host and the port published by the service's
//!    container, and sorts the result by public DNS name and port

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::arn::Arn;
use crate::client::{ComputeInventory, Container, Instance, Orchestrator, Task};
use crate::error::{Error, Result};
use crate::task::{TaskInfo, TaskStatus};

/// Maximum number of tasks ECS accepts in a single describe call.
pub const MAX_DESCRIBE_TASKS: usize = 100;

/// Locates the tasks of ECS services.
///
/// Holds only shared client handles, so clones are cheap and one finder can
/// serve any number of monitors concurrently.
#[derive(Clone)]
pub struct TaskFinder {
    cluster: String,
    ecs: Arc<dyn Orchestrator>,
    ec2: Arc<dyn ComputeInventory>,
}

impl fmt::Debug for TaskFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFinder")
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl TaskFinder {
    /// Creates a finder for the given cluster.
    #[must_use]
    pub fn new(
        cluster: impl Into<String>,
        ecs: Arc<dyn Orchestrator>,
        ec2: Arc<dyn ComputeInventory>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            ecs,
            ec2,
        }
    }

    /// Returns the cluster this finder queries.
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Returns the ARNs of all services active on the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteQuery`] if any page fails to load.
    pub async fn services(&self) -> Result<Vec<String>> {
        let mut services = Vec::new();
        let mut next_token = None;

        loop {
            let page = self
                .ecs
                .list_services(&self.cluster, next_token.clone())
                .await
                .map_err(Error::remote(
                    "ecs list services",
                    &self.cluster,
                    "",
                    next_token.as_deref(),
                ))?;

            services.extend(page.items);
            next_token = page.next_token;

            if next_token.is_none() {
                return Ok(services);
            }
        }
    }

    /// Returns information about a service's tasks, sorted first by public
    /// DNS name and then port.
    ///
    /// `service` may be a service name or a service ARN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteQuery`] if a remote call fails,
    /// [`Error::PartialFailure`] if a task or container instance could not be
    /// described, and [`Error::AmbiguousContainer`] if a task has no single
    /// container for the service.
    pub async fn tasks(&self, service: &str) -> Result<Vec<TaskInfo>> {
        let task_arns = self.fetch_tasks(service).await?;
        if task_arns.is_empty() {
            tracing::debug!("no tasks for {}/{service}", self.cluster);
            return Ok(Vec::new());
        }

        let tasks = self.describe_tasks(service, &task_arns).await?;
        let hosts = self.locate_tasks(service, &tasks).await?;

        // Multi-container tasks name their service container after the service.
        let container_name = Arn::parse(service).resource;

        let mut infos = tasks
            .iter()
            .map(|task| self.task_info(task, service, &container_name, &hosts))
            .collect::<Result<Vec<_>>>()?;
        infos.sort();

        tracing::debug!(
            "{} tasks for {}/{service} ({} listed)",
            infos.len(),
            self.cluster,
            task_arns.len()
        );

        Ok(infos)
    }

    fn task_info(
        &self,
        task: &Task,
        service: &str,
        container_name: &str,
        hosts: &HashMap<String, Instance>,
    ) -> Result<TaskInfo> {
        let container =
            service_container(task, container_name).ok_or_else(|| Error::AmbiguousContainer {
                cluster: self.cluster.clone(),
                service: service.to_string(),
                task: task.task_arn.clone(),
                containers: task.containers.len(),
            })?;

        let mut info = TaskInfo {
            task_definition: Arn::parse(&task.task_definition_arn).short_name(),
            desired_status: task.desired_status,
            last_status: task.last_status,
            started_at: task.started_at,
            stopped_at: task.stopped_at,
            port: host_port(container),
            ..TaskInfo::default()
        };

        // Tasks still being placed have no host yet.
        let host = task
            .container_instance_arn
            .as_ref()
            .and_then(|arn| hosts.get(arn));

        if let Some(instance) = host {
            info.public_dns_name = instance.public_dns_name.clone().unwrap_or_default();
            info.public_ip_address = instance.public_ip_address.clone().unwrap_or_default();
            info.private_dns_name = instance.private_dns_name.clone().unwrap_or_default();
            info.private_ip_address = instance.private_ip_address.clone().unwrap_or_default();
        }

        Ok(info)
    }

    /// Returns the EC2 instance hosting each container instance ARN.
    async fn locate_tasks(
        &self,
        service: &str,
        tasks: &[Task],
    ) -> Result<HashMap<String, Instance>> {
        let arns = unique(
            tasks
                .iter()
                .filter_map(|t| t.container_instance_arn.clone()),
        );
        if arns.is_empty() {
            return Ok(HashMap::new());
        }

        let resp = self
            .ecs
            .describe_container_instances(&self.cluster, &arns)
            .await
            .map_err(Error::remote(
                "ecs describe container instances",
                &self.cluster,
                service,
                arns.first().map(String::as_str),
            ))?;

        if let Some(failure) = resp.failures.into_iter().next() {
            return Err(Error::PartialFailure {
                operation: "describe container instances",
                arn: failure.arn,
                reason: failure.reason,
            });
        }

        let ec2_ids = unique(resp.items.iter().filter_map(|ci| ci.ec2_instance_id.clone()));
        let instances = self.locate_instances(service, &ec2_ids).await?;

        Ok(resp
            .items
            .into_iter()
            .filter_map(|ci| {
                let instance = instances.get(ci.ec2_instance_id.as_ref()?)?;
                Some((ci.container_instance_arn, instance.clone()))
            })
            .collect())
    }

    async fn locate_instances(
        &self,
        service: &str,
        ec2_ids: &[String],
    ) -> Result<HashMap<String, Instance>> {
        if ec2_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let reservations = self
            .ec2
            .describe_instances(ec2_ids)
            .await
            .map_err(Error::remote(
                "ec2 describe instances",
                &self.cluster,
                service,
                ec2_ids.first().map(String::as_str),
            ))?;

        // TODO: find out when a reservation returns more than one instance
        // for a lookup by id; until then the first one is used.
        Ok(reservations
            .into_iter()
            .filter_map(|r| r.instances.into_iter().next())
            .map(|i| (i.instance_id.clone(), i))
            .collect())
    }

    async fn describe_tasks(&self, service: &str, task_arns: &[String]) -> Result<Vec<Task>> {
        // A flapping service can accumulate lots of stopped tasks, and
        // DescribeTasks only accepts 100 at a time. A failed batch ends the
        // resolution before the next one is sent.
        let mut tasks = Vec::with_capacity(task_arns.len());
        for chunk in task_arns.chunks(MAX_DESCRIBE_TASKS) {
            let resp = self
                .ecs
                .describe_tasks(&self.cluster, chunk)
                .await
                .map_err(Error::remote(
                    "ecs describe tasks",
                    &self.cluster,
                    service,
                    chunk.first().map(String::as_str),
                ))?;

            if let Some(failure) = resp.failures.into_iter().next() {
                return Err(Error::PartialFailure {
                    operation: "describe task",
                    arn: failure.arn,
                    reason: failure.reason,
                });
            }

            // Tasks that are still stopping are kept.
            tasks.extend(
                resp.items
                    .into_iter()
                    .filter(|t| t.last_status != TaskStatus::Stopped),
            );
        }

        Ok(tasks)
    }

    async fn fetch_tasks(&self, service: &str) -> Result<Vec<String>> {
        // ListTasks filters on desired status, not current status.
        let running = self
            .fetch_tasks_with_status(service, TaskStatus::Running)
            .await?;
        let stopping = self
            .fetch_tasks_with_status(service, TaskStatus::Stopped)
            .await?;

        // A task can move between the two listings.
        Ok(unique(running.into_iter().chain(stopping)))
    }

    async fn fetch_tasks_with_status(
        &self,
        service: &str,
        desired_status: TaskStatus,
    ) -> Result<Vec<String>> {
        let mut tasks = Vec::new();
        let mut next_token = None;

        loop {
            let page = self
                .ecs
                .list_tasks(&self.cluster, service, desired_status, next_token.clone())
                .await
                .map_err(Error::remote(
                    "ecs list tasks",
                    &self.cluster,
                    service,
                    next_token.as_deref(),
                ))?;

            tasks.extend(page.items);
            next_token = page.next_token;

            if next_token.is_none() {
                return Ok(tasks);
            }
        }
    }
}

/// Picks the container whose port identifies the task.
///
/// Single-container tasks use their only container. Otherwise exactly one
/// container must be named after the service.
fn service_container<'a>(task: &'a Task, container_name: &str) -> Option<&'a Container> {
    if let [only] = task.containers.as_slice() {
        return Some(only);
    }

    let mut matching = task.containers.iter().filter(|c| c.name == container_name);
    match (matching.next(), matching.next()) {
        (Some(container), None) => Some(container),
        _ => None,
    }
}

/// Returns the first published host port, or 0 while the task is pending.
fn host_port(container: &Container) -> u16 {
    container
        .network_bindings
        .first()
        .and_then(|b| b.host_port)
        .unwrap_or(0)
}

/// Removes duplicates, keeping the first occurrence.
fn unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
