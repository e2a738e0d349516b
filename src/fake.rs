//! In-memory cluster used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::{
    ClientResult, ComputeInventory, Container, ContainerInstance, Described, Failure, Instance,
    NetworkBinding, Orchestrator, Page, Reservation, Task,
};
use crate::task::TaskStatus;

/// Listing calls return at most this many items per page.
const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct State {
    services: Vec<String>,
    tasks: Vec<Task>,
    container_instances: HashMap<String, ContainerInstance>,
    instances: HashMap<String, Instance>,
    task_failures: HashMap<String, String>,
    failing: Option<&'static str>,
    failing_call: Option<(&'static str, usize)>,
    calls: Vec<String>,
    describe_batches: Vec<usize>,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_service(&self, arn: &str) {
        self.state().services.push(arn.to_string());
    }

    /// Registers a container instance running on an EC2 host named `host`.
    pub(crate) fn add_host(&self, container_instance_arn: &str, ec2_instance_id: &str, host: &str) {
        let mut state = self.state();
        let octet = state.instances.len() + 1;
        state.container_instances.insert(
            container_instance_arn.to_string(),
            ContainerInstance {
                container_instance_arn: container_instance_arn.to_string(),
                ec2_instance_id: Some(ec2_instance_id.to_string()),
            },
        );
        state
            .instances
            .insert(ec2_instance_id.to_string(), instance(ec2_instance_id, host, octet));
    }

    /// Registers a container instance whose EC2 instance is unknown to EC2.
    pub(crate) fn add_orphan_host(&self, container_instance_arn: &str, ec2_instance_id: &str) {
        self.state().container_instances.insert(
            container_instance_arn.to_string(),
            ContainerInstance {
                container_instance_arn: container_instance_arn.to_string(),
                ec2_instance_id: Some(ec2_instance_id.to_string()),
            },
        );
    }

    /// Inserts or replaces a task, keyed by its ARN.
    pub(crate) fn put_task(&self, task: Task) {
        let mut state = self.state();
        match state.tasks.iter_mut().find(|t| t.task_arn == task.task_arn) {
            Some(existing) => *existing = task,
            None => state.tasks.push(task),
        }
    }

    pub(crate) fn remove_task(&self, arn: &str) {
        self.state().tasks.retain(|t| t.task_arn != arn);
    }

    pub(crate) fn fail_describe(&self, arn: &str, reason: &str) {
        self.state()
            .task_failures
            .insert(arn.to_string(), reason.to_string());
    }

    /// Makes every call of `operation` fail until [`Self::recover`].
    pub(crate) fn fail(&self, operation: &'static str) {
        self.state().failing = Some(operation);
    }

    /// Makes only the `nth` call (1-based) of `operation` fail.
    pub(crate) fn fail_call(&self, operation: &'static str, nth: usize) {
        self.state().failing_call = Some((operation, nth));
    }

    pub(crate) fn recover(&self) {
        self.state().failing = None;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub(crate) fn describe_batches(&self) -> Vec<usize> {
        self.state().describe_batches.clone()
    }

    fn record(&self, operation: &'static str) -> ClientResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.failing == Some(operation) {
            return Err(format!("{operation}: service unavailable").into());
        }
        if let Some((failing, nth)) = state.failing_call {
            let count = state.calls.iter().filter(|c| *c == operation).count();
            if failing == operation && count == nth {
                return Err(format!("{operation}: throttled").into());
            }
        }
        Ok(state)
    }
}

fn paginate(items: Vec<String>, next_token: Option<String>) -> Page<String> {
    let start = next_token.map_or(0, |t| t.parse::<usize>().unwrap());
    let end = (start + PAGE_SIZE).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next_token: (end < items.len()).then(|| end.to_string()),
    }
}

#[async_trait]
impl Orchestrator for FakeCluster {
    async fn list_services(
        &self,
        _cluster: &str,
        next_token: Option<String>,
    ) -> ClientResult<Page<String>> {
        let state = self.record("list_services")?;
        Ok(paginate(state.services.clone(), next_token))
    }

    async fn list_tasks(
        &self,
        _cluster: &str,
        _service: &str,
        desired_status: TaskStatus,
        next_token: Option<String>,
    ) -> ClientResult<Page<String>> {
        let state = self.record("list_tasks")?;
        let arns = state
            .tasks
            .iter()
            .filter(|t| t.desired_status == desired_status)
            .map(|t| t.task_arn.clone())
            .collect();
        Ok(paginate(arns, next_token))
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        tasks: &[String],
    ) -> ClientResult<Described<Task>> {
        assert!(!tasks.is_empty(), "empty describe_tasks call");
        assert!(tasks.len() <= 100, "describe_tasks over the API limit");

        let mut state = self.record("describe_tasks")?;
        state.describe_batches.push(tasks.len());

        let mut described = Described::default();
        for arn in tasks {
            if let Some(reason) = state.task_failures.get(arn) {
                described.failures.push(Failure {
                    arn: arn.clone(),
                    reason: reason.clone(),
                });
            } else if let Some(task) = state.tasks.iter().find(|t| &t.task_arn == arn) {
                described.items.push(task.clone());
            } else {
                described.failures.push(Failure {
                    arn: arn.clone(),
                    reason: "MISSING".to_string(),
                });
            }
        }
        Ok(described)
    }

    async fn describe_container_instances(
        &self,
        _cluster: &str,
        container_instances: &[String],
    ) -> ClientResult<Described<ContainerInstance>> {
        let state = self.record("describe_container_instances")?;
        let mut described = Described::default();
        for arn in container_instances {
            match state.container_instances.get(arn) {
                Some(ci) => described.items.push(ci.clone()),
                None => described.failures.push(Failure {
                    arn: arn.clone(),
                    reason: "MISSING".to_string(),
                }),
            }
        }
        Ok(described)
    }
}

#[async_trait]
impl ComputeInventory for FakeCluster {
    async fn describe_instances(&self, instance_ids: &[String]) -> ClientResult<Vec<Reservation>> {
        let state = self.record("describe_instances")?;
        Ok(instance_ids
            .iter()
            .filter_map(|id| state.instances.get(id))
            .map(|i| Reservation {
                instances: vec![i.clone()],
            })
            .collect())
    }
}

fn instance(id: &str, host: &str, octet: usize) -> Instance {
    Instance {
        instance_id: id.to_string(),
        public_dns_name: Some(format!("{host}.public.example.com")),
        public_ip_address: Some(format!("54.0.0.{octet}")),
        private_dns_name: Some(format!("{host}.internal")),
        private_ip_address: Some(format!("10.0.0.{octet}")),
    }
}

/// Installs a log subscriber for the current test; `RUST_LOG` selects output.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn container(name: &str, host_port: Option<u16>) -> Container {
    Container {
        name: name.to_string(),
        network_bindings: host_port
            .map(|port| NetworkBinding {
                container_port: Some(8080),
                host_port: Some(port),
            })
            .into_iter()
            .collect(),
    }
}

pub(crate) fn task(
    arn: &str,
    desired_status: TaskStatus,
    last_status: TaskStatus,
    container_instance_arn: Option<&str>,
    containers: Vec<Container>,
) -> Task {
    Task {
        task_arn: arn.to_string(),
        task_definition_arn: "arn:aws:ecs:us-east-1:123456789012:task-definition/web:1"
            .to_string(),
        desired_status,
        last_status,
        container_instance_arn: container_instance_arn.map(String::from),
        containers,
        ..Default::default()
    }
}
