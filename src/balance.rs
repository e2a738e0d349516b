//! Feeding discovered tasks to a Tonic balance channel.
//!
//! This module runs a [`TaskMonitor`] for one service and sends endpoint
//! changes to a user-provided channel. Users are responsible for creating
//! their own Tonic channel and endpoints.
//!
//! # How It Works
//!
//! 1. Polls ECS for the service's tasks
//! 2. Whenever the set of running tasks changes, builds a socket address for
//!    each task from its host IP and published port
//! 3. Sends `Change::Insert` or `Change::Remove` events to the provided sender
//! 4. User's balance channel receives updates and manages connections

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::Endpoint;
use tonic::transport::channel::Change;

use crate::client::{ComputeInventory, Orchestrator};
use crate::config::{AddressKind, DiscoveryConfig};
use crate::monitor::TaskMonitor;
use crate::task::TaskInfo;

/// Starts monitoring a service and sends endpoint changes to the provided sender.
///
/// This function spawns a background task that polls ECS for the service's
/// tasks and sends a `Change` event whenever a task starts or stops serving.
/// Polling stops when the receiving side of `tx` is dropped or the returned
/// task is aborted.
///
/// # Arguments
///
/// * `config` - Discovery configuration specifying the service to watch
/// * `ecs` - ECS client used to list and describe tasks
/// * `ec2` - EC2 client used to resolve host addresses
/// * `tx` - Sender for endpoint changes (from `Channel::balance_channel()`)
/// * `build` - Function to build an `Endpoint` from a `SocketAddr`
///
/// # Example
///
/// ```ignore
/// use std::net::SocketAddr;
/// use std::time::Duration;
/// use tonic::transport::{Channel, Endpoint};
/// use tonic_lb_ecs::{DiscoveryConfig, balance};
///
/// let (channel, tx) = Channel::balance_channel::<SocketAddr>(1024);
///
/// let config = DiscoveryConfig::new("prod", "my-grpc-service");
/// balance::discover(config, ecs, ec2, tx, |addr| {
///     Endpoint::from_shared(format!("http://{addr}"))
///         .unwrap()
///         .connect_timeout(Duration::from_secs(5))
/// });
///
/// // Use with your generated gRPC client
/// let client = MyServiceClient::new(channel);
/// ```
pub fn discover<F>(
    config: DiscoveryConfig,
    ecs: Arc<dyn Orchestrator>,
    ec2: Arc<dyn ComputeInventory>,
    tx: Sender<Change<SocketAddr, Endpoint>>,
    build: F,
) -> JoinHandle<()>
where
    F: Fn(SocketAddr) -> Endpoint + Send + 'static,
{
    tokio::spawn(discovery_loop(tx, config, ecs, ec2, build))
}

/// Background task that forwards running-task changes as endpoint changes.
async fn discovery_loop<F>(
    tx: Sender<Change<SocketAddr, Endpoint>>,
    config: DiscoveryConfig,
    ecs: Arc<dyn Orchestrator>,
    ec2: Arc<dyn ComputeInventory>,
    build: F,
) where
    F: Fn(SocketAddr) -> Endpoint,
{
    let address = config.address;
    let name = format!("{}/{}", config.cluster, config.service);

    // Only the latest running set matters; snapshots published while a send
    // is blocked replace each other.
    let (snapshot_tx, mut snapshots) = watch::channel(Vec::<TaskInfo>::new());
    let monitor = TaskMonitor::new(config, ecs, ec2).on_task_change(move |running| {
        snapshot_tx.send_replace(running.to_vec());
    });

    tracing::debug!("Starting ECS task monitor for {name} using {address:?} addresses");

    let handle = monitor.monitor().await;
    let mut known: HashSet<SocketAddr> = HashSet::new();

    'watch: loop {
        let running = tokio::select! {
            () = tx.closed() => {
                tracing::warn!("channel closed, stopping ECS task monitor");
                break;
            }
            changed = snapshots.changed() => match changed {
                Ok(()) => snapshots.borrow_and_update().clone(),
                Err(_) => break,
            },
        };

        for action in process_snapshot(&running, &mut known, address) {
            let change = match action {
                EndpointAction::Insert(addr) => Change::Insert(addr, build(addr)),
                EndpointAction::Remove(addr) => Change::Remove(addr),
            };

            if tx.send(change).await.is_err() {
                tracing::warn!("channel closed, stopping ECS task monitor");
                break 'watch;
            }
        }

        tracing::debug!("ECS discovery: {} endpoints for {name}", known.len());
    }

    handle.cancel().await;
}

/// Represents an endpoint change action.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointAction {
    Insert(SocketAddr),
    Remove(SocketAddr),
}

/// Reconciles the known endpoints with the latest running tasks.
fn process_snapshot(
    running: &[TaskInfo],
    known: &mut HashSet<SocketAddr>,
    address: AddressKind,
) -> Vec<EndpointAction> {
    let current = extract_endpoints(running, address);
    let mut actions = Vec::new();

    known.retain(|addr| {
        if current.contains(addr) {
            return true;
        }

        tracing::debug!("removing endpoint: {addr}");
        actions.push(EndpointAction::Remove(*addr));
        false
    });

    for addr in current {
        if known.insert(addr) {
            tracing::debug!("adding endpoint: {addr}");
            actions.push(EndpointAction::Insert(addr));
        }
    }

    actions
}

/// Extracts dialable addresses from running tasks.
fn extract_endpoints(tasks: &[TaskInfo], address: AddressKind) -> HashSet<SocketAddr> {
    tasks
        .iter()
        // Tasks without a published port can't be dialed yet.
        .filter(|t| t.port != 0)
        .filter_map(|t| {
            let ip = match address {
                AddressKind::Private => &t.private_ip_address,
                AddressKind::Public => &t.public_ip_address,
            };

            ip.parse::<IpAddr>()
                .ok()
                .map(|ip| SocketAddr::new(ip, t.port))
        })
        .collect()
}
