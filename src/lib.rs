#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! ECS task discovery and change monitoring for [Tonic](https://docs.rs/tonic) gRPC load balancing.
//!
//! Services on ECS often run behind no load balancer at all: tasks publish a
//! host port on whatever container instance they were placed on. This crate
//! resolves a service into the host/port pairs of its tasks and keeps polling
//! for changes, so clients can balance across tasks directly.
//!
//! # Features
//!
//! - **Task resolution**: [`TaskFinder`] joins tasks, container instances and
//!   EC2 instances into a sorted snapshot of [`TaskInfo`] records
//! - **Change monitoring**: [`TaskMonitor`] polls adaptively and reports both
//!   lifecycle changes and changes in the set of serving tasks
//! - **Balance channel integration**: [`balance::discover`] feeds serving tasks
//!   to a user-provided Tonic balance channel
//!
//! An assumption is that each task has one canonical container, for example a
//! web server. For multi-container tasks, the canonical container's name should
//! match the service name.
//!
//! The ECS and EC2 APIs are reached through the [`Orchestrator`] and
//! [`ComputeInventory`] traits, implemented on top of whichever SDK the
//! application already uses.
//!
//! # Usage
//!
//! ```ignore
//! use tonic_lb_ecs::{DiscoveryConfig, TaskMonitor};
//!
//! let config = DiscoveryConfig::new("prod", "my-grpc-service");
//! let handle = TaskMonitor::new(config, ecs, ec2)
//!     .on_task_change(|tasks| {
//!         for task in tasks {
//!             println!("  {task}");
//!         }
//!     })
//!     .on_error(|e| eprintln!("error detected: {e}"))
//!     .monitor()
//!     .await;
//!
//! // Wait for ctrl+c to exit.
//! tokio::signal::ctrl_c().await?;
//! handle.cancel().await;
//! ```

mod arn;
pub mod balance;
mod client;
mod config;
mod diff;
mod error;
#[cfg(test)]
mod fake;
mod finder;
mod monitor;
mod task;

pub use arn::Arn;
pub use client::{
    ClientResult, ComputeInventory, Container, ContainerInstance, Described, Failure, Instance,
    NetworkBinding, Orchestrator, Page, Reservation, Task,
};
pub use config::{AddressKind, DEFAULT_POLL_INTERVAL, DEFAULT_VOLATILE_POLL_INTERVAL, DiscoveryConfig};
pub use diff::{all_on_definition, running_tasks, tasks_equal};
pub use error::{BoxError, Error, Result};
pub use finder::{MAX_DESCRIBE_TASKS, TaskFinder};
pub use monitor::{MonitorHandle, MonitorState, MonitorView, STABLE_UPDATE_THRESHOLD, TaskMonitor};
pub use task::{TaskInfo, TaskStatus, UnknownStatus};
