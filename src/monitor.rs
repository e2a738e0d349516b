//! Change-driven polling of a service's tasks.
//!
//! A [`TaskMonitor`] repeatedly resolves a service with a [`TaskFinder`] and
//! compares the result against the last snapshot it saw. Two granularities
//! of change are reported:
//!
//! - **status changes**: any field of any task changed, including tasks that
//!   are pending or stopping
//! - **task changes**: the set of tasks that are running and desired to be
//!   running changed
//!
//! Polling is fast while a task is transitioning between states and slow
//! otherwise. After an error the monitor polls slowly until it has seen
//! [`STABLE_UPDATE_THRESHOLD`] successful updates in a row.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::{ComputeInventory, Orchestrator};
use crate::config::DiscoveryConfig;
use crate::diff::{running_tasks, tasks_equal};
use crate::error::Error;
use crate::finder::TaskFinder;
use crate::task::TaskInfo;

/// Number of successful updates after an error before the monitor trusts its
/// data enough to poll quickly.
pub const STABLE_UPDATE_THRESHOLD: u32 = 5;

type TasksCallback = Box<dyn FnMut(&[TaskInfo]) + Send>;
type ErrorCallback = Box<dyn FnMut(&Error) + Send>;

/// Lifecycle of a monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, not polling yet.
    #[default]
    Idle,
    /// The poll loop is active.
    Polling,
    /// The poll loop has stopped for good.
    Cancelled,
}

/// Point-in-time view of a monitor, readable while it polls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorView {
    /// Lifecycle state of the monitor.
    pub state: MonitorState,
    /// All known tasks, including pending and stopping ones.
    pub all_tasks: Vec<TaskInfo>,
    /// Tasks that are running and desired to be running.
    pub running_tasks: Vec<TaskInfo>,
}

/// Polls a service for task changes and notifies registered callbacks.
///
/// Callbacks run on the polling task, one at a time and in a fixed order: the
/// status callback before the task callback.
pub struct TaskMonitor {
    service: String,
    poll_interval: Duration,
    volatile_poll_interval: Duration,
    finder: TaskFinder,
    on_status_change: Option<TasksCallback>,
    on_task_change: Option<TasksCallback>,
    on_error: Option<ErrorCallback>,
    all_tasks: Option<Vec<TaskInfo>>,
    running_tasks: Option<Vec<TaskInfo>>,
    updates_since_error: u32,
    state: MonitorState,
    view: watch::Sender<MonitorView>,
}

impl fmt::Debug for TaskMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMonitor")
            .field("service", &self.service)
            .field("finder", &self.finder)
            .field("state", &self.state)
            .field("updates_since_error", &self.updates_since_error)
            .finish_non_exhaustive()
    }
}

impl TaskMonitor {
    /// Creates a monitor for the service named in `config`.
    #[must_use]
    pub fn new(
        config: DiscoveryConfig,
        ecs: Arc<dyn Orchestrator>,
        ec2: Arc<dyn ComputeInventory>,
    ) -> Self {
        let DiscoveryConfig {
            cluster,
            service,
            poll_interval,
            volatile_poll_interval,
            ..
        } = config;

        Self {
            service,
            poll_interval,
            volatile_poll_interval,
            finder: TaskFinder::new(cluster, ecs, ec2),
            on_status_change: None,
            on_task_change: None,
            on_error: None,
            all_tasks: None,
            running_tasks: None,
            updates_since_error: 0,
            state: MonitorState::Idle,
            view: watch::Sender::new(MonitorView::default()),
        }
    }

    /// Registers a callback for any change in any task's status.
    #[must_use]
    pub fn on_status_change(mut self, callback: impl FnMut(&[TaskInfo]) + Send + 'static) -> Self {
        self.on_status_change = Some(Box::new(callback));
        self
    }

    /// Registers a callback for changes in the set of running tasks.
    #[must_use]
    pub fn on_task_change(mut self, callback: impl FnMut(&[TaskInfo]) + Send + 'static) -> Self {
        self.on_task_change = Some(Box::new(callback));
        self
    }

    /// Registers a callback for failed updates.
    #[must_use]
    pub fn on_error(mut self, callback: impl FnMut(&Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Returns all tasks seen by the last successful update that changed
    /// anything, including pending and stopping tasks.
    #[must_use]
    pub fn all_tasks(&self) -> &[TaskInfo] {
        self.all_tasks.as_deref().unwrap_or_default()
    }

    /// Returns the tasks that are running and desired to be running.
    #[must_use]
    pub fn running_tasks(&self) -> &[TaskInfo] {
        self.running_tasks.as_deref().unwrap_or_default()
    }

    /// Returns the lifecycle state of the monitor.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Returns true if any task's desired status differs from its last
    /// status, once enough updates have succeeded since the last error.
    #[must_use]
    pub fn is_volatile(&self) -> bool {
        if self.updates_since_error < STABLE_UPDATE_THRESHOLD {
            return false;
        }

        self.all_tasks().iter().any(TaskInfo::is_transitioning)
    }

    /// Queries ECS for the latest tasks and returns true if the set of
    /// running tasks changed.
    ///
    /// Errors are reported to the error callback; the last known tasks are
    /// kept.
    pub async fn update(&mut self) -> bool {
        let tasks = match self.finder.tasks(&self.service).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!("failed to query tasks for {}: {e}", self.service);
                self.updates_since_error = 0;
                if let Some(on_error) = self.on_error.as_mut() {
                    on_error(&e);
                }
                return false;
            }
        };

        self.updates_since_error = self.updates_since_error.saturating_add(1);

        if self
            .all_tasks
            .as_deref()
            .is_some_and(|known| tasks_equal(known, &tasks))
        {
            return false;
        }

        let all: &[TaskInfo] = self.all_tasks.insert(tasks);
        if let Some(on_status_change) = self.on_status_change.as_mut() {
            on_status_change(all);
        }

        let running = running_tasks(all);
        let changed = !self
            .running_tasks
            .as_deref()
            .is_some_and(|known| tasks_equal(known, &running));

        if changed {
            tracing::debug!("{} running tasks for {}", running.len(), self.service);

            let running: &[TaskInfo] = self.running_tasks.insert(running);
            if let Some(on_task_change) = self.on_task_change.as_mut() {
                on_task_change(running);
            }
        }

        self.publish();
        changed
    }

    /// Starts polling for changes and returns a handle to the poll loop.
    ///
    /// The first update completes before this returns, so its callbacks
    /// have already run. There is one poll loop per monitor.
    pub async fn monitor(mut self) -> MonitorHandle {
        self.state = MonitorState::Polling;
        self.publish();
        self.update().await;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let view = self.view.subscribe();
        let task = tokio::spawn(self.poll_loop(cancel_rx));

        MonitorHandle {
            cancel: cancel_tx,
            task,
            view,
        }
    }

    fn next_interval(&self) -> Duration {
        if self.is_volatile() {
            self.volatile_poll_interval
        } else {
            self.poll_interval
        }
    }

    async fn poll_loop(mut self, mut cancel: oneshot::Receiver<()>) {
        tracing::debug!("monitoring tasks for {}", self.service);

        loop {
            let interval = self.next_interval();

            tokio::select! {
                biased;

                // A dropped handle counts as a cancellation.
                _ = &mut cancel => break,
                () = tokio::time::sleep(interval) => {
                    self.update().await;
                }
            }
        }

        self.state = MonitorState::Cancelled;
        self.publish();

        tracing::debug!("stopped monitoring tasks for {}", self.service);
    }

    fn publish(&self) {
        self.view.send_replace(MonitorView {
            state: self.state,
            all_tasks: self.all_tasks().to_vec(),
            running_tasks: self.running_tasks().to_vec(),
        });
    }
}

/// Handle to a running poll loop.
///
/// Dropping the handle stops the loop at its next wait.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
    view: watch::Receiver<MonitorView>,
}

impl MonitorHandle {
    /// Returns the monitor's current view.
    #[must_use]
    pub fn view(&self) -> MonitorView {
        self.view.borrow().clone()
    }

    /// Returns all known tasks.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<TaskInfo> {
        self.view.borrow().all_tasks.clone()
    }

    /// Returns the tasks that are running and desired to be running.
    #[must_use]
    pub fn running_tasks(&self) -> Vec<TaskInfo> {
        self.view.borrow().running_tasks.clone()
    }

    /// Returns the lifecycle state of the monitor.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.view.borrow().state
    }

    /// Stops the poll loop and waits for it to finish.
    ///
    /// An update that is already in flight completes first; no callbacks run
    /// after this returns.
    ///
    /// # Panics
    ///
    /// Resumes the panic if a callback panicked on the polling task.
    pub async fn cancel(self) -> MonitorView {
        let Self { cancel, task, view } = self;

        // The loop may already be gone.
        let _ = cancel.send(());

        if let Err(e) = task.await {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }

        view.borrow().clone()
    }
}
