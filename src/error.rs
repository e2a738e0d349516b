//! Error types for task discovery.

/// Boxed error returned by the remote collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for discovery failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A list or describe call against a remote collection failed.
    #[error(
        "{operation} failed (cluster={cluster}, service={service}{}): {source}",
        id_context(.id.as_deref())
    )]
    RemoteQuery {
        /// The remote operation, e.g. `ecs describe tasks`.
        operation: &'static str,
        /// The cluster being queried.
        cluster: String,
        /// The service being resolved, or empty for cluster-wide calls.
        service: String,
        /// First identifier of the failed batch, or the page token of a
        /// failed listing page.
        id: Option<String>,
        /// The collaborator's error.
        #[source]
        source: BoxError,
    },

    /// A remote call succeeded but reported per-item failures.
    #[error("{operation} failure on {arn}: {reason}")]
    PartialFailure {
        /// The remote operation that reported the failure.
        operation: &'static str,
        /// Identifier of the first failed item.
        arn: String,
        /// Reason given for the first failed item.
        reason: String,
    },

    /// A task does not have exactly one container matching the service.
    #[error(
        "ambiguous, multi-container task, one container should match service name \
         (cluster={cluster}, service={service}, task={task}, containers={containers})"
    )]
    AmbiguousContainer {
        /// The cluster being queried.
        cluster: String,
        /// The service being resolved.
        service: String,
        /// ARN of the offending task.
        task: String,
        /// Number of containers the task runs.
        containers: usize,
    },
}

impl Error {
    pub(crate) fn remote(
        operation: &'static str,
        cluster: &str,
        service: &str,
        id: Option<&str>,
    ) -> impl FnOnce(BoxError) -> Self {
        move |source| Self::RemoteQuery {
            operation,
            cluster: cluster.to_string(),
            service: service.to_string(),
            id: id.map(str::to_string),
            source,
        }
    }
}

fn id_context(id: Option<&str>) -> String {
    id.map(|id| format!(", id={id}")).unwrap_or_default()
}
