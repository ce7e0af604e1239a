//! Remote action poller.
//!
//! [`wait_for`] races a fixed-interval status loop against a deadline timer.
//! Whichever finishes first decides the outcome and the other future is
//! dropped, so nothing keeps polling once the call has returned.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::cloud::{ActionStatus, CloudClient, CloudError, CloudFuture};

/// Interval used between status queries unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Kind of remote resource being observed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// Droplet lifecycle status (`new`, `active`, ...).
    Droplet,
    /// Droplet lock flag reported as `locked` or `unlocked`.
    DropletLock,
    /// Action started on a droplet.
    DropletAction,
    /// Action started on an image.
    ImageAction,
    /// Custom image import status.
    Image,
}

impl ResourceKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Droplet => "droplet",
            Self::DropletLock => "droplet lock",
            Self::DropletAction => "droplet action",
            Self::ImageAction => "image action",
            Self::Image => "image",
        }
    }
}

/// Identifies the resource (and optionally the action) being polled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteHandle {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Droplet or image id.
    pub resource_id: u64,
    /// Action id for the action kinds.
    pub action_id: Option<u64>,
}

impl RemoteHandle {
    /// Handle for a droplet's lifecycle status.
    #[must_use]
    pub const fn droplet(droplet_id: u64) -> Self {
        Self {
            kind: ResourceKind::Droplet,
            resource_id: droplet_id,
            action_id: None,
        }
    }

    /// Handle for a droplet's lock flag.
    #[must_use]
    pub const fn droplet_lock(droplet_id: u64) -> Self {
        Self {
            kind: ResourceKind::DropletLock,
            resource_id: droplet_id,
            action_id: None,
        }
    }

    /// Handle for an action running against a droplet.
    #[must_use]
    pub const fn droplet_action(droplet_id: u64, action_id: u64) -> Self {
        Self {
            kind: ResourceKind::DropletAction,
            resource_id: droplet_id,
            action_id: Some(action_id),
        }
    }

    /// Handle for an action running against an image.
    #[must_use]
    pub const fn image_action(image_id: u64, action_id: u64) -> Self {
        Self {
            kind: ResourceKind::ImageAction,
            resource_id: image_id,
            action_id: Some(action_id),
        }
    }

    /// Handle for an image's import status.
    #[must_use]
    pub const fn image(image_id: u64) -> Self {
        Self {
            kind: ResourceKind::Image,
            resource_id: image_id,
            action_id: None,
        }
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action_id {
            Some(action_id) => write!(
                f,
                "{} {} on {}",
                self.kind.label(),
                action_id,
                self.resource_id
            ),
            None => write!(f, "{} {}", self.kind.label(), self.resource_id),
        }
    }
}

/// State observed on one poll.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceStatus {
    /// Current state string.
    pub state: String,
    /// Terminal error reported by the resource, if any.
    pub error_message: Option<String>,
}

impl ResourceStatus {
    /// Status without an error.
    #[must_use]
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            error_message: None,
        }
    }

    /// Status carrying a terminal error.
    #[must_use]
    pub fn failed(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            error_message: Some(message.into()),
        }
    }
}

/// Reads the current status of a remote resource.
pub trait StatusAccessor: Send + Sync {
    /// Queries the resource once.
    fn status<'a>(&'a self, handle: &'a RemoteHandle) -> CloudFuture<'a, ResourceStatus>;
}

/// Adapts a [`CloudClient`] into a [`StatusAccessor`].
#[derive(Debug)]
pub struct CloudStatus<'c, C: ?Sized> {
    client: &'c C,
}

impl<'c, C: ?Sized> CloudStatus<'c, C> {
    /// Wraps a client reference.
    #[must_use]
    pub const fn new(client: &'c C) -> Self {
        Self { client }
    }
}

impl<C> CloudStatus<'_, C>
where
    C: CloudClient + ?Sized,
{
    async fn fetch(&self, handle: &RemoteHandle) -> Result<ResourceStatus, CloudError> {
        let status = match (handle.kind, handle.action_id) {
            (ResourceKind::Droplet, _) => {
                let droplet = self.client.get_droplet(handle.resource_id).await?;
                ResourceStatus::state(droplet.status)
            }
            (ResourceKind::DropletLock, _) => {
                let droplet = self.client.get_droplet(handle.resource_id).await?;
                ResourceStatus::state(if droplet.locked { "locked" } else { "unlocked" })
            }
            (ResourceKind::DropletAction, Some(action_id)) => {
                let action = self
                    .client
                    .get_droplet_action(handle.resource_id, action_id)
                    .await?;
                action_status(action.id, action.status)
            }
            (ResourceKind::ImageAction, Some(action_id)) => {
                let action = self
                    .client
                    .get_image_action(handle.resource_id, action_id)
                    .await?;
                action_status(action.id, action.status)
            }
            (ResourceKind::Image, _) => {
                let image = self.client.get_image(handle.resource_id).await?;
                if image.error_message.is_empty() {
                    ResourceStatus::state(image.status)
                } else {
                    ResourceStatus::failed(image.status, image.error_message)
                }
            }
            (ResourceKind::DropletAction | ResourceKind::ImageAction, None) => {
                ResourceStatus::failed("unknown", format!("{handle} has no action id"))
            }
        };
        Ok(status)
    }
}

impl<C> StatusAccessor for CloudStatus<'_, C>
where
    C: CloudClient + ?Sized,
{
    fn status<'a>(&'a self, handle: &'a RemoteHandle) -> CloudFuture<'a, ResourceStatus> {
        Box::pin(self.fetch(handle))
    }
}

fn action_status(action_id: u64, status: ActionStatus) -> ResourceStatus {
    match status {
        ActionStatus::Errored => ResourceStatus::failed(
            status.as_str(),
            format!("action {action_id} finished with status errored"),
        ),
        other => ResourceStatus::state(other.as_str()),
    }
}

/// Cadence and ceiling for one [`wait_for`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Delay between status queries.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl PollSettings {
    /// Settings with the default interval and the given timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout,
        }
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Failures raised by [`wait_for`].
#[derive(Debug, Error)]
pub enum PollError {
    /// The resource reported a terminal error.
    #[error("{handle} failed: {message}")]
    Domain {
        /// Resource being polled.
        handle: RemoteHandle,
        /// Message reported by the resource.
        message: String,
    },
    /// The deadline passed before the target state was observed.
    #[error("timed out after {elapsed:?} waiting for {handle} to become {target}")]
    Timeout {
        /// Resource being polled.
        handle: RemoteHandle,
        /// State that was awaited.
        target: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The status query itself failed.
    #[error(transparent)]
    Transport(#[from] CloudError),
}

/// Blocks until `handle` reports `target`, a terminal error, or the timeout.
///
/// A reported error message wins over the target state observed on the same
/// poll. When the deadline and a poll become ready together the deadline wins.
///
/// # Errors
///
/// Returns [`PollError::Domain`] when the resource reports an error,
/// [`PollError::Timeout`] once `settings.timeout` has elapsed, and
/// [`PollError::Transport`] when a status query fails.
pub async fn wait_for<A>(
    accessor: &A,
    handle: &RemoteHandle,
    target: &str,
    settings: PollSettings,
) -> Result<(), PollError>
where
    A: StatusAccessor + ?Sized,
{
    let started = Instant::now();
    tokio::select! {
        biased;
        () = sleep(settings.timeout) => Err(PollError::Timeout {
            handle: handle.clone(),
            target: target.to_owned(),
            elapsed: started.elapsed(),
        }),
        result = poll_until(accessor, handle, target, settings.interval) => result,
    }
}

async fn poll_until<A>(
    accessor: &A,
    handle: &RemoteHandle,
    target: &str,
    interval: Duration,
) -> Result<(), PollError>
where
    A: StatusAccessor + ?Sized,
{
    loop {
        let status = accessor.status(handle).await?;
        if let Some(message) = status.error_message.filter(|msg| !msg.is_empty()) {
            return Err(PollError::Domain {
                handle: handle.clone(),
                message,
            });
        }
        if status.state == target {
            return Ok(());
        }
        debug!(%handle, state = %status.state, wanted = target, "resource not ready");
        sleep(interval).await;
    }
}
