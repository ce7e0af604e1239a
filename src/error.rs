//! Build-level error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::cloud::CloudError;
use crate::config::ConfigError;
use crate::poller::PollError;
use crate::replicate::ReplicationError;
use crate::storage::StorageError;
use crate::user_data::UserDataError;

/// Failure that halts a build, or a teardown problem reported alongside one.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// User data could not be resolved.
    #[error(transparent)]
    UserData(#[from] UserDataError),
    /// The provider rejected the droplet create call.
    #[error("error creating droplet: {0}")]
    Creation(#[source] CloudError),
    /// A wait exceeded its deadline.
    #[error("timed out after {elapsed:?} waiting for {stage}")]
    PollTimeout {
        /// What was being waited for.
        stage: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// A remote resource reported an explicit error.
    #[error("{stage} failed: {message}")]
    PollDomainFailure {
        /// What was being waited for.
        stage: String,
        /// Message reported by the resource.
        message: String,
    },
    /// A provider call outside droplet creation failed.
    #[error("error during {operation}: {source}")]
    Provider {
        /// Operation being attempted.
        operation: String,
        /// Underlying client error.
        #[source]
        source: CloudError,
    },
    /// The droplet produced no snapshot.
    #[error("couldn't find the snapshot taken from droplet {droplet_id}")]
    ImageNotFound {
        /// Droplet the snapshot was taken from.
        droplet_id: u64,
    },
    /// The droplet produced more than one snapshot.
    #[error("expected one snapshot of droplet {droplet_id}, found {count}")]
    AmbiguousImage {
        /// Droplet the snapshot was taken from.
        droplet_id: u64,
        /// Number of snapshots found.
        count: usize,
    },
    /// Regional replication failed.
    #[error(transparent)]
    Replication(Box<ReplicationError>),
    /// A cleanup action failed.
    #[error("error destroying {resource}; please destroy it manually: {source}")]
    Teardown {
        /// Resource that could not be removed.
        resource: String,
        /// Underlying client error.
        #[source]
        source: CloudError,
    },
    /// Object storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A step ran before the state it depends on was published.
    #[error("build state is missing the {0} record")]
    MissingState(&'static str),
    /// Import inputs were unusable.
    #[error("import failed: {0}")]
    Import(String),
}

impl BuildError {
    /// Maps a poll failure observed while waiting for `stage`.
    #[must_use]
    pub fn from_poll(stage: &str, err: PollError) -> Self {
        match err {
            PollError::Timeout { elapsed, .. } => Self::PollTimeout {
                stage: stage.to_owned(),
                elapsed,
            },
            PollError::Domain { message, .. } => Self::PollDomainFailure {
                stage: stage.to_owned(),
                message,
            },
            PollError::Transport(source) => Self::Provider {
                operation: stage.to_owned(),
                source,
            },
        }
    }

    /// Wraps a provider failure for `operation`.
    #[must_use]
    pub fn provider(operation: &str, source: CloudError) -> Self {
        Self::Provider {
            operation: operation.to_owned(),
            source,
        }
    }

    /// Returns true when an operator might reasonably rerun the build.
    ///
    /// Only deadlines qualify, including a regional transfer that was accepted
    /// but did not finish in time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PollTimeout { .. } => true,
            Self::Replication(err) => err.is_timeout(),
            _ => false,
        }
    }
}

impl From<ReplicationError> for BuildError {
    fn from(err: ReplicationError) -> Self {
        Self::Replication(Box::new(err))
    }
}

/// Outcome of a failed build: the halting cause plus any teardown problems.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct BuildFailure {
    /// Error that halted the pipeline.
    pub cause: BuildError,
    /// Cleanup failures reported while unwinding.
    pub teardown_failures: Vec<BuildError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::RemoteHandle;
    use crate::replicate::RegionFailure;
    use rstest::rstest;

    fn api_error() -> CloudError {
        CloudError::Api {
            operation: String::from("get droplet"),
            status: 503,
            message: String::from("unavailable"),
        }
    }

    #[test]
    fn poll_timeout_keeps_elapsed_time() {
        let err = BuildError::from_poll(
            "snapshot",
            PollError::Timeout {
                handle: RemoteHandle::droplet_action(1, 2),
                target: String::from("completed"),
                elapsed: Duration::from_secs(90),
            },
        );
        assert!(matches!(
            err,
            BuildError::PollTimeout { ref stage, elapsed }
                if stage == "snapshot" && elapsed == Duration::from_secs(90)
        ));
    }

    #[test]
    fn poll_transport_becomes_provider_error() {
        let err = BuildError::from_poll("droplet readiness", PollError::Transport(api_error()));
        assert!(
            matches!(err, BuildError::Provider { ref operation, .. } if operation == "droplet readiness"),
            "unexpected error {err:?}"
        );
    }

    #[rstest]
    #[case(BuildError::PollTimeout { stage: String::from("x"), elapsed: Duration::from_secs(1) }, true)]
    #[case(BuildError::PollDomainFailure { stage: String::from("x"), message: String::from("y") }, false)]
    #[case(BuildError::ImageNotFound { droplet_id: 1 }, false)]
    #[case(BuildError::AmbiguousImage { droplet_id: 1, count: 2 }, false)]
    #[case(BuildError::Creation(api_error()), false)]
    fn only_timeouts_are_retryable(#[case] err: BuildError, #[case] expected: bool) {
        assert_eq!(err.is_retryable(), expected);
    }

    fn replication(source: RegionFailure) -> BuildError {
        ReplicationError {
            image_id: 7,
            region: String::from("ams3"),
            source,
        }
        .into()
    }

    #[test]
    fn transfer_timeout_is_retryable() {
        let err = replication(RegionFailure::Wait(PollError::Timeout {
            handle: RemoteHandle::image_action(7, 9),
            target: String::from("completed"),
            elapsed: Duration::from_secs(5),
        }));
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case(RegionFailure::Transfer(api_error()))]
    #[case(RegionFailure::Wait(PollError::Domain {
        handle: RemoteHandle::image_action(7, 9),
        message: String::from("errored"),
    }))]
    #[case(RegionFailure::Join(String::from("panicked")))]
    fn other_transfer_failures_are_not_retryable(#[case] source: RegionFailure) {
        assert!(!replication(source).is_retryable());
    }
}
