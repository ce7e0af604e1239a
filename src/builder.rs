//! Snapshot build orchestration.
//!
//! [`ImageBuilder`] wires the create and snapshot steps into a pipeline, runs
//! it against a fresh state bag, and turns the result into an [`Artifact`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::artifact::Artifact;
use crate::cloud::CloudClient;
use crate::config::BuildConfig;
use crate::error::{BuildError, BuildFailure};
use crate::pipeline::Pipeline;
use crate::poller::{DEFAULT_POLL_INTERVAL, PollSettings};
use crate::state::BuildState;
use crate::steps::{CreateDropletStep, DropletSettings, SnapshotSettings, SnapshotStep};
use crate::ui::Ui;

/// Builds a droplet snapshot and distributes it to the configured regions.
pub struct ImageBuilder<C: ?Sized> {
    client: Arc<C>,
    ui: Arc<dyn Ui>,
    poll_interval: Duration,
    ssh_key_id: Option<u64>,
}

impl<C> ImageBuilder<C>
where
    C: CloudClient + ?Sized + 'static,
{
    /// Creates a builder.
    #[must_use]
    pub fn new(client: Arc<C>, ui: Arc<dyn Ui>) -> Self {
        Self {
            client,
            ui,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ssh_key_id: None,
        }
    }

    /// Overrides the polling interval used by every wait.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Supplies an SSH key id ahead of the configured one, for example a key
    /// registered for this build only.
    #[must_use]
    pub const fn with_ssh_key_id(mut self, ssh_key_id: u64) -> Self {
        self.ssh_key_id = Some(ssh_key_id);
        self
    }

    /// Runs the build.
    ///
    /// Droplet and snapshot names left unset in `config` are generated. The
    /// droplet is always removed before this returns, whether the build
    /// succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns [`BuildFailure`] carrying the halting [`BuildError`] and any
    /// teardown failures.
    pub async fn execute(&self, config: &BuildConfig) -> Result<Artifact, BuildFailure> {
        self.run(&config.clone().with_generated_names()).await
    }

    async fn run(&self, config: &BuildConfig) -> Result<Artifact, BuildFailure> {
        config.validate().map_err(|err| BuildFailure {
            cause: err.into(),
            teardown_failures: Vec::new(),
        })?;

        let mut state = BuildState::new(Arc::clone(&self.ui));
        if let Some(ssh_key_id) = self.ssh_key_id {
            state = state.with_ssh_key_id(ssh_key_id);
        }

        let mut pipeline = Pipeline::new()
            .step(CreateDropletStep::new(
                Arc::clone(&self.client),
                self.droplet_settings(config),
            ))
            .step(SnapshotStep::new(
                Arc::clone(&self.client),
                self.snapshot_settings(config),
            ));
        pipeline.run(&mut state).await;

        let metadata = state.metadata();
        let snapshot = state.snapshot().cloned();
        let (cause, teardown_failures) = state.into_failures();
        if let Some(cause) = cause {
            return Err(BuildFailure {
                cause,
                teardown_failures,
            });
        }
        let Some(snapshot) = snapshot else {
            return Err(BuildFailure {
                cause: BuildError::MissingState("snapshot"),
                teardown_failures,
            });
        };

        info!(image_id = snapshot.image_id, regions = ?snapshot.regions, "build finished");
        Ok(Artifact::new(
            snapshot.name,
            snapshot.image_id,
            snapshot.regions,
            metadata,
        ))
    }

    fn droplet_settings(&self, config: &BuildConfig) -> DropletSettings {
        DropletSettings {
            name: config.droplet_name().to_owned(),
            region: config.region.clone(),
            size: config.size.clone(),
            image: config.image.clone(),
            ssh_key_id: config.ssh_key_id,
            user_data: config.user_data.clone(),
            user_data_file: config.user_data_file.clone(),
            private_networking: config.private_networking,
            monitoring: config.monitoring,
            ipv6: config.ipv6,
            droplet_agent: config.droplet_agent,
            vpc_uuid: config.vpc_uuid.clone(),
            tags: config.tags.clone(),
            poll: self.poll(config.state_timeout()),
        }
    }

    fn snapshot_settings(&self, config: &BuildConfig) -> SnapshotSettings {
        SnapshotSettings {
            name: config.snapshot_name().to_owned(),
            tags: config.snapshot_tags.clone(),
            regions: config.snapshot_regions.clone(),
            wait_for_transfer: config.wait_snapshot_transfer,
            snapshot_poll: self.poll(config.snapshot_timeout()),
            transfer_poll: self.poll(config.transfer_timeout()),
        }
    }

    const fn poll(&self, timeout: Duration) -> PollSettings {
        PollSettings::with_timeout(timeout).interval(self.poll_interval)
    }
}
