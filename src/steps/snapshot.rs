//! Snapshots the build droplet and replicates the image.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cloud::{CloudClient, Image};
use crate::error::BuildError;
use crate::pipeline::{Step, StepAction, StepFuture};
use crate::poller::{CloudStatus, PollSettings, RemoteHandle, wait_for};
use crate::replicate::{ReplicationOptions, replicate};
use crate::state::{BuildState, SnapshotRecord};

use super::conclude;

/// Longest wait for the droplet lock to clear after a snapshot request.
pub const DROPLET_UNLOCK_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Inputs for [`SnapshotStep`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotSettings {
    /// Snapshot name.
    pub name: String,
    /// Existing tags applied to the snapshot.
    pub tags: Vec<String>,
    /// Extra regions to transfer the snapshot to.
    pub regions: Vec<String>,
    /// Wait for each transfer to finish.
    pub wait_for_transfer: bool,
    /// Polling for the snapshot action.
    pub snapshot_poll: PollSettings,
    /// Polling for each regional transfer.
    pub transfer_poll: PollSettings,
}

/// Snapshots the droplet, finds the resulting image, tags and replicates it.
#[derive(Debug)]
pub struct SnapshotStep<C: ?Sized> {
    client: Arc<C>,
    settings: SnapshotSettings,
}

impl<C> SnapshotStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    /// Creates the step.
    #[must_use]
    pub const fn new(client: Arc<C>, settings: SnapshotSettings) -> Self {
        Self { client, settings }
    }

    async fn execute(&self, state: &mut BuildState) -> Result<(), BuildError> {
        let droplet = state
            .droplet()
            .cloned()
            .ok_or(BuildError::MissingState("droplet"))?;
        let settings = &self.settings;
        let accessor = CloudStatus::new(&*self.client);

        state
            .ui()
            .say(&format!("Creating snapshot: {}", settings.name));
        let action = self
            .client
            .snapshot_droplet(droplet.id, &settings.name)
            .await
            .map_err(|err| BuildError::provider("snapshot droplet", err))?;

        state.ui().say("Waiting for snapshot to complete...");
        let unlock = PollSettings {
            timeout: DROPLET_UNLOCK_TIMEOUT,
            ..settings.snapshot_poll
        };
        wait_for(
            &accessor,
            &RemoteHandle::droplet_lock(droplet.id),
            "unlocked",
            unlock,
        )
        .await
        .map_err(|err| BuildError::from_poll("droplet to unlock", err))?;
        wait_for(
            &accessor,
            &RemoteHandle::droplet_action(droplet.id, action.id),
            "completed",
            settings.snapshot_poll,
        )
        .await
        .map_err(|err| BuildError::from_poll("snapshot to complete", err))?;

        state.ui().say("Looking up snapshot ID...");
        let snapshots = self
            .client
            .list_droplet_snapshots(droplet.id)
            .await
            .map_err(|err| BuildError::provider("list droplet snapshots", err))?;
        let image = single_snapshot(droplet.id, snapshots)?;
        info!(image_id = image.id, droplet_id = droplet.id, "snapshot found");

        for tag in &settings.tags {
            state
                .ui()
                .say(&format!("Adding tag {tag} to snapshot {}...", image.id));
            self.client
                .tag_image(tag, image.id)
                .await
                .map_err(|err| BuildError::provider("tag snapshot", err))?;
        }

        let tasks = replicate(
            Arc::clone(&self.client),
            Arc::clone(state.ui()),
            image.id,
            &droplet.region,
            &settings.regions,
            ReplicationOptions {
                wait_for_completion: settings.wait_for_transfer,
                poll: settings.transfer_poll,
            },
        )
        .await?;

        let mut regions = Vec::with_capacity(tasks.len() + 1);
        regions.push(droplet.region.clone());
        regions.extend(tasks.into_iter().map(|task| task.region));
        let name = if image.name.is_empty() {
            settings.name.clone()
        } else {
            image.name
        };
        state.set_snapshot(SnapshotRecord {
            image_id: image.id,
            name,
            regions,
        });
        Ok(())
    }
}

fn single_snapshot(droplet_id: u64, snapshots: Vec<Image>) -> Result<Image, BuildError> {
    let count = snapshots.len();
    let mut iter = snapshots.into_iter();
    match (iter.next(), count) {
        (Some(image), 1) => Ok(image),
        (None, _) => Err(BuildError::ImageNotFound { droplet_id }),
        (Some(_), _) => Err(BuildError::AmbiguousImage { droplet_id, count }),
    }
}

impl<C> Step for SnapshotStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let outcome = self.execute(state).await;
            conclude(state, outcome)
        })
    }
}
