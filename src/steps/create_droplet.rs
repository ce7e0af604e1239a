//! Creates the build droplet and waits for it to boot.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cloud::{CloudClient, DropletCreateRequest, ImageRef};
use crate::error::BuildError;
use crate::pipeline::{Step, StepAction, StepFuture};
use crate::poller::{CloudStatus, PollSettings, RemoteHandle, wait_for};
use crate::state::{BuildState, DropletRecord};
use crate::user_data::resolve_user_data;

use super::conclude;

/// Default wait for a new droplet to become active.
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(6 * 60);

/// Inputs for [`CreateDropletStep`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DropletSettings {
    /// Droplet name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Size slug.
    pub size: String,
    /// Base image id or slug.
    pub image: String,
    /// Configured SSH key id, added after any key supplied in the state.
    pub ssh_key_id: Option<u64>,
    /// Inline user data.
    pub user_data: Option<String>,
    /// Path to a user data file.
    pub user_data_file: Option<String>,
    /// Enable private networking.
    pub private_networking: bool,
    /// Enable the monitoring agent.
    pub monitoring: bool,
    /// Enable IPv6.
    pub ipv6: bool,
    /// Install the droplet agent; `None` keeps the provider default.
    pub droplet_agent: Option<bool>,
    /// VPC to join.
    pub vpc_uuid: Option<String>,
    /// Droplet tags.
    pub tags: Vec<String>,
    /// Polling for droplet readiness.
    pub poll: PollSettings,
}

/// Creates the droplet, publishes its record, and waits until it is active.
///
/// Cleanup deletes the droplet if its id was published.
#[derive(Debug)]
pub struct CreateDropletStep<C: ?Sized> {
    client: Arc<C>,
    settings: DropletSettings,
    destroyed: bool,
}

impl<C> CreateDropletStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    /// Creates the step.
    #[must_use]
    pub const fn new(client: Arc<C>, settings: DropletSettings) -> Self {
        Self {
            client,
            settings,
            destroyed: false,
        }
    }

    fn request(&self, state: &BuildState) -> Result<DropletCreateRequest, BuildError> {
        let settings = &self.settings;
        let user_data = resolve_user_data(
            settings.user_data.as_deref(),
            settings.user_data_file.as_deref(),
        )?;
        let ssh_keys = state.ssh_key_id().into_iter().chain(settings.ssh_key_id).collect();

        Ok(DropletCreateRequest {
            name: settings.name.clone(),
            region: settings.region.clone(),
            size: settings.size.clone(),
            image: ImageRef::parse(&settings.image),
            ssh_keys,
            private_networking: settings.private_networking,
            monitoring: settings.monitoring,
            with_droplet_agent: settings.droplet_agent,
            ipv6: settings.ipv6,
            user_data,
            tags: settings.tags.clone(),
            vpc_uuid: settings.vpc_uuid.clone(),
        })
    }

    async fn execute(&self, state: &mut BuildState) -> Result<(), BuildError> {
        let request = self.request(state)?;
        state.ui().say("Creating droplet...");
        debug!(name = %request.name, region = %request.region, image = %request.image, "creating droplet");

        let droplet = self
            .client
            .create_droplet(&request)
            .await
            .map_err(BuildError::Creation)?;
        state.set_droplet(DropletRecord {
            id: droplet.id,
            name: self.settings.name.clone(),
            size: self.settings.size.clone(),
            region: self.settings.region.clone(),
            source_image: self.settings.image.clone(),
        });
        info!(droplet_id = droplet.id, "droplet created");

        state.ui().say("Waiting for droplet to become active...");
        let accessor = CloudStatus::new(&*self.client);
        wait_for(
            &accessor,
            &RemoteHandle::droplet(droplet.id),
            "active",
            self.settings.poll,
        )
        .await
        .map_err(|err| BuildError::from_poll("droplet to become active", err))
    }

    async fn destroy(&mut self, state: &mut BuildState) {
        let Some(droplet_id) = state.droplet().map(|droplet| droplet.id) else {
            return;
        };
        if self.destroyed {
            return;
        }
        state.ui().say("Destroying droplet...");
        match self.client.delete_droplet(droplet_id).await {
            Ok(()) => self.destroyed = true,
            Err(source) => state.record_teardown_failure(BuildError::Teardown {
                resource: format!("droplet {droplet_id}"),
                source,
            }),
        }
    }
}

impl<C> Step for CreateDropletStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        "create droplet"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let outcome = self.execute(state).await;
            conclude(state, outcome)
        })
    }

    fn cleanup<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, ()> {
        Box::pin(self.destroy(state))
    }
}
