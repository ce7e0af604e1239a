//! Imports an uploaded image file as a custom image.

use std::sync::Arc;

use tracing::info;

use crate::cloud::{CloudClient, CustomImageRequest};
use crate::error::BuildError;
use crate::pipeline::{Step, StepAction, StepFuture};
use crate::poller::{CloudStatus, PollSettings, RemoteHandle, wait_for};
use crate::replicate::{ReplicationOptions, replicate};
use crate::state::{BuildState, SnapshotRecord};

use super::conclude;

/// Inputs for [`ImportImageStep`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportImageSettings {
    /// Name of the custom image.
    pub name: String,
    /// Image description.
    pub description: String,
    /// Distribution label.
    pub distribution: String,
    /// Tags applied to the image.
    pub tags: Vec<String>,
    /// Regions to make the image available in; the first receives the import.
    pub regions: Vec<String>,
    /// Polling for the import and each transfer.
    pub poll: PollSettings,
}

/// Creates the custom image, waits until it is available, then distributes it.
#[derive(Debug)]
pub struct ImportImageStep<C: ?Sized> {
    client: Arc<C>,
    settings: ImportImageSettings,
}

impl<C> ImportImageStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    /// Creates the step.
    #[must_use]
    pub const fn new(client: Arc<C>, settings: ImportImageSettings) -> Self {
        Self { client, settings }
    }

    async fn execute(&self, state: &mut BuildState) -> Result<(), BuildError> {
        let upload = state
            .upload()
            .cloned()
            .ok_or(BuildError::MissingState("upload"))?;
        let settings = &self.settings;
        let Some((first, rest)) = settings.regions.split_first() else {
            return Err(BuildError::Import(String::from(
                "at least one region is required",
            )));
        };

        state.ui().say(&format!(
            "Importing {} from {} into {first}...",
            settings.name, upload.url
        ));
        let image = self
            .client
            .create_custom_image(&CustomImageRequest {
                name: settings.name.clone(),
                url: upload.url.clone(),
                region: first.clone(),
                distribution: settings.distribution.clone(),
                description: settings.description.clone(),
                tags: settings.tags.clone(),
            })
            .await
            .map_err(|err| BuildError::provider("import custom image", err))?;

        state
            .ui()
            .say(&format!("Waiting for image {} to become available...", image.id));
        wait_for(
            &CloudStatus::new(&*self.client),
            &RemoteHandle::image(image.id),
            "available",
            settings.poll,
        )
        .await
        .map_err(|err| BuildError::from_poll("image import", err))?;
        info!(image_id = image.id, region = %first, "image imported");

        let tasks = replicate(
            Arc::clone(&self.client),
            Arc::clone(state.ui()),
            image.id,
            first,
            rest,
            ReplicationOptions {
                wait_for_completion: true,
                poll: settings.poll,
            },
        )
        .await?;

        let mut regions = vec![first.clone()];
        regions.extend(tasks.into_iter().map(|task| task.region));
        state.set_snapshot(SnapshotRecord {
            image_id: image.id,
            name: settings.name.clone(),
            regions,
        });
        Ok(())
    }
}

impl<C> Step for ImportImageStep<C>
where
    C: CloudClient + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        "import image"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let outcome = self.execute(state).await;
            conclude(state, outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::UploadRecord;
    use crate::test_support::{RecordingUi, ScriptedCloud};

    fn settings(regions: &[&str]) -> ImportImageSettings {
        ImportImageSettings {
            name: String::from("custom"),
            description: String::new(),
            distribution: String::from("Unknown"),
            tags: Vec::new(),
            regions: regions.iter().map(|region| (*region).to_owned()).collect(),
            poll: PollSettings::with_timeout(Duration::from_secs(1200)),
        }
    }

    fn uploaded_state() -> BuildState {
        let mut state = BuildState::new(Arc::new(RecordingUi::default()));
        state.set_upload(UploadRecord {
            key: String::from("imports/disk.img"),
            url: String::from("https://bucket.example/imports/disk.img"),
        });
        state
    }

    #[tokio::test(start_paused = true)]
    async fn imports_into_first_region_and_distributes() {
        let cloud = Arc::new(ScriptedCloud::new());
        let mut state = uploaded_state();
        let mut step = ImportImageStep::new(Arc::clone(&cloud), settings(&["nyc3", "ams3"]));

        let action = step.run(&mut state).await;

        assert_eq!(action, StepAction::Continue);
        let requests = cloud.custom_image_requests();
        let request = requests.first().expect("import request recorded");
        assert_eq!(request.region, "nyc3");
        assert_eq!(request.url, "https://bucket.example/imports/disk.img");
        assert_eq!(cloud.transfers(), [String::from("ams3")]);
        let snapshot = state.snapshot().expect("snapshot published");
        assert_eq!(snapshot.regions, ["nyc3", "ams3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn import_error_message_halts_as_domain_failure() {
        let cloud = Arc::new(ScriptedCloud::new());
        cloud.fail_imports_with("unsupported image format");
        let mut state = uploaded_state();
        let mut step = ImportImageStep::new(Arc::clone(&cloud), settings(&["nyc3", "ams3"]));

        let action = step.run(&mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(matches!(
            state.error(),
            Some(BuildError::PollDomainFailure { message, .. }) if message == "unsupported image format"
        ));
        assert!(cloud.transfers().is_empty());
    }

    #[tokio::test]
    async fn empty_region_list_is_rejected() {
        let cloud = Arc::new(ScriptedCloud::new());
        let mut state = uploaded_state();
        let mut step = ImportImageStep::new(Arc::clone(&cloud), settings(&[]));

        let action = step.run(&mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(matches!(state.error(), Some(BuildError::Import(_))));
    }
}
