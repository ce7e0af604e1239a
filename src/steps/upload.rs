//! Uploads a local image file to object storage.

use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::debug;

use crate::error::BuildError;
use crate::pipeline::{Step, StepAction, StepFuture};
use crate::state::{BuildState, UploadRecord};
use crate::storage::ObjectStore;

use super::conclude;

/// Pushes the image file to the bucket and publishes its public URL.
///
/// Cleanup removes the object unless `skip_clean` was requested.
#[derive(Debug)]
pub struct UploadStep<S: ?Sized> {
    store: Arc<S>,
    source: Utf8PathBuf,
    key: String,
    skip_clean: bool,
    deleted: bool,
}

impl<S> UploadStep<S>
where
    S: ObjectStore + ?Sized,
{
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<S>, source: Utf8PathBuf, key: impl Into<String>) -> Self {
        Self {
            store,
            source,
            key: key.into(),
            skip_clean: false,
            deleted: false,
        }
    }

    /// Leaves the uploaded object in place after the build.
    #[must_use]
    pub const fn skip_clean(mut self, skip_clean: bool) -> Self {
        self.skip_clean = skip_clean;
        self
    }

    async fn execute(&self, state: &mut BuildState) -> Result<(), BuildError> {
        state
            .ui()
            .say(&format!("Uploading {} to {}...", self.source, self.key));
        self.store.upload(&self.source, &self.key).await?;
        let url = self.store.public_url(&self.key);
        debug!(key = %self.key, %url, "image uploaded");
        state.set_upload(UploadRecord {
            key: self.key.clone(),
            url,
        });
        Ok(())
    }

    async fn remove(&mut self, state: &mut BuildState) {
        if self.skip_clean || self.deleted {
            return;
        }
        let Some(key) = state.upload().map(|upload| upload.key.clone()) else {
            return;
        };
        state.ui().say(&format!("Deleting uploaded object {key}..."));
        match self.store.delete(&key).await {
            Ok(()) => self.deleted = true,
            Err(err) => state.record_teardown_failure(err.into()),
        }
    }
}

impl<S> Step for UploadStep<S>
where
    S: ObjectStore + ?Sized,
{
    fn name(&self) -> &'static str {
        "upload image"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let outcome = self.execute(state).await;
            conclude(state, outcome)
        })
    }

    fn cleanup<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, ()> {
        Box::pin(self.remove(state))
    }
}
