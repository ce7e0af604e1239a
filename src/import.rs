//! Custom image import orchestration.
//!
//! An image file produced elsewhere is uploaded to object storage, imported
//! into the first configured region, and distributed to the rest.

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::cloud::CloudClient;
use crate::error::{BuildError, BuildFailure};
use crate::pipeline::Pipeline;
use crate::poller::{DEFAULT_POLL_INTERVAL, PollSettings};
use crate::state::BuildState;
use crate::steps::{ImportImageSettings, ImportImageStep, UploadStep};
use crate::storage::ObjectStore;
use crate::ui::Ui;

/// File suffixes the provider accepts for custom images.
pub const IMAGE_SUFFIXES: [&str; 9] = [
    "raw", "img", "qcow2", "vhdx", "vdi", "vmdk", "tar.bz2", "tar.xz", "tar.gz",
];

/// Distribution label used when none is given.
pub const DEFAULT_DISTRIBUTION: &str = "Unknown";

/// Default wait for the import and for each regional transfer.
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Inputs for an import.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportSettings {
    /// Name of the resulting image.
    pub name: String,
    /// Image description.
    pub description: String,
    /// Distribution label.
    pub distribution: String,
    /// Tags applied to the image.
    pub tags: Vec<String>,
    /// Regions the image must end up in; the first receives the import.
    pub regions: Vec<String>,
    /// Object key for the upload. Generated when absent.
    pub object_key: Option<String>,
    /// Leave the uploaded object in place afterwards.
    pub skip_clean: bool,
    /// Ceiling for the import and for each transfer.
    pub timeout: Duration,
}

impl ImportSettings {
    /// Settings with defaults for everything but the name and regions.
    #[must_use]
    pub fn new(name: impl Into<String>, regions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            distribution: DEFAULT_DISTRIBUTION.to_owned(),
            tags: Vec::new(),
            regions,
            object_key: None,
            skip_clean: false,
            timeout: DEFAULT_IMPORT_TIMEOUT,
        }
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.name.trim().is_empty() {
            return Err(BuildError::Import(String::from("image name must be set")));
        }
        if self.regions.is_empty() {
            return Err(BuildError::Import(String::from("image regions must be set")));
        }
        Ok(())
    }

    fn resolved_object_key(&self) -> String {
        self.object_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("dropsmith-import-{}", Uuid::new_v4().simple()))
    }
}

/// Picks the image file among build outputs.
///
/// A single file is used as-is. Otherwise the first file with a known disk
/// image suffix wins.
///
/// # Errors
///
/// Returns [`BuildError::Import`] when no files were given or none looks like
/// an image.
pub fn select_image_file(files: &[Utf8PathBuf]) -> Result<&Utf8Path, BuildError> {
    match files {
        [] => Err(BuildError::Import(String::from("no files were provided"))),
        [only] => Ok(only.as_path()),
        many => many
            .iter()
            .find(|path| {
                IMAGE_SUFFIXES
                    .iter()
                    .any(|suffix| path.as_str().ends_with(suffix))
            })
            .map(Utf8PathBuf::as_path)
            .ok_or_else(|| BuildError::Import(String::from("no valid image file found"))),
    }
}

/// Uploads, imports, and distributes a custom image.
pub struct ImportOrchestrator<C: ?Sized, S: ?Sized> {
    client: Arc<C>,
    store: Arc<S>,
    ui: Arc<dyn Ui>,
    poll_interval: Duration,
}

impl<C, S> ImportOrchestrator<C, S>
where
    C: CloudClient + ?Sized + 'static,
    S: ObjectStore + ?Sized + 'static,
{
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(client: Arc<C>, store: Arc<S>, ui: Arc<dyn Ui>) -> Self {
        Self {
            client,
            store,
            ui,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the import for the image found among `files`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildFailure`] when the inputs are unusable or any step
    /// halts. The uploaded object is removed unless `skip_clean` is set.
    pub async fn execute(
        &self,
        settings: &ImportSettings,
        files: &[Utf8PathBuf],
    ) -> Result<Artifact, BuildFailure> {
        let source = settings
            .validate()
            .and_then(|()| select_image_file(files))
            .map_err(|cause| BuildFailure {
                cause,
                teardown_failures: Vec::new(),
            })?;
        let key = settings.resolved_object_key();
        info!(%source, %key, "importing image");

        let mut state = BuildState::new(Arc::clone(&self.ui));
        let mut pipeline = Pipeline::new()
            .step(
                UploadStep::new(Arc::clone(&self.store), source.to_owned(), key)
                    .skip_clean(settings.skip_clean),
            )
            .step(ImportImageStep::new(
                Arc::clone(&self.client),
                ImportImageSettings {
                    name: settings.name.clone(),
                    description: settings.description.clone(),
                    distribution: settings.distribution.clone(),
                    tags: settings.tags.clone(),
                    regions: settings.regions.clone(),
                    poll: PollSettings::with_timeout(settings.timeout)
                        .interval(self.poll_interval),
                },
            ));
        pipeline.run(&mut state).await;

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
        Ok(Artifact::new(
            snapshot.name,
            snapshot.image_id,
            snapshot.regions,
            std::collections::BTreeMap::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn paths(names: &[&str]) -> Vec<Utf8PathBuf> {
        names.iter().map(Utf8PathBuf::from).collect()
    }

    #[rstest]
    #[case(&["out/anything.bin"], "out/anything.bin")]
    #[case(&["out/manifest.json", "out/disk.qcow2"], "out/disk.qcow2")]
    #[case(&["out/notes.txt", "out/disk.tar.gz", "out/disk.raw"], "out/disk.tar.gz")]
    fn selects_image_file(#[case] files: &[&str], #[case] expected: &str) {
        let candidates = paths(files);
        let selected = select_image_file(&candidates)
            .unwrap_or_else(|err| panic!("selection should succeed: {err}"));
        assert_eq!(selected, expected);
    }

    #[rstest]
    #[case(&[])]
    #[case(&["out/manifest.json", "out/notes.txt"])]
    fn rejects_missing_image(#[case] files: &[&str]) {
        let candidates = paths(files);
        assert!(matches!(
            select_image_file(&candidates),
            Err(BuildError::Import(_))
        ));
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = ImportSettings::new("custom", vec![String::from("nyc3")]);
        assert_eq!(settings.distribution, "Unknown");
        assert_eq!(settings.timeout, Duration::from_secs(1200));
        assert!(settings.resolved_object_key().starts_with("dropsmith-import-"));
    }

    #[test]
    fn explicit_object_key_is_kept() {
        let mut settings = ImportSettings::new("custom", vec![String::from("nyc3")]);
        settings.object_key = Some(String::from("imports/custom.img"));
        assert_eq!(settings.resolved_object_key(), "imports/custom.img");
    }
}
