//! Per-build state shared by pipeline steps.
//!
//! Each record slot is written by one step and stays visible to every later
//! step and to cleanup. Nothing clears a slot once it has been published.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::BuildError;
use crate::pipeline::StepAction;
use crate::ui::Ui;

/// Droplet created for the build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DropletRecord {
    /// Droplet id.
    pub id: u64,
    /// Droplet name.
    pub name: String,
    /// Size slug.
    pub size: String,
    /// Region slug.
    pub region: String,
    /// Image the droplet booted from.
    pub source_image: String,
}

/// Image produced by the build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotRecord {
    /// Image id.
    pub image_id: u64,
    /// Image name.
    pub name: String,
    /// Regions holding the image, source region first.
    pub regions: Vec<String>,
}

/// Object uploaded for an import.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadRecord {
    /// Object key in the bucket.
    pub key: String,
    /// Public URL the provider imports from.
    pub url: String,
}

/// Typed state bag for one build.
pub struct BuildState {
    ui: Arc<dyn Ui>,
    error: Option<BuildError>,
    teardown_failures: Vec<BuildError>,
    ssh_key_id: Option<u64>,
    droplet: Option<DropletRecord>,
    snapshot: Option<SnapshotRecord>,
    upload: Option<UploadRecord>,
}

impl BuildState {
    /// Creates an empty state reporting through `ui`.
    #[must_use]
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            ui,
            error: None,
            teardown_failures: Vec::new(),
            ssh_key_id: None,
            droplet: None,
            snapshot: None,
            upload: None,
        }
    }

    /// Seeds the externally supplied SSH key id.
    #[must_use]
    pub const fn with_ssh_key_id(mut self, ssh_key_id: u64) -> Self {
        self.ssh_key_id = Some(ssh_key_id);
        self
    }

    /// Reporter handle.
    #[must_use]
    pub const fn ui(&self) -> &Arc<dyn Ui> {
        &self.ui
    }

    /// Records the halting error and returns [`StepAction::Halt`].
    ///
    /// Only the first error is kept; a later one is logged and dropped.
    pub fn halt(&mut self, err: BuildError) -> StepAction {
        if self.error.is_some() {
            debug!(error = %err, "build already halted; keeping original cause");
            return StepAction::Halt;
        }
        self.ui.error(&err.to_string());
        self.error = Some(err);
        StepAction::Halt
    }

    /// Error that halted the build, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    /// Reports a cleanup failure without touching the halting error.
    pub fn record_teardown_failure(&mut self, err: BuildError) {
        warn!(error = %err, "teardown failed");
        self.ui.error(&err.to_string());
        self.teardown_failures.push(err);
    }

    /// Cleanup failures reported so far.
    #[must_use]
    pub fn teardown_failures(&self) -> &[BuildError] {
        &self.teardown_failures
    }

    /// SSH key id supplied before the build started.
    #[must_use]
    pub const fn ssh_key_id(&self) -> Option<u64> {
        self.ssh_key_id
    }

    /// Droplet record, once the create step has published it.
    #[must_use]
    pub const fn droplet(&self) -> Option<&DropletRecord> {
        self.droplet.as_ref()
    }

    /// Publishes the droplet record.
    pub fn set_droplet(&mut self, record: DropletRecord) {
        self.droplet = Some(record);
    }

    /// Snapshot record, once a snapshot or import step has published it.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&SnapshotRecord> {
        self.snapshot.as_ref()
    }

    /// Publishes the snapshot record.
    pub fn set_snapshot(&mut self, record: SnapshotRecord) {
        self.snapshot = Some(record);
    }

    /// Upload record, once the upload step has published it.
    #[must_use]
    pub const fn upload(&self) -> Option<&UploadRecord> {
        self.upload.as_ref()
    }

    /// Publishes the upload record.
    pub fn set_upload(&mut self, record: UploadRecord) {
        self.upload = Some(record);
    }

    /// Metadata describing how the image was built.
    ///
    /// Keys without a recorded value are omitted.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        let Some(droplet) = &self.droplet else {
            return metadata;
        };
        let entries = [
            ("source_image_id", &droplet.source_image),
            ("build_region", &droplet.region),
            ("droplet_size", &droplet.size),
            ("droplet_name", &droplet.name),
        ];
        for (key, value) in entries {
            if !value.is_empty() {
                metadata.insert(key.to_owned(), value.clone());
            }
        }
        metadata
    }

    /// Consumes the state, returning the halting error and teardown failures.
    #[must_use]
    pub fn into_failures(self) -> (Option<BuildError>, Vec<BuildError>) {
        (self.error, self.teardown_failures)
    }
}

impl std::fmt::Debug for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildState")
            .field("error", &self.error)
            .field("teardown_failures", &self.teardown_failures)
            .field("ssh_key_id", &self.ssh_key_id)
            .field("droplet", &self.droplet)
            .field("snapshot", &self.snapshot)
            .field("upload", &self.upload)
            .finish_non_exhaustive()
    }
}
