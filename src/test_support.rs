//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedCloud`] stands in for the provider API with programmable
//! failures and a call log, [`RecordingUi`] captures operator output, and
//! [`MemoryStore`] replaces the image bucket.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8Path;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::cloud::{
    Action, ActionStatus, CloudClient, CloudError, CloudFuture, CustomImageRequest, Droplet,
    DropletCreateRequest, Image, ImageKind,
};
use crate::storage::{ObjectStore, StorageError, StorageFuture};
use crate::ui::Ui;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn scripted_failure(operation: &str) -> CloudError {
    CloudError::Api {
        operation: operation.to_owned(),
        status: 500,
        message: String::from("scripted failure"),
    }
}

fn not_found(operation: &str, id: u64) -> CloudError {
    CloudError::Api {
        operation: operation.to_owned(),
        status: 404,
        message: format!("resource {id} not found"),
    }
}

/// Builds a snapshot image record for scripting snapshot listings.
#[must_use]
pub fn snapshot_image(id: u64, name: &str) -> Image {
    Image {
        id,
        name: name.to_owned(),
        regions: Vec::new(),
        status: String::from("available"),
        error_message: String::new(),
        created_at: String::new(),
    }
}

#[derive(Debug)]
struct Script {
    next_id: u64,
    calls: Vec<String>,
    failing: BTreeSet<String>,
    droplet_requests: Vec<DropletCreateRequest>,
    droplet_override: Option<Droplet>,
    droplet_statuses: VecDeque<String>,
    locked_polls: usize,
    snapshot_override: Option<Vec<Image>>,
    snapshots: Vec<(u64, Image)>,
    images: BTreeMap<u64, Image>,
    listed_images: Vec<Image>,
    image_action_override: Option<Action>,
    transfers: Vec<(u64, String)>,
    rejected_regions: BTreeSet<String>,
    errored_regions: BTreeSet<String>,
    stalled_regions: BTreeSet<String>,
    tags: Vec<(String, u64)>,
    deleted_images: Vec<u64>,
    custom_image_requests: Vec<CustomImageRequest>,
    import_error: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            next_id: 100,
            calls: Vec::new(),
            failing: BTreeSet::new(),
            droplet_requests: Vec::new(),
            droplet_override: None,
            droplet_statuses: VecDeque::new(),
            locked_polls: 0,
            snapshot_override: None,
            snapshots: Vec::new(),
            images: BTreeMap::new(),
            listed_images: Vec::new(),
            image_action_override: None,
            transfers: Vec::new(),
            rejected_regions: BTreeSet::new(),
            errored_regions: BTreeSet::new(),
            stalled_regions: BTreeSet::new(),
            tags: Vec::new(),
            deleted_images: Vec::new(),
            custom_image_requests: Vec::new(),
            import_error: None,
        }
    }
}

impl Script {
    const fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn enter(&mut self, operation: &str, call: String) -> Result<(), CloudError> {
        self.calls.push(call);
        if self.failing.contains(operation) {
            return Err(scripted_failure(operation));
        }
        Ok(())
    }

    fn droplet_name(&self) -> String {
        self.droplet_requests
            .last()
            .map(|request| request.name.clone())
            .unwrap_or_default()
    }
}

/// In-memory provider double with a call log and failure injection.
///
/// Unless scripted otherwise, droplets come up active and unlocked, snapshot
/// and transfer actions complete on their first poll, and imported images are
/// immediately available. Clones share the same script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCloud {
    /// Creates a cloud with default behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        locked(&self.script)
    }

    /// Every call made so far, formatted as `operation arg...`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    /// Number of calls made to `operation`.
    #[must_use]
    pub fn count_calls(&self, operation: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| call.split_whitespace().next() == Some(operation))
            .count()
    }

    /// Makes every call to `operation` fail with a 500 response.
    pub fn fail_operation(&self, operation: &str) {
        self.script().failing.insert(operation.to_owned());
    }

    /// Returns `statuses` from successive droplet polls before settling on
    /// `active`.
    pub fn queue_droplet_statuses<'s>(&self, statuses: impl IntoIterator<Item = &'s str>) {
        self.script()
            .droplet_statuses
            .extend(statuses.into_iter().map(str::to_owned));
    }

    /// Reports the droplet as locked for the next `polls` droplet reads.
    pub fn lock_droplet_for(&self, polls: usize) {
        self.script().locked_polls = polls;
    }

    /// Returns `droplet` verbatim whenever its id is fetched.
    pub fn set_droplet(&self, droplet: Droplet) {
        self.script().droplet_override = Some(droplet);
    }

    /// Replaces the snapshot listing for every droplet.
    pub fn set_snapshots(&self, snapshots: Vec<Image>) {
        self.script().snapshot_override = Some(snapshots);
    }

    /// Stores `image` so it can be fetched by id.
    pub fn set_image(&self, image: Image) {
        self.script().images.insert(image.id, image);
    }

    /// Sets the account-wide image listing.
    pub fn set_images(&self, images: Vec<Image>) {
        self.script().listed_images = images;
    }

    /// Returns `action` whenever an image action with its id is fetched.
    pub fn set_image_action(&self, action: Action) {
        self.script().image_action_override = Some(action);
    }

    /// Rejects transfer requests to `region`.
    pub fn fail_transfer_to(&self, region: &str) {
        self.script().rejected_regions.insert(region.to_owned());
    }

    /// Accepts transfers to `region` but reports the action as errored.
    pub fn error_transfer_in(&self, region: &str) {
        self.script().errored_regions.insert(region.to_owned());
    }

    /// Accepts transfers to `region` but never lets them finish.
    pub fn stall_transfer_in(&self, region: &str) {
        self.script().stalled_regions.insert(region.to_owned());
    }

    /// Marks imported images with `message` instead of making them available.
    pub fn fail_imports_with(&self, message: &str) {
        self.script().import_error = Some(message.to_owned());
    }

    /// Regions that accepted a transfer, in request order.
    #[must_use]
    pub fn transfers(&self) -> Vec<String> {
        self.script()
            .transfers
            .iter()
            .map(|(_, region)| region.clone())
            .collect()
    }

    /// Tags applied to images, as `(tag, image_id)`.
    #[must_use]
    pub fn tags(&self) -> Vec<(String, u64)> {
        self.script().tags.clone()
    }

    /// Ids of deleted images.
    #[must_use]
    pub fn deleted_images(&self) -> Vec<u64> {
        self.script().deleted_images.clone()
    }

    /// Droplet creation requests received.
    #[must_use]
    pub fn droplet_requests(&self) -> Vec<DropletCreateRequest> {
        self.script().droplet_requests.clone()
    }

    /// Custom image import requests received.
    #[must_use]
    pub fn custom_image_requests(&self) -> Vec<CustomImageRequest> {
        self.script().custom_image_requests.clone()
    }

    fn create_droplet_now(&self, request: &DropletCreateRequest) -> Result<Droplet, CloudError> {
        let mut script = self.script();
        script.enter("create_droplet", format!("create_droplet {}", request.name))?;
        script.droplet_requests.push(request.clone());
        Ok(Droplet {
            id: script.allocate_id(),
            name: request.name.clone(),
            status: String::from("new"),
            locked: false,
        })
    }

    fn get_droplet_now(&self, droplet_id: u64) -> Result<Droplet, CloudError> {
        let mut script = self.script();
        script.enter("get_droplet", format!("get_droplet {droplet_id}"))?;
        if let Some(droplet) = script.droplet_override.clone()
            && droplet.id == droplet_id
        {
            return Ok(droplet);
        }
        let status = script
            .droplet_statuses
            .pop_front()
            .unwrap_or_else(|| String::from("active"));
        let is_locked = script.locked_polls > 0;
        script.locked_polls = script.locked_polls.saturating_sub(1);
        Ok(Droplet {
            id: droplet_id,
            name: script.droplet_name(),
            status,
            locked: is_locked,
        })
    }

    fn snapshot_droplet_now(&self, droplet_id: u64, name: &str) -> Result<Action, CloudError> {
        let mut script = self.script();
        script.enter(
            "snapshot_droplet",
            format!("snapshot_droplet {droplet_id} {name}"),
        )?;
        let image_id = script.allocate_id();
        script
            .snapshots
            .push((droplet_id, snapshot_image(image_id, name)));
        Ok(Action {
            id: script.allocate_id(),
            status: ActionStatus::InProgress,
            kind: String::from("snapshot"),
            region_slug: None,
        })
    }

    fn get_droplet_action_now(&self, droplet_id: u64, action_id: u64) -> Result<Action, CloudError> {
        let mut script = self.script();
        script.enter(
            "get_droplet_action",
            format!("get_droplet_action {droplet_id} {action_id}"),
        )?;
        Ok(Action {
            id: action_id,
            status: ActionStatus::Completed,
            kind: String::from("snapshot"),
            region_slug: None,
        })
    }

    fn list_droplet_snapshots_now(&self, droplet_id: u64) -> Result<Vec<Image>, CloudError> {
        let mut script = self.script();
        script.enter(
            "list_droplet_snapshots",
            format!("list_droplet_snapshots {droplet_id}"),
        )?;
        if let Some(snapshots) = &script.snapshot_override {
            return Ok(snapshots.clone());
        }
        Ok(script
            .snapshots
            .iter()
            .filter(|(owner, _)| *owner == droplet_id)
            .map(|(_, image)| image.clone())
            .collect())
    }

    fn get_image_now(&self, image_id: u64) -> Result<Image, CloudError> {
        let mut script = self.script();
        script.enter("get_image", format!("get_image {image_id}"))?;
        script
            .images
            .get(&image_id)
            .cloned()
            .ok_or_else(|| not_found("get_image", image_id))
    }

    fn list_images_now(&self, kind: Option<ImageKind>) -> Result<Vec<Image>, CloudError> {
        let mut script = self.script();
        let filter = kind.map_or("all", ImageKind::as_str);
        script.enter("list_images", format!("list_images {filter}"))?;
        Ok(script.listed_images.clone())
    }

    fn create_custom_image_now(&self, request: &CustomImageRequest) -> Result<Image, CloudError> {
        let mut script = self.script();
        script.enter(
            "create_custom_image",
            format!("create_custom_image {} {}", request.name, request.region),
        )?;
        script.custom_image_requests.push(request.clone());
        let image_id = script.allocate_id();
        let (status, error_message) = match script.import_error.clone() {
            Some(message) => (String::from("pending"), message),
            None => (String::from("available"), String::new()),
        };
        script.images.insert(
            image_id,
            Image {
                id: image_id,
                name: request.name.clone(),
                regions: vec![request.region.clone()],
                status,
                error_message,
                created_at: String::new(),
            },
        );
        Ok(Image {
            id: image_id,
            name: request.name.clone(),
            regions: Vec::new(),
            status: String::from("new"),
            error_message: String::new(),
            created_at: String::new(),
        })
    }

    fn delete_image_now(&self, image_id: u64) -> Result<(), CloudError> {
        let mut script = self.script();
        script.enter("delete_image", format!("delete_image {image_id}"))?;
        script.deleted_images.push(image_id);
        script.images.remove(&image_id);
        Ok(())
    }

    fn transfer_image_now(&self, image_id: u64, region: &str) -> Result<Action, CloudError> {
        let mut script = self.script();
        script.enter(
            "transfer_image",
            format!("transfer_image {image_id} {region}"),
        )?;
        if script.rejected_regions.contains(region) {
            return Err(CloudError::Api {
                operation: String::from("transfer_image"),
                status: 422,
                message: format!("region {region} is not available"),
            });
        }
        let action_id = script.allocate_id();
        script.transfers.push((action_id, region.to_owned()));
        Ok(Action {
            id: action_id,
            status: ActionStatus::InProgress,
            kind: String::from("transfer"),
            region_slug: Some(region.to_owned()),
        })
    }

    fn get_image_action_now(&self, image_id: u64, action_id: u64) -> Result<Action, CloudError> {
        let mut script = self.script();
        script.enter(
            "get_image_action",
            format!("get_image_action {image_id} {action_id}"),
        )?;
        if let Some(action) = script.image_action_override.clone()
            && action.id == action_id
        {
            return Ok(action);
        }
        let region = script
            .transfers
            .iter()
            .find(|(id, _)| *id == action_id)
            .map(|(_, region)| region.clone())
            .ok_or_else(|| not_found("get_image_action", action_id))?;
        let status = if script.stalled_regions.contains(&region) {
            ActionStatus::InProgress
        } else if script.errored_regions.contains(&region) {
            ActionStatus::Errored
        } else {
            ActionStatus::Completed
        };
        Ok(Action {
            id: action_id,
            status,
            kind: String::from("transfer"),
            region_slug: Some(region),
        })
    }

    fn tag_image_now(&self, tag: &str, image_id: u64) -> Result<(), CloudError> {
        let mut script = self.script();
        script.enter("tag_image", format!("tag_image {tag} {image_id}"))?;
        script.tags.push((tag.to_owned(), image_id));
        Ok(())
    }
}

impl CloudClient for ScriptedCloud {
    fn create_droplet<'a>(
        &'a self,
        request: &'a DropletCreateRequest,
    ) -> CloudFuture<'a, Droplet> {
        Box::pin(ready(self.create_droplet_now(request)))
    }

    fn get_droplet(&self, droplet_id: u64) -> CloudFuture<'_, Droplet> {
        Box::pin(ready(self.get_droplet_now(droplet_id)))
    }

    fn delete_droplet(&self, droplet_id: u64) -> CloudFuture<'_, ()> {
        let outcome = self
            .script()
            .enter("delete_droplet", format!("delete_droplet {droplet_id}"));
        Box::pin(ready(outcome))
    }

    fn snapshot_droplet<'a>(&'a self, droplet_id: u64, name: &'a str) -> CloudFuture<'a, Action> {
        Box::pin(ready(self.snapshot_droplet_now(droplet_id, name)))
    }

    fn get_droplet_action(&self, droplet_id: u64, action_id: u64) -> CloudFuture<'_, Action> {
        Box::pin(ready(self.get_droplet_action_now(droplet_id, action_id)))
    }

    fn list_droplet_snapshots(&self, droplet_id: u64) -> CloudFuture<'_, Vec<Image>> {
        Box::pin(ready(self.list_droplet_snapshots_now(droplet_id)))
    }

    fn get_image(&self, image_id: u64) -> CloudFuture<'_, Image> {
        Box::pin(ready(self.get_image_now(image_id)))
    }

    fn list_images(&self, kind: Option<ImageKind>) -> CloudFuture<'_, Vec<Image>> {
        Box::pin(ready(self.list_images_now(kind)))
    }

    fn create_custom_image<'a>(
        &'a self,
        request: &'a CustomImageRequest,
    ) -> CloudFuture<'a, Image> {
        Box::pin(ready(self.create_custom_image_now(request)))
    }

    fn delete_image(&self, image_id: u64) -> CloudFuture<'_, ()> {
        Box::pin(ready(self.delete_image_now(image_id)))
    }

    fn transfer_image<'a>(&'a self, image_id: u64, region: &'a str) -> CloudFuture<'a, Action> {
        Box::pin(ready(self.transfer_image_now(image_id, region)))
    }

    fn get_image_action(&self, image_id: u64, action_id: u64) -> CloudFuture<'_, Action> {
        Box::pin(ready(self.get_image_action_now(image_id, action_id)))
    }

    fn tag_image<'a>(&'a self, tag: &'a str, image_id: u64) -> CloudFuture<'a, ()> {
        Box::pin(ready(self.tag_image_now(tag, image_id)))
    }
}

/// Captures operator output for assertions.
#[derive(Debug, Default)]
pub struct RecordingUi {
    says: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingUi {
    /// Lines passed to [`Ui::say`].
    #[must_use]
    pub fn says(&self) -> Vec<String> {
        locked(&self.says).clone()
    }

    /// Lines passed to [`Ui::message`].
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        locked(&self.messages).clone()
    }

    /// Lines passed to [`Ui::error`].
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        locked(&self.errors).clone()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        locked(&self.says).push(message.to_owned());
    }

    fn message(&self, message: &str) {
        locked(&self.messages).push(message.to_owned());
    }

    fn error(&self, message: &str) {
        locked(&self.errors).push(message.to_owned());
    }
}

#[derive(Debug, Default)]
struct Bucket {
    uploaded: Vec<String>,
    deleted: Vec<String>,
    reject_uploads: bool,
}

/// Object store that keeps keys in memory instead of uploading anything.
#[derive(Debug)]
pub struct MemoryStore {
    base_url: String,
    bucket: Mutex<Bucket>,
}

impl MemoryStore {
    /// Creates a store whose public URLs start with `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            bucket: Mutex::new(Bucket::default()),
        }
    }

    /// Makes every upload fail.
    pub fn fail_uploads(&self) {
        locked(&self.bucket).reject_uploads = true;
    }

    /// Keys uploaded so far.
    #[must_use]
    pub fn uploaded(&self) -> Vec<String> {
        locked(&self.bucket).uploaded.clone()
    }

    /// Keys deleted so far.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        locked(&self.bucket).deleted.clone()
    }

    fn upload_now(&self, path: &Utf8Path, key: &str) -> Result<(), StorageError> {
        let mut bucket = locked(&self.bucket);
        if bucket.reject_uploads {
            return Err(StorageError::Upload {
                key: key.to_owned(),
                message: format!("scripted failure uploading {path}"),
            });
        }
        bucket.uploaded.push(key.to_owned());
        Ok(())
    }

    fn delete_now(&self, key: &str) {
        locked(&self.bucket).deleted.push(key.to_owned());
    }
}

impl ObjectStore for MemoryStore {
    fn upload<'a>(&'a self, path: &'a Utf8Path, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(ready(self.upload_now(path, key)))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        self.delete_now(key);
        Box::pin(ready(Ok(())))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and clears environment variables while holding a global mutex.
    ///
    /// Pairs with a `None` value are removed for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
