//! Concurrent region replicator.
//!
//! One image is transferred to every planned region at once. All regional
//! tasks live in a single [`JoinSet`]: the first failure aborts the rest and
//! the set is drained before [`replicate`] returns, so no task outlives the
//! call.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::cloud::{CloudClient, CloudError};
use crate::poller::{CloudStatus, PollError, PollSettings, RemoteHandle, wait_for};
use crate::ui::Ui;

/// Progress of one regional transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    /// Not yet dispatched.
    Pending,
    /// Dispatched; the provider is still transferring.
    InProgress,
    /// The transfer action completed.
    Completed,
    /// The transfer failed with the given reason.
    Failed(String),
}

/// Transfer of one image to one region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicationTask {
    /// Destination region.
    pub region: String,
    /// Image being transferred.
    pub image_id: u64,
    /// Current outcome.
    pub outcome: TaskOutcome,
}

/// Controls whether regional tasks wait for the transfer to finish.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReplicationOptions {
    /// Poll each transfer action until it completes.
    pub wait_for_completion: bool,
    /// Polling cadence and per-region ceiling.
    pub poll: PollSettings,
}

/// Why a single region failed.
#[derive(Debug, Error)]
pub enum RegionFailure {
    /// The provider rejected the transfer request.
    #[error("transfer request failed: {0}")]
    Transfer(#[source] CloudError),
    /// The transfer was accepted but never completed.
    #[error("transfer did not complete: {0}")]
    Wait(#[source] PollError),
    /// The regional task panicked.
    #[error("transfer task stopped unexpectedly: {0}")]
    Join(String),
}

/// First regional failure observed by [`replicate`].
#[derive(Debug, Error)]
#[error("replicating image {image_id} to {region} failed: {source}")]
pub struct ReplicationError {
    /// Image being replicated.
    pub image_id: u64,
    /// Region whose task failed first.
    pub region: String,
    /// Underlying failure.
    #[source]
    pub source: RegionFailure,
}

impl ReplicationError {
    /// True when the transfer was accepted but did not finish before its
    /// deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.source, RegionFailure::Wait(PollError::Timeout { .. }))
    }
}

/// Returns the regions to replicate to.
///
/// The source region and repeated targets are dropped; the first occurrence
/// of each region keeps its position.
#[must_use]
pub fn plan_regions(source_region: &str, target_regions: &[String]) -> Vec<String> {
    let mut planned: Vec<String> = Vec::with_capacity(target_regions.len());
    for region in target_regions {
        if region == source_region || planned.contains(region) {
            continue;
        }
        planned.push(region.clone());
    }
    planned
}

/// Transfers `image_id` from `source_region` to every planned target region.
///
/// All transfers are dispatched before any result is awaited. When
/// `options.wait_for_completion` is false each task ends once its transfer
/// request has been accepted and no polling happens.
///
/// # Errors
///
/// Returns the first [`ReplicationError`] observed. Later failures are logged
/// and discarded. Transfers the provider already accepted are not rolled
/// back.
pub async fn replicate<C>(
    client: Arc<C>,
    ui: Arc<dyn Ui>,
    image_id: u64,
    source_region: &str,
    target_regions: &[String],
    options: ReplicationOptions,
) -> Result<Vec<ReplicationTask>, ReplicationError>
where
    C: CloudClient + ?Sized + 'static,
{
    let mut tasks: Vec<ReplicationTask> = plan_regions(source_region, target_regions)
        .into_iter()
        .map(|region| ReplicationTask {
            region,
            image_id,
            outcome: TaskOutcome::Pending,
        })
        .collect();

    let mut set = JoinSet::new();
    let mut regions_by_task: HashMap<task::Id, String> = HashMap::with_capacity(tasks.len());
    for (index, task) in tasks.iter_mut().enumerate() {
        let task_client = Arc::clone(&client);
        let task_ui = Arc::clone(&ui);
        let region = task.region.clone();
        task.outcome = TaskOutcome::InProgress;
        let handle = set.spawn(async move {
            let result =
                transfer_to_region(&*task_client, &*task_ui, image_id, &region, options).await;
            (index, result)
        });
        regions_by_task.insert(handle.id(), task.region.clone());
    }

    let mut first_error: Option<ReplicationError> = None;
    while let Some(joined) = set.join_next().await {
        let (index, result) = match joined {
            Ok(pair) => pair,
            Err(err) if err.is_cancelled() => continue,
            Err(err) => {
                let region = regions_by_task
                    .remove(&err.id())
                    .unwrap_or_else(|| String::from("unknown"));
                let failure = ReplicationError {
                    image_id,
                    region,
                    source: RegionFailure::Join(err.to_string()),
                };
                record_failure(&mut first_error, &mut set, failure);
                continue;
            }
        };
        let Some(task) = tasks.get_mut(index) else {
            continue;
        };
        match result {
            Ok(outcome) => task.outcome = outcome,
            Err(source) => {
                task.outcome = TaskOutcome::Failed(source.to_string());
                let failure = ReplicationError {
                    image_id,
                    region: task.region.clone(),
                    source,
                };
                record_failure(&mut first_error, &mut set, failure);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(tasks),
    }
}

fn record_failure<T: 'static>(
    first_error: &mut Option<ReplicationError>,
    set: &mut JoinSet<T>,
    failure: ReplicationError,
) {
    if first_error.is_some() {
        debug!(region = %failure.region, error = %failure, "discarding later replication failure");
        return;
    }
    warn!(region = %failure.region, error = %failure, "replication failed; aborting remaining transfers");
    set.abort_all();
    *first_error = Some(failure);
}

async fn transfer_to_region<C>(
    client: &C,
    ui: &dyn Ui,
    image_id: u64,
    region: &str,
    options: ReplicationOptions,
) -> Result<TaskOutcome, RegionFailure>
where
    C: CloudClient + ?Sized,
{
    ui.say(&format!(
        "Transferring snapshot (ID: {image_id}) to {region}..."
    ));
    let action = client
        .transfer_image(image_id, region)
        .await
        .map_err(RegionFailure::Transfer)?;

    if !options.wait_for_completion {
        ui.message(&format!(
            "Transfer to {region} requested; not waiting for it to finish."
        ));
        return Ok(TaskOutcome::InProgress);
    }

    let handle = RemoteHandle::image_action(image_id, action.id);
    wait_for(&CloudStatus::new(client), &handle, "completed", options.poll)
        .await
        .map_err(RegionFailure::Wait)?;
    ui.say(&format!("Transfer to {region} is complete."));
    Ok(TaskOutcome::Completed)
}
