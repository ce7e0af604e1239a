//! Pipeline steps for building and importing images.
//!
//! Each step does its work in a fallible `execute` and converts the error
//! into a halt, so failures reach the state bag exactly once.

mod create_droplet;
mod import_image;
mod snapshot;
mod upload;

pub use create_droplet::{CreateDropletStep, DEFAULT_STATE_TIMEOUT, DropletSettings};
pub use import_image::{ImportImageSettings, ImportImageStep};
pub use snapshot::{DROPLET_UNLOCK_TIMEOUT, SnapshotSettings, SnapshotStep};
pub use upload::UploadStep;

use crate::error::BuildError;
use crate::pipeline::StepAction;
use crate::state::BuildState;

fn conclude(state: &mut BuildState, outcome: Result<(), BuildError>) -> StepAction {
    match outcome {
        Ok(()) => StepAction::Continue,
        Err(err) => state.halt(err),
    }
}
