//! Ordered step pipeline with halt-and-unwind cleanup.
//!
//! Steps run in sequence against one [`BuildState`]. A step halts the build
//! by returning [`StepAction::Halt`] or by recording an error on the state.
//! Afterwards every step whose `run` was invoked gets its `cleanup` called,
//! most recent first. Steps that were never reached are left alone.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::state::BuildState;

/// Future returned by step hooks.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether the pipeline should carry on after a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Run the next step.
    Continue,
    /// Stop and unwind.
    Halt,
}

/// One unit of work in a build.
pub trait Step: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Performs the step.
    ///
    /// Failures are recorded through [`BuildState::halt`] rather than
    /// returned.
    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction>;

    /// Undoes whatever `run` created.
    ///
    /// Called even when `run` itself halted, so implementations must check
    /// which resources were actually published. Cleanup never halts and must
    /// tolerate being a no-op.
    fn cleanup<'a>(&'a mut self, _state: &'a mut BuildState) -> StepFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Sequence of steps executed against one state bag.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true when no steps were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step until one halts, then cleans up in reverse order.
    pub async fn run(&mut self, state: &mut BuildState) {
        let mut executed = 0_usize;
        for step in &mut self.steps {
            executed += 1;
            debug!(step = step.name(), "running step");
            let action = step.run(state).await;
            if action == StepAction::Halt || state.error().is_some() {
                debug!(step = step.name(), "pipeline halted");
                break;
            }
        }

        for step in self.steps.iter_mut().take(executed).rev() {
            debug!(step = step.name(), "cleaning up step");
            step.cleanup(state).await;
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|step| step.name()).collect();
        f.debug_struct("Pipeline").field("steps", &names).finish()
    }
}

#[cfg(test)]
mod tests;
