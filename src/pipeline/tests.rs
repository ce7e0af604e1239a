//! Tests for step ordering and unwind behaviour.

use std::sync::{Arc, Mutex};

use rstest::rstest;

use super::*;
use crate::error::BuildError;
use crate::test_support::RecordingUi;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Behaviour {
    Pass,
    ReturnHalt,
    RecordError,
}

/// Step that logs its hooks into a shared journal.
struct JournalStep {
    name: &'static str,
    behaviour: Behaviour,
    journal: Arc<Mutex<Vec<String>>>,
}

impl JournalStep {
    fn push(&self, entry: String) {
        self.journal.lock().expect("journal lock").push(entry);
    }
}

impl Step for JournalStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            self.push(format!("run {}", self.name));
            match self.behaviour {
                Behaviour::Pass => StepAction::Continue,
                Behaviour::ReturnHalt => {
                    state.halt(BuildError::Import(format!("{} failed", self.name)))
                }
                Behaviour::RecordError => {
                    state.halt(BuildError::Import(format!("{} failed", self.name)));
                    StepAction::Continue
                }
            }
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut BuildState) -> StepFuture<'a, ()> {
        Box::pin(async move { self.push(format!("cleanup {}", self.name)) })
    }
}

fn pipeline(behaviours: &[Behaviour], journal: &Arc<Mutex<Vec<String>>>) -> Pipeline {
    const NAMES: [&str; 4] = ["one", "two", "three", "four"];
    behaviours
        .iter()
        .zip(NAMES)
        .fold(Pipeline::new(), |pipeline, (behaviour, name)| {
            pipeline.step(JournalStep {
                name,
                behaviour: *behaviour,
                journal: Arc::clone(journal),
            })
        })
}

fn entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().expect("journal lock").clone()
}

#[tokio::test]
async fn successful_pipeline_runs_then_unwinds_everything() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut steps = pipeline(&[Behaviour::Pass, Behaviour::Pass, Behaviour::Pass], &journal);
    let mut state = BuildState::new(Arc::new(RecordingUi::default()));

    steps.run(&mut state).await;

    assert!(state.error().is_none());
    assert_eq!(
        entries(&journal),
        [
            "run one",
            "run two",
            "run three",
            "cleanup three",
            "cleanup two",
            "cleanup one"
        ]
    );
}

#[rstest]
#[case(Behaviour::ReturnHalt)]
#[case(Behaviour::RecordError)]
#[tokio::test]
async fn halting_step_unwinds_only_executed_steps(#[case] halt: Behaviour) {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut steps = pipeline(&[Behaviour::Pass, Behaviour::Pass, halt, Behaviour::Pass], &journal);
    let ui = Arc::new(RecordingUi::default());
    let mut state = BuildState::new(ui.clone());

    steps.run(&mut state).await;

    assert_eq!(
        entries(&journal),
        [
            "run one",
            "run two",
            "run three",
            "cleanup three",
            "cleanup two",
            "cleanup one"
        ]
    );
    assert!(matches!(state.error(), Some(BuildError::Import(message)) if message == "three failed"));
    assert_eq!(ui.errors(), [String::from("import failed: three failed")]);
}

#[tokio::test]
async fn first_step_halting_cleans_up_only_itself() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut steps = pipeline(&[Behaviour::ReturnHalt, Behaviour::Pass], &journal);
    let mut state = BuildState::new(Arc::new(RecordingUi::default()));

    steps.run(&mut state).await;

    assert_eq!(entries(&journal), ["run one", "cleanup one"]);
}

#[tokio::test]
async fn empty_pipeline_is_a_no_op() {
    let mut steps = Pipeline::new();
    let mut state = BuildState::new(Arc::new(RecordingUi::default()));

    steps.run(&mut state).await;

    assert!(steps.is_empty());
    assert!(state.error().is_none());
}
