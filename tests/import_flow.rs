//! Custom image import through the upload and import steps.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use dropsmith::test_support::{MemoryStore, RecordingUi, ScriptedCloud};
use dropsmith::{BuildError, ImportOrchestrator, ImportSettings};
use rstest::*;

struct Harness {
    cloud: Arc<ScriptedCloud>,
    store: Arc<MemoryStore>,
    orchestrator: ImportOrchestrator<ScriptedCloud, MemoryStore>,
}

#[fixture]
fn harness() -> Harness {
    let cloud = Arc::new(ScriptedCloud::new());
    let store = Arc::new(MemoryStore::new("https://images.nyc3.example"));
    let orchestrator = ImportOrchestrator::new(
        Arc::clone(&cloud),
        Arc::clone(&store),
        Arc::new(RecordingUi::default()),
    )
    .with_poll_interval(Duration::from_secs(1));
    Harness {
        cloud,
        store,
        orchestrator,
    }
}

#[fixture]
fn settings() -> ImportSettings {
    let mut settings = ImportSettings::new(
        "custom-web",
        vec![String::from("nyc3"), String::from("ams3")],
    );
    settings.object_key = Some(String::from("imports/custom-web.qcow2"));
    settings
}

fn outputs() -> Vec<Utf8PathBuf> {
    vec![
        Utf8PathBuf::from("out/packer-manifest.json"),
        Utf8PathBuf::from("out/custom-web.qcow2"),
    ]
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn import_uploads_imports_and_distributes(harness: Harness, settings: ImportSettings) {
    let artifact = harness
        .orchestrator
        .execute(&settings, &outputs())
        .await
        .unwrap_or_else(|failure| panic!("import should succeed: {}", failure.cause));

    assert_eq!(harness.store.uploaded(), ["imports/custom-web.qcow2"]);
    let requests = harness.cloud.custom_image_requests();
    let request = requests.first().expect("import requested");
    assert_eq!(
        request.url,
        "https://images.nyc3.example/imports/custom-web.qcow2"
    );
    assert_eq!(request.distribution, "Unknown");
    assert_eq!(harness.cloud.transfers(), ["ams3"]);
    assert_eq!(artifact.regions(), ["nyc3", "ams3"]);
    assert_eq!(harness.store.deleted(), ["imports/custom-web.qcow2"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn skip_clean_keeps_uploaded_object(harness: Harness, mut settings: ImportSettings) {
    settings.skip_clean = true;

    harness
        .orchestrator
        .execute(&settings, &outputs())
        .await
        .unwrap_or_else(|failure| panic!("import should succeed: {}", failure.cause));

    assert!(harness.store.deleted().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rejected_import_still_removes_object(harness: Harness, settings: ImportSettings) {
    harness.cloud.fail_imports_with("image format not recognised");

    let failure = harness
        .orchestrator
        .execute(&settings, &outputs())
        .await
        .expect_err("import should fail");

    assert!(matches!(
        failure.cause,
        BuildError::PollDomainFailure { ref message, .. } if message == "image format not recognised"
    ));
    assert_eq!(harness.store.deleted().len(), 1);
    assert!(harness.cloud.transfers().is_empty());
}

#[rstest]
#[tokio::test]
async fn outputs_without_an_image_touch_nothing(harness: Harness, settings: ImportSettings) {
    let files = vec![Utf8PathBuf::from("out/a.json"), Utf8PathBuf::from("out/b.txt")];

    let failure = harness
        .orchestrator
        .execute(&settings, &files)
        .await
        .expect_err("selection should fail");

    assert!(matches!(failure.cause, BuildError::Import(_)));
    assert!(harness.store.uploaded().is_empty());
    assert!(harness.cloud.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn empty_region_list_is_rejected_up_front(harness: Harness, mut settings: ImportSettings) {
    settings.regions.clear();

    let failure = harness
        .orchestrator
        .execute(&settings, &outputs())
        .await
        .expect_err("regions are required");

    assert!(matches!(failure.cause, BuildError::Import(_)));
    assert!(harness.store.uploaded().is_empty());
}
