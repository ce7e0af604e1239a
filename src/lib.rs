//! Core library for dropsmith, a DigitalOcean image builder.
//!
//! A build boots a droplet, snapshots it, distributes the snapshot to extra
//! regions, and always removes the droplet afterwards. The steps run through a
//! [`pipeline::Pipeline`] that records the first failure and unwinds cleanup in
//! reverse. Every remote call goes through [`cloud::CloudClient`], with
//! [`digitalocean::DigitalOceanClient`] as the production implementation.
//!
//! Custom disk images are imported through [`import::ImportOrchestrator`],
//! which stages the file in a Space via [`spaces::SpacesStore`].

pub mod artifact;
pub mod builder;
pub mod cloud;
pub mod config;
pub mod digitalocean;
pub mod error;
pub mod import;
pub mod lookup;
pub mod pipeline;
pub mod poller;
pub mod replicate;
pub mod spaces;
pub mod state;
pub mod steps;
pub mod storage;
pub mod test_support;
pub mod ui;
pub mod user_data;

pub use artifact::{Artifact, BUILDER_ID, RegistryImage};
pub use builder::ImageBuilder;
pub use cloud::{CloudClient, CloudError, ImageKind};
pub use config::{BuildConfig, ConfigError};
pub use digitalocean::DigitalOceanClient;
pub use error::{BuildError, BuildFailure};
pub use import::{ImportOrchestrator, ImportSettings, select_image_file};
pub use lookup::{ImageFilter, LookupError, lookup_image};
pub use poller::{PollError, PollSettings, RemoteHandle, wait_for};
pub use replicate::{ReplicationError, ReplicationTask, TaskOutcome, replicate};
pub use spaces::{SpacesSettings, SpacesStore};
pub use storage::{ObjectStore, StorageError};
pub use ui::{ConsoleUi, Ui};
