//! Image produced by a successful build.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::cloud::{CloudClient, CloudError};

/// Identifier of the component that produced an [`Artifact`].
pub const BUILDER_ID: &str = "dropsmith.digitalocean";

/// Provider name recorded in registry metadata.
pub const PROVIDER_NAME: &str = "digitalocean";

const METADATA_LABELS: [&str; 4] = [
    "source_image_id",
    "build_region",
    "droplet_size",
    "droplet_name",
];

/// Snapshot or imported image and the regions holding it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifact {
    name: String,
    id: u64,
    regions: Vec<String>,
    metadata: BTreeMap<String, String>,
}

/// Per-region record for an image registry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RegistryImage {
    /// Image identifier in the registry, which is the image name rather than
    /// the numeric provider id.
    pub image_id: String,
    /// Provider name.
    pub provider_name: String,
    /// Region the image is available in.
    pub provider_region: String,
    /// Image the build started from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image_id: Option<String>,
    /// Build metadata labels.
    pub labels: BTreeMap<String, String>,
}

impl Artifact {
    /// Creates an artifact.
    #[must_use]
    pub const fn new(
        name: String,
        id: u64,
        regions: Vec<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            id,
            regions,
            metadata,
        }
    }

    /// Image name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Regions holding the image, in build order.
    #[must_use]
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Stable identity: `region,region:id`.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}:{}", self.regions.join(","), self.id)
    }

    /// Human-readable summary.
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Reads one metadata entry.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// One registry record per region.
    #[must_use]
    pub fn project_metadata(&self) -> Vec<RegistryImage> {
        let labels: BTreeMap<String, String> = METADATA_LABELS
            .iter()
            .filter_map(|key| {
                self.metadata
                    .get(*key)
                    .map(|value| ((*key).to_owned(), value.clone()))
            })
            .collect();
        let source_image_id = self.metadata.get("source_image_id").cloned();

        self.regions
            .iter()
            .map(|region| RegistryImage {
                image_id: self.name.clone(),
                provider_name: PROVIDER_NAME.to_owned(),
                provider_region: region.clone(),
                source_image_id: source_image_id.clone(),
                labels: labels.clone(),
            })
            .collect()
    }

    /// Deletes the image.
    ///
    /// # Errors
    ///
    /// Returns the client's error unchanged.
    pub async fn destroy<C>(&self, client: &C) -> Result<(), CloudError>
    where
        C: CloudClient + ?Sized,
    {
        tracing::info!(image_id = self.id, name = %self.name, "destroying image");
        client.delete_image(self.id).await
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A snapshot was created: '{}' (ID: {}) in regions '{}'",
            self.name,
            self.id,
            self.regions.join(",")
        )
    }
}
