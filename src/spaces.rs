//! DigitalOcean Spaces implementation of [`ObjectStore`].
//!
//! Spaces speaks the S3 protocol, so uploads go through `aws-sdk-s3` pointed
//! at the regional Spaces endpoint with static access keys.

use std::fmt;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use camino::Utf8Path;
use tracing::debug;

use crate::storage::{ObjectStore, StorageError, StorageFuture};

const CREDENTIALS_PROVIDER: &str = "dropsmith";

/// Access keys and location of the Space used for imports.
#[derive(Clone, Eq, PartialEq)]
pub struct SpacesSettings {
    /// Spaces access key id.
    pub access_key: String,
    /// Spaces secret key.
    pub secret_key: String,
    /// Region hosting the Space (for example `nyc3`).
    pub region: String,
    /// Name of the Space.
    pub space_name: String,
}

impl fmt::Debug for SpacesSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacesSettings")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("space_name", &self.space_name)
            .finish()
    }
}

/// Bucket client for one Space.
#[derive(Clone, Debug)]
pub struct SpacesStore {
    client: aws_sdk_s3::Client,
    space_name: String,
    region: String,
}

impl SpacesStore {
    /// Builds a client for the Space described by `settings`.
    #[must_use]
    pub fn new(settings: &SpacesSettings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(endpoint_url(&settings.region))
            .credentials_provider(credentials)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            space_name: settings.space_name.clone(),
            region: settings.region.clone(),
        }
    }

    async fn put(&self, path: &Utf8Path, key: &str) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path.as_std_path())
            .await
            .map_err(|err| StorageError::Read {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        debug!(space = %self.space_name, %key, "uploading object");
        self.client
            .put_object()
            .bucket(&self.space_name)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(body)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| StorageError::Upload {
                key: key.to_owned(),
                message: err.to_string(),
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        debug!(space = %self.space_name, %key, "deleting object");
        self.client
            .delete_object()
            .bucket(&self.space_name)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| StorageError::Delete {
                key: key.to_owned(),
                message: err.to_string(),
            })
    }
}

impl ObjectStore for SpacesStore {
    fn upload<'a>(&'a self, path: &'a Utf8Path, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.put(path, key))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.remove(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}.digitaloceanspaces.com/{}",
            self.space_name,
            self.region,
            key.trim_start_matches('/')
        )
    }
}

fn endpoint_url(region: &str) -> String {
    format!("https://{region}.digitaloceanspaces.com")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn settings() -> SpacesSettings {
        SpacesSettings {
            access_key: String::from("DO00EXAMPLE"),
            secret_key: String::from("very-secret"),
            region: String::from("ams3"),
            space_name: String::from("images"),
        }
    }

    #[rstest]
    #[case("custom-web.qcow2")]
    #[case("/custom-web.qcow2")]
    fn public_url_is_virtual_hosted(settings: SpacesSettings, #[case] key: &str) {
        let store = SpacesStore::new(&settings);
        assert_eq!(
            store.public_url(key),
            "https://images.ams3.digitaloceanspaces.com/custom-web.qcow2"
        );
    }

    #[test]
    fn endpoint_is_regional() {
        assert_eq!(endpoint_url("sfo3"), "https://sfo3.digitaloceanspaces.com");
    }

    #[rstest]
    fn debug_output_omits_secret_key(settings: SpacesSettings) {
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("very-secret"), "{rendered}");
        assert!(rendered.contains("DO00EXAMPLE"));
    }

    #[rstest]
    #[tokio::test]
    async fn unreadable_file_is_a_read_error(settings: SpacesSettings) {
        let store = SpacesStore::new(&settings);
        let missing = Utf8Path::new("/nonexistent/dropsmith/image.qcow2");

        let err = store
            .upload(missing, "image.qcow2")
            .await
            .expect_err("missing file should fail");

        assert!(
            matches!(err, StorageError::Read { ref path, .. } if path == missing.as_str()),
            "unexpected error {err:?}"
        );
    }
}
