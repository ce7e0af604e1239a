//! Cloud resource abstraction used by the build engine.
//!
//! The engine never talks HTTP directly. Every remote call goes through
//! [`CloudClient`], which keeps the pipeline, poller, and replicator testable
//! with scripted doubles and leaves retry policy to the implementation.

mod types;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub use types::{
    Action, ActionStatus, CustomImageRequest, Droplet, DropletCreateRequest, Image, ImageKind,
    ImageRef,
};

/// Future returned by cloud client operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Errors raised by a [`CloudClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// The request never produced an HTTP response.
    #[error("{operation} request failed: {message}")]
    Transport {
        /// Operation being attempted (for example `create droplet`).
        operation: String,
        /// Message from the HTTP client.
        message: String,
    },
    /// The provider answered with a non-success status.
    #[error("{operation} rejected with status {status}: {message}")]
    Api {
        /// Operation being attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        /// Operation being attempted.
        operation: String,
        /// Decoder error message.
        message: String,
    },
}

/// Minimal interface to the provider's compute and image APIs.
///
/// Implementations may retry transient transport failures internally; the
/// engine treats whatever error comes back as final for that call.
pub trait CloudClient: Send + Sync {
    /// Creates a droplet and returns its initial record.
    fn create_droplet<'a>(
        &'a self,
        request: &'a DropletCreateRequest,
    ) -> CloudFuture<'a, Droplet>;

    /// Fetches the current record for a droplet.
    fn get_droplet(&self, droplet_id: u64) -> CloudFuture<'_, Droplet>;

    /// Deletes a droplet.
    fn delete_droplet(&self, droplet_id: u64) -> CloudFuture<'_, ()>;

    /// Starts a snapshot action on a droplet.
    fn snapshot_droplet<'a>(&'a self, droplet_id: u64, name: &'a str) -> CloudFuture<'a, Action>;

    /// Fetches an action previously started on a droplet.
    fn get_droplet_action(&self, droplet_id: u64, action_id: u64) -> CloudFuture<'_, Action>;

    /// Lists the snapshot images taken from a droplet.
    fn list_droplet_snapshots(&self, droplet_id: u64) -> CloudFuture<'_, Vec<Image>>;

    /// Fetches an image by id.
    fn get_image(&self, image_id: u64) -> CloudFuture<'_, Image>;

    /// Lists every image visible to the account, optionally narrowed by type.
    fn list_images(&self, kind: Option<ImageKind>) -> CloudFuture<'_, Vec<Image>>;

    /// Imports a custom image from a publicly reachable URL.
    fn create_custom_image<'a>(&'a self, request: &'a CustomImageRequest)
    -> CloudFuture<'a, Image>;

    /// Deletes an image.
    fn delete_image(&self, image_id: u64) -> CloudFuture<'_, ()>;

    /// Starts transferring an image to another region.
    fn transfer_image<'a>(&'a self, image_id: u64, region: &'a str) -> CloudFuture<'a, Action>;

    /// Fetches an action previously started on an image.
    fn get_image_action(&self, image_id: u64, action_id: u64) -> CloudFuture<'_, Action>;

    /// Attaches an existing tag to an image.
    fn tag_image<'a>(&'a self, tag: &'a str, image_id: u64) -> CloudFuture<'a, ()>;
}
