//! Object storage seam used by image imports.
//!
//! The provider imports custom images from a public URL, so the local image
//! file is first pushed to a bucket. Only the operations the import path needs
//! are modelled here; the concrete bucket client is supplied by the caller.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use thiserror::Error;

/// Future returned by [`ObjectStore`] operations.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors raised by an [`ObjectStore`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StorageError {
    /// Reading the local file failed.
    #[error("failed to read `{path}`: {message}")]
    Read {
        /// Local path.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// The bucket rejected or failed the upload.
    #[error("failed to upload `{key}`: {message}")]
    Upload {
        /// Object key.
        key: String,
        /// Underlying error message.
        message: String,
    },
    /// Deleting the object failed.
    #[error("failed to delete `{key}`: {message}")]
    Delete {
        /// Object key.
        key: String,
        /// Underlying error message.
        message: String,
    },
}

/// Bucket holding image files while the provider imports them.
pub trait ObjectStore: Send + Sync {
    /// Uploads `path` under `key` with public-read access.
    fn upload<'a>(&'a self, path: &'a Utf8Path, key: &'a str) -> StorageFuture<'a, ()>;

    /// Removes the object stored under `key`.
    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;

    /// Public URL the provider can fetch `key` from.
    fn public_url(&self, key: &str) -> String;
}
