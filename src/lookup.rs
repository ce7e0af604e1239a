//! Selects a single existing image from the account.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::cloud::{CloudClient, CloudError, Image, ImageKind};

/// Criteria an image must meet to be selected.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageFilter {
    /// Exact image name.
    pub name: Option<String>,
    /// Regular expression the image name must match.
    pub name_regex: Option<String>,
    /// Region the image must be available in.
    pub region: Option<String>,
    /// Restricts the listing to one image type.
    pub kind: Option<ImageKind>,
    /// Picks the most recently created image when several match.
    pub latest: bool,
}

/// Errors raised while looking up an image.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The filter is incomplete or contradictory.
    #[error("invalid image filter: {0}")]
    InvalidFilter(&'static str),
    /// `name_regex` did not compile.
    #[error("invalid name_regex: {0}")]
    Regex(#[from] regex::Error),
    /// Nothing matched.
    #[error("no matching image found")]
    NotFound,
    /// Several images matched and `latest` was not requested.
    #[error("more than one matching image found: {}", .ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", "))]
    Multiple {
        /// Ids of the matching images.
        ids: Vec<u64>,
    },
    /// Listing images failed.
    #[error("failed to list images: {0}")]
    Cloud(#[from] CloudError),
}

enum NameMatcher {
    Exact(String),
    Pattern(Regex),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == name,
            Self::Pattern(pattern) => pattern.is_match(name),
        }
    }
}

impl ImageFilter {
    /// Checks that exactly one name criterion is set and that it is usable.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidFilter`] or [`LookupError::Regex`].
    pub fn validate(&self) -> Result<(), LookupError> {
        self.matcher().map(|_| ())
    }

    fn matcher(&self) -> Result<NameMatcher, LookupError> {
        let name = self.name.as_deref().filter(|value| !value.is_empty());
        let pattern = self.name_regex.as_deref().filter(|value| !value.is_empty());
        match (name, pattern) {
            (Some(_), Some(_)) => Err(LookupError::InvalidFilter(
                "only one of name or name_regex can be set",
            )),
            (None, None) => Err(LookupError::InvalidFilter(
                "one of name or name_regex is required",
            )),
            (Some(exact), None) => Ok(NameMatcher::Exact(exact.to_owned())),
            (None, Some(expr)) => Ok(NameMatcher::Pattern(Regex::new(expr)?)),
        }
    }
}

/// Applies `filter` to an image listing.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] when nothing matches and
/// [`LookupError::Multiple`] when several match without `latest`, besides
/// filter validation errors.
pub fn filter_images(filter: &ImageFilter, images: Vec<Image>) -> Result<Image, LookupError> {
    let matcher = filter.matcher()?;
    let mut matches: Vec<Image> = images
        .into_iter()
        .filter(|image| matcher.matches(&image.name))
        .filter(|image| {
            filter
                .region
                .as_ref()
                .is_none_or(|region| image.regions.contains(region))
        })
        .collect();

    if matches.len() > 1 && !filter.latest {
        return Err(LookupError::Multiple {
            ids: matches.iter().map(|image| image.id).collect(),
        });
    }
    // RFC 3339 timestamps from the API share one format, so they order lexically.
    matches.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    matches.into_iter().next().ok_or(LookupError::NotFound)
}

/// Lists images visible to the account and selects one with `filter`.
///
/// # Errors
///
/// Fails on an invalid filter, when listing fails, or when the match is not
/// unique; see [`filter_images`].
pub async fn lookup_image<C>(client: &C, filter: &ImageFilter) -> Result<Image, LookupError>
where
    C: CloudClient + ?Sized,
{
    filter.validate()?;
    let images = client.list_images(filter.kind).await?;
    debug!(listed = images.len(), "filtering images");
    let found = filter_images(filter, images)?;
    debug!(image_id = found.id, "found image");
    Ok(found)
}
