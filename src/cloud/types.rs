//! Records exchanged with the provider.
//!
//! Field names follow the DigitalOcean v2 JSON schema so the HTTP client can
//! (de)serialise them directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Image reference accepted by the droplet create call: a numeric image id
/// or a public slug such as `ubuntu-24-04-x64`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// Numeric image or snapshot id.
    Id(u64),
    /// Public image slug.
    Slug(String),
}

impl ImageRef {
    /// Interprets a configured image value, preferring a numeric id.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        trimmed
            .parse::<u64>()
            .map_or_else(|_| Self::Slug(trimmed.to_owned()), Self::Id)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

/// Body of a droplet create call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DropletCreateRequest {
    /// Droplet host name.
    pub name: String,
    /// Region slug (for example `nyc3`).
    pub region: String,
    /// Size slug (for example `s-1vcpu-1gb`).
    pub size: String,
    /// Base image.
    pub image: ImageRef,
    /// SSH key ids injected into the droplet.
    pub ssh_keys: Vec<u64>,
    /// Whether to enable the private network interface.
    pub private_networking: bool,
    /// Whether to install the monitoring agent.
    pub monitoring: bool,
    /// Whether to install the droplet agent; `None` leaves the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_droplet_agent: Option<bool>,
    /// Whether to enable IPv6.
    pub ipv6: bool,
    /// Cloud-init user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    /// Tags applied to the droplet.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// VPC the droplet joins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
}

/// Droplet as reported by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Droplet {
    /// Numeric droplet id.
    pub id: u64,
    /// Droplet host name.
    #[serde(default)]
    pub name: String,
    /// Lifecycle status (`new`, `active`, `off`, `archive`).
    #[serde(default)]
    pub status: String,
    /// Whether the droplet is locked by an in-flight action.
    #[serde(default)]
    pub locked: bool,
}

/// Status of an asynchronous provider action.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    /// Still running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Errored,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ActionStatus {
    /// Returns the provider's spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Unknown => "unknown",
        }
    }
}

/// Asynchronous provider operation such as a snapshot or transfer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Action {
    /// Action id used for polling.
    pub id: u64,
    /// Current status.
    pub status: ActionStatus,
    /// Action type (for example `snapshot`, `transfer`).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Region the action runs in, when reported.
    #[serde(default)]
    pub region_slug: Option<String>,
}

/// Image or snapshot as reported by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Image {
    /// Numeric image id.
    pub id: u64,
    /// Image name.
    #[serde(default)]
    pub name: String,
    /// Regions the image is available in.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Import status for custom images (`new`, `pending`, `available`, ...).
    #[serde(default)]
    pub status: String,
    /// Failure reason reported for custom image imports.
    #[serde(default)]
    pub error_message: String,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub created_at: String,
}

/// Body of a custom image import call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CustomImageRequest {
    /// Name of the resulting image.
    pub name: String,
    /// Public URL of the image file.
    pub url: String,
    /// Region the image is imported into.
    pub region: String,
    /// Distribution label.
    pub distribution: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Tags applied to the image.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Image listing filter understood by the provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    /// One-click application images.
    Application,
    /// Base distribution images.
    Distribution,
    /// Snapshots and custom images owned by the account.
    User,
}

impl ImageKind {
    /// Returns the provider's spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Distribution => "distribution",
            Self::User => "user",
        }
    }
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "application" => Ok(Self::Application),
            "distribution" => Ok(Self::Distribution),
            "user" => Ok(Self::User),
            other => Err(format!(
                "invalid image type '{other}'; must be one of: application, distribution, user"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ubuntu-24-04-x64", ImageRef::Slug(String::from("ubuntu-24-04-x64")))]
    #[case("123456", ImageRef::Id(123_456))]
    #[case(" 42 ", ImageRef::Id(42))]
    fn image_ref_prefers_numeric_ids(#[case] input: &str, #[case] expected: ImageRef) {
        assert_eq!(ImageRef::parse(input), expected);
    }

    #[test]
    fn image_ref_serialises_untagged() {
        let id = serde_json::to_value(ImageRef::Id(7)).expect("serialise id");
        let slug = serde_json::to_value(ImageRef::Slug(String::from("debian-12-x64")))
            .expect("serialise slug");
        assert_eq!(id, serde_json::json!(7));
        assert_eq!(slug, serde_json::json!("debian-12-x64"));
    }

    #[test]
    fn action_status_tolerates_unknown_values() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "id": 9,
            "status": "paused",
            "type": "transfer"
        }))
        .expect("decode action");
        assert_eq!(action.status, ActionStatus::Unknown);
        assert_eq!(action.kind, "transfer");
    }

    #[test]
    fn image_kind_rejects_unknown_types() {
        let err = "private".parse::<ImageKind>().expect_err("should reject");
        assert!(err.contains("application, distribution, user"), "{err}");
    }
}
