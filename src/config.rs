//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `dropsmith.toml`, and `DIGITALOCEAN_*` environment
//! variables. CLI overrides are applied afterwards by the binary.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::spaces::SpacesSettings;

/// Default DigitalOcean API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com/v2";

/// Variables consulted, in order, when `api_token` is not configured.
pub const TOKEN_FALLBACK_VARS: [&str; 2] = ["DIGITALOCEAN_TOKEN", "DIGITALOCEAN_ACCESS_TOKEN"];

/// Build settings derived from configuration files and environment variables.
#[derive(Clone, Debug, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DIGITALOCEAN",
    discovery(
        app_name = "dropsmith",
        config_file_name = "dropsmith.toml",
        dotfile_name = ".dropsmith.toml",
        project_file_name = "dropsmith.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag maps to an independent droplet toggle"
)]
pub struct BuildConfig {
    /// Personal access token for the v2 API.
    pub api_token: Option<String>,
    /// API base URL, overridable for testing against a proxy.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub api_url: String,
    /// Region the droplet is created in (for example `nyc3`).
    #[ortho_config(default = String::new())]
    pub region: String,
    /// Droplet size slug (for example `s-1vcpu-1gb`).
    #[ortho_config(default = String::new())]
    pub size: String,
    /// Base image slug or numeric id.
    #[ortho_config(default = String::new())]
    pub image: String,
    /// Droplet name. Generated when absent.
    pub droplet_name: Option<String>,
    /// Snapshot name. Generated when absent.
    pub snapshot_name: Option<String>,
    /// Extra regions the snapshot is transferred to.
    #[serde(default)]
    pub snapshot_regions: Vec<String>,
    /// Existing tags applied to the snapshot.
    #[serde(default)]
    pub snapshot_tags: Vec<String>,
    /// Tags applied to the build droplet.
    #[serde(default)]
    pub tags: Vec<String>,
    /// SSH key id injected into the droplet.
    pub ssh_key_id: Option<u64>,
    /// Inline user data.
    pub user_data: Option<String>,
    /// Path to a user data file.
    pub user_data_file: Option<String>,
    /// Enable private networking.
    #[serde(default)]
    pub private_networking: bool,
    /// Enable the monitoring agent.
    #[serde(default)]
    pub monitoring: bool,
    /// Enable IPv6.
    #[serde(default)]
    pub ipv6: bool,
    /// Install the droplet agent. Unset keeps the provider default.
    pub droplet_agent: Option<bool>,
    /// VPC the droplet joins.
    pub vpc_uuid: Option<String>,
    /// Wait for snapshot transfers to finish before reporting success.
    #[ortho_config(default = true)]
    pub wait_snapshot_transfer: bool,
    /// Seconds to wait for the droplet to become active.
    #[ortho_config(default = 360)]
    pub state_timeout_secs: u64,
    /// Seconds to wait for the snapshot action to complete.
    #[ortho_config(default = 3600)]
    pub snapshot_timeout_secs: u64,
    /// Seconds to wait for each regional transfer.
    #[ortho_config(default = 1800)]
    pub transfer_timeout_secs: u64,
    /// Spaces access key used to stage image imports.
    pub spaces_access_key: Option<String>,
    /// Spaces secret key used to stage image imports.
    pub spaces_secret_key: Option<String>,
    /// Region hosting the Space that stages imports.
    pub spaces_region: Option<String>,
    /// Space that stages imports.
    pub space_name: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BuildConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to dropsmith.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration from defaults, files, and environment variables
    /// without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("dropsmith")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Fills `api_token` from the fallback variables when it is unset.
    ///
    /// `lookup` resolves a variable name to its value.
    #[must_use]
    pub fn with_token_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let configured = self
            .api_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        if !configured {
            self.api_token = TOKEN_FALLBACK_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .find(|token| !token.trim().is_empty());
        }
        self
    }

    /// Generates droplet and snapshot names that were left unset.
    #[must_use]
    pub fn with_generated_names(mut self) -> Self {
        if self.droplet_name.as_deref().is_none_or(str::is_empty) {
            self.droplet_name = Some(generated_name());
        }
        if self.snapshot_name.as_deref().is_none_or(str::is_empty) {
            self.snapshot_name = Some(generated_name());
        }
        self
    }

    /// API token, or an empty string when none was found.
    #[must_use]
    pub fn token(&self) -> &str {
        self.api_token.as_deref().unwrap_or_default()
    }

    /// Droplet name, or an empty string before names are generated.
    #[must_use]
    pub fn droplet_name(&self) -> &str {
        self.droplet_name.as_deref().unwrap_or_default()
    }

    /// Snapshot name, or an empty string before names are generated.
    #[must_use]
    pub fn snapshot_name(&self) -> &str {
        self.snapshot_name.as_deref().unwrap_or_default()
    }

    /// Droplet readiness timeout.
    #[must_use]
    pub const fn state_timeout(&self) -> Duration {
        Duration::from_secs(self.state_timeout_secs)
    }

    /// Snapshot completion timeout.
    #[must_use]
    pub const fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }

    /// Per-region transfer timeout.
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Checks only that an API token is available, for commands that never
    /// create resources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the token variables.
    pub fn require_token(&self) -> Result<(), ConfigError> {
        Self::require_field(
            self.token(),
            &FieldMetadata::new(
                "DigitalOcean API token",
                "DIGITALOCEAN_API_TOKEN (or DIGITALOCEAN_TOKEN)",
                "api_token",
            ),
        )
    }

    /// Collects the Spaces settings an import needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first unset value.
    pub fn spaces_settings(&self) -> Result<SpacesSettings, ConfigError> {
        let fields = [
            (
                &self.spaces_access_key,
                FieldMetadata::new(
                    "Spaces access key",
                    "DIGITALOCEAN_SPACES_ACCESS_KEY",
                    "spaces_access_key",
                ),
            ),
            (
                &self.spaces_secret_key,
                FieldMetadata::new(
                    "Spaces secret key",
                    "DIGITALOCEAN_SPACES_SECRET_KEY",
                    "spaces_secret_key",
                ),
            ),
            (
                &self.spaces_region,
                FieldMetadata::new("Spaces region", "DIGITALOCEAN_SPACES_REGION", "spaces_region"),
            ),
            (
                &self.space_name,
                FieldMetadata::new("Space name", "DIGITALOCEAN_SPACE_NAME", "space_name"),
            ),
        ];
        for (value, metadata) in &fields {
            Self::require_field(value.as_deref().unwrap_or_default(), metadata)?;
        }
        Ok(SpacesSettings {
            access_key: self.spaces_access_key.clone().unwrap_or_default(),
            secret_key: self.spaces_secret_key.clone().unwrap_or_default(),
            region: self.spaces_region.clone().unwrap_or_default(),
            space_name: self.space_name.clone().unwrap_or_default(),
        })
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.require_token()?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("droplet region", "DIGITALOCEAN_REGION", "region"),
        )?;
        Self::require_field(
            &self.size,
            &FieldMetadata::new("droplet size", "DIGITALOCEAN_SIZE", "size"),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("base image", "DIGITALOCEAN_IMAGE", "image"),
        )?;
        let timeouts = [
            ("state_timeout_secs", self.state_timeout_secs),
            ("snapshot_timeout_secs", self.snapshot_timeout_secs),
            ("transfer_timeout_secs", self.transfer_timeout_secs),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
        }
        Ok(())
    }
}

fn generated_name() -> String {
    format!("dropsmith-{}", Uuid::new_v4().simple())
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A value was present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
