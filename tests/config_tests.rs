//! Configuration loading and validation through the public API.

#[path = "common/fixtures.rs"]
mod fixtures;

use dropsmith::test_support::EnvGuard;
use dropsmith::{BuildConfig, ConfigError};
use rstest::*;

use fixtures::{build_config, regions};

#[fixture]
fn valid_config() -> BuildConfig {
    build_config()
}

/// Every required field names its environment variable, TOML key, and file.
#[rstest]
#[case("region", "DIGITALOCEAN_REGION")]
#[case("size", "DIGITALOCEAN_SIZE")]
#[case("image", "DIGITALOCEAN_IMAGE")]
fn missing_fields_produce_actionable_errors(
    valid_config: BuildConfig,
    #[case] key: &str,
    #[case] env_var: &str,
) {
    let mut config = valid_config;
    match key {
        "region" => config.region.clear(),
        "size" => config.size.clear(),
        _ => config.image.clear(),
    }

    let error = config.validate().expect_err("field is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(message.contains(env_var), "message: {message}");
    assert!(message.contains(key), "message: {message}");
    assert!(message.contains("dropsmith.toml"), "message: {message}");
}

#[rstest]
fn token_only_check_ignores_build_fields(valid_config: BuildConfig) {
    let config = BuildConfig {
        region: String::new(),
        ..valid_config
    };
    assert_eq!(config.require_token(), Ok(()));
}

#[tokio::test]
async fn environment_supplies_build_settings() {
    let _guard = EnvGuard::set_vars(&[
        ("DIGITALOCEAN_API_TOKEN", Some("dop_v1_env")),
        ("DIGITALOCEAN_REGION", Some("sfo3")),
        ("DIGITALOCEAN_SIZE", Some("s-2vcpu-2gb")),
        ("DIGITALOCEAN_IMAGE", Some("debian-12-x64")),
        ("DIGITALOCEAN_SNAPSHOT_REGIONS", Some("ams3,lon1")),
    ])
    .await;

    let config = BuildConfig::load_without_cli_args().expect("config should load");

    assert_eq!(config.token(), "dop_v1_env");
    assert_eq!(config.region, "sfo3");
    assert_eq!(config.snapshot_regions, regions(&["ams3", "lon1"]));
    assert!(config.wait_snapshot_transfer);
    assert_eq!(config.transfer_timeout_secs, 1800);
    assert_eq!(config.validate(), Ok(()));
}

#[tokio::test]
async fn legacy_token_variables_fill_missing_token() {
    let _guard = EnvGuard::set_vars(&[
        ("DIGITALOCEAN_API_TOKEN", None),
        ("DIGITALOCEAN_TOKEN", None),
        ("DIGITALOCEAN_ACCESS_TOKEN", Some("dop_v1_access")),
        ("DIGITALOCEAN_REGION", Some("nyc3")),
        ("DIGITALOCEAN_SIZE", Some("s-1vcpu-1gb")),
        ("DIGITALOCEAN_IMAGE", Some("ubuntu-24-04-x64")),
    ])
    .await;

    let config = BuildConfig::load_without_cli_args()
        .expect("config should load")
        .with_token_fallback(|name| std::env::var(name).ok());

    assert_eq!(config.token(), "dop_v1_access");
}
