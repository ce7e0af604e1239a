//! Shared configuration fixtures for integration tests.
//!
//! Integration tests are compiled as separate crates, so this file is pulled
//! in with `#[path = "common/fixtures.rs"]` instead of becoming its own
//! test binary.

use dropsmith::BuildConfig;

/// Complete configuration for a build in `nyc3` with no extra regions.
pub fn build_config() -> BuildConfig {
    BuildConfig {
        api_token: Some(String::from("dop_v1_example")),
        api_url: String::from("https://api.digitalocean.com/v2"),
        region: String::from("nyc3"),
        size: String::from("s-1vcpu-1gb"),
        image: String::from("ubuntu-24-04-x64"),
        droplet_name: Some(String::from("dropsmith-builder")),
        snapshot_name: Some(String::from("golden")),
        snapshot_regions: Vec::new(),
        snapshot_tags: Vec::new(),
        tags: Vec::new(),
        ssh_key_id: None,
        user_data: None,
        user_data_file: None,
        private_networking: false,
        monitoring: false,
        ipv6: false,
        droplet_agent: None,
        vpc_uuid: None,
        wait_snapshot_transfer: true,
        state_timeout_secs: 360,
        snapshot_timeout_secs: 3600,
        transfer_timeout_secs: 1800,
        spaces_access_key: None,
        spaces_secret_key: None,
        spaces_region: None,
        space_name: None,
    }
}

/// Region list helper.
pub fn regions(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}
