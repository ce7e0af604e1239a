//! Binary entry point for the dropsmith CLI.

use std::env;
use std::io::{self, Write};
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use dropsmith::{
    BuildConfig, BuildFailure, ConfigError, ConsoleUi, DigitalOceanClient, ImageBuilder,
    ImageFilter, ImageKind, ImportOrchestrator, ImportSettings, LookupError, SpacesStore, Ui,
    lookup_image,
};

mod cli;

use cli::{BuildCommand, Cli, ImageCommand, ImportCommand};

const LOG_ENV: &str = "DROPSMITH_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{}", .0.cause)]
    Build(Box<BuildFailure>),
    #[error("image lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("{0}")]
    InvalidKind(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Build(args) => build(args).await,
        Cli::Image(args) => image(args).await,
        Cli::Import(args) => import(args).await,
    }
}

fn load_config() -> Result<BuildConfig, CliError> {
    Ok(BuildConfig::load_without_cli_args()?.with_token_fallback(|name| env::var(name).ok()))
}

async fn build(args: BuildCommand) -> Result<(), CliError> {
    let config = apply_overrides(load_config()?, args).with_generated_names();
    config.validate()?;

    let client = Arc::new(DigitalOceanClient::from_config(&config));
    let ui: Arc<dyn Ui> = Arc::new(ConsoleUi);
    let artifact = ImageBuilder::new(client, Arc::clone(&ui))
        .execute(&config)
        .await
        .map_err(|failure| CliError::Build(Box::new(failure)))?;

    ui.say(&format!("Build finished. {artifact}"));
    writeln!(io::stdout(), "{}", artifact.identity())?;
    Ok(())
}

async fn image(args: ImageCommand) -> Result<(), CliError> {
    let filter = image_filter(args)?;
    let config = load_config()?;
    config.require_token()?;

    let client = DigitalOceanClient::from_config(&config);
    let found = lookup_image(&client, &filter).await?;
    writeln!(
        io::stdout(),
        "{}\t{}\t{}",
        found.id,
        found.name,
        found.regions.join(",")
    )?;
    Ok(())
}

async fn import(args: ImportCommand) -> Result<(), CliError> {
    let config = apply_spaces_overrides(load_config()?, &args);
    config.require_token()?;
    let spaces = config.spaces_settings()?;
    let (settings, files) = import_request(args);

    let client = Arc::new(DigitalOceanClient::from_config(&config));
    let store = Arc::new(SpacesStore::new(&spaces));
    let ui: Arc<dyn Ui> = Arc::new(ConsoleUi);
    let artifact = ImportOrchestrator::new(client, store, Arc::clone(&ui))
        .execute(&settings, &files)
        .await
        .map_err(|failure| CliError::Build(Box::new(failure)))?;

    ui.say(&format!("Import finished. {artifact}"));
    writeln!(io::stdout(), "{}", artifact.identity())?;
    Ok(())
}

fn apply_spaces_overrides(mut config: BuildConfig, args: &ImportCommand) -> BuildConfig {
    if args.space_name.is_some() {
        config.space_name.clone_from(&args.space_name);
    }
    if args.spaces_region.is_some() {
        config.spaces_region.clone_from(&args.spaces_region);
    }
    config
}

fn import_request(args: ImportCommand) -> (ImportSettings, Vec<Utf8PathBuf>) {
    let mut settings = ImportSettings::new(args.name, args.regions);
    if let Some(description) = args.description {
        settings.description = description;
    }
    if let Some(distribution) = args.distribution {
        settings.distribution = distribution;
    }
    if let Some(secs) = args.timeout_secs {
        settings.timeout = Duration::from_secs(secs);
    }
    settings.tags = args.tags;
    settings.object_key = args.object_name;
    settings.skip_clean = args.skip_clean;
    let files = args.files.into_iter().map(Utf8PathBuf::from).collect();
    (settings, files)
}

fn apply_overrides(mut config: BuildConfig, args: BuildCommand) -> BuildConfig {
    if let Some(region) = args.region {
        config.region = region;
    }
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(image) = args.image {
        config.image = image;
    }
    if args.snapshot_name.is_some() {
        config.snapshot_name = args.snapshot_name;
    }
    if !args.snapshot_regions.is_empty() {
        config.snapshot_regions = args.snapshot_regions;
    }
    if args.no_wait_transfer {
        config.wait_snapshot_transfer = false;
    }
    config
}

fn image_filter(args: ImageCommand) -> Result<ImageFilter, CliError> {
    let kind = args
        .kind
        .as_deref()
        .map(ImageKind::from_str)
        .transpose()
        .map_err(CliError::InvalidKind)?;
    Ok(ImageFilter {
        name: args.name,
        name_regex: args.name_regex,
        region: args.region,
        kind,
        latest: args.latest,
    })
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
    if let CliError::Build(failure) = err {
        for teardown in &failure.teardown_failures {
            writeln!(target, "warning: {teardown}").ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropsmith::BuildError;

    fn base_config() -> BuildConfig {
        BuildConfig {
            api_token: Some(String::from("token")),
            api_url: String::from("https://api.digitalocean.com/v2"),
            region: String::from("nyc3"),
            size: String::from("s-1vcpu-1gb"),
            image: String::from("ubuntu-24-04-x64"),
            droplet_name: None,
            snapshot_name: None,
            snapshot_regions: vec![String::from("ams3")],
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

    #[test]
    fn flags_override_loaded_configuration() {
        let args = BuildCommand {
            region: Some(String::from("sfo3")),
            snapshot_name: Some(String::from("golden")),
            snapshot_regions: vec![String::from("lon1"), String::from("fra1")],
            no_wait_transfer: true,
            ..BuildCommand::default()
        };

        let config = apply_overrides(base_config(), args);

        assert_eq!(config.region, "sfo3");
        assert_eq!(config.size, "s-1vcpu-1gb");
        assert_eq!(config.snapshot_name.as_deref(), Some("golden"));
        assert_eq!(config.snapshot_regions, ["lon1", "fra1"]);
        assert!(!config.wait_snapshot_transfer);
    }

    #[test]
    fn absent_flags_keep_configuration() {
        let config = apply_overrides(base_config(), BuildCommand::default());
        assert_eq!(config, base_config());
    }

    #[test]
    fn image_type_is_parsed() {
        let filter = image_filter(ImageCommand {
            name: Some(String::from("web")),
            kind: Some(String::from("distribution")),
            ..ImageCommand::default()
        })
        .expect("filter should build");
        assert_eq!(filter.kind, Some(ImageKind::Distribution));
    }

    #[test]
    fn unknown_image_type_is_rejected() {
        let err = image_filter(ImageCommand {
            name: Some(String::from("web")),
            kind: Some(String::from("snapshot")),
            ..ImageCommand::default()
        })
        .expect_err("type should be rejected");
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn write_error_lists_teardown_failures_as_warnings() {
        let failure = BuildFailure {
            cause: BuildError::Import(String::from("boom")),
            teardown_failures: vec![BuildError::MissingState("droplet")],
        };
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::Build(Box::new(failure)));
        let rendered = String::from_utf8(buf).expect("utf8");
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("import failed: boom"));
        assert!(lines.next().is_some_and(|line| line.starts_with("warning: ")));
    }

    #[test]
    fn import_flags_map_to_settings() {
        let Ok(Cli::Import(args)) = Cli::try_parse_from([
            "dropsmith",
            "import",
            "out/manifest.json",
            "out/web.qcow2",
            "--name",
            "web",
            "--image-region",
            "nyc3",
            "--image-region",
            "ams3",
            "--tag",
            "base",
            "--skip-clean",
            "--timeout-secs",
            "600",
        ]) else {
            panic!("import arguments should parse");
        };

        let (settings, files) = import_request(args);

        assert_eq!(settings.name, "web");
        assert_eq!(settings.regions, ["nyc3", "ams3"]);
        assert_eq!(settings.tags, ["base"]);
        assert_eq!(settings.distribution, "Unknown");
        assert_eq!(settings.timeout, Duration::from_secs(600));
        assert!(settings.skip_clean);
        assert_eq!(settings.object_key, None);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn import_requires_a_region() {
        let parsed = Cli::try_parse_from(["dropsmith", "import", "web.qcow2", "--name", "web"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn space_flags_override_configuration() {
        let mut config = base_config();
        config.space_name = Some(String::from("from-file"));
        let args = ImportCommand {
            spaces_region: Some(String::from("fra1")),
            ..ImportCommand::default()
        };

        let merged = apply_spaces_overrides(config, &args);

        assert_eq!(merged.space_name.as_deref(), Some("from-file"));
        assert_eq!(merged.spaces_region.as_deref(), Some("fra1"));
    }

    #[test]
    fn cli_rejects_conflicting_name_selectors() {
        let parsed = Cli::try_parse_from([
            "dropsmith",
            "image",
            "--name",
            "web",
            "--name-regex",
            "^web",
        ]);
        assert!(parsed.is_err());
    }
}
