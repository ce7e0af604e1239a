//! Command-line interface definitions for the `dropsmith` binary.
//!
//! The clap structures live here on their own so the build script can include
//! this file when rendering the manual page.

use clap::{ArgGroup, Parser};

/// Top-level CLI for the `dropsmith` binary.
#[derive(Debug, Parser)]
#[command(
    name = "dropsmith",
    about = "Build DigitalOcean droplet snapshots and distribute them across regions",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Boot a droplet, snapshot it, and copy the snapshot to more regions.
    #[command(name = "build")]
    Build(BuildCommand),
    /// Find exactly one existing image and print its id and regions.
    #[command(name = "image")]
    Image(ImageCommand),
    /// Upload a disk image to Spaces and import it as a custom image.
    #[command(name = "import")]
    Import(ImportCommand),
}

/// Arguments for `dropsmith build`.
///
/// Every flag overrides the matching `DIGITALOCEAN_*` variable or
/// `dropsmith.toml` key for this invocation only.
#[derive(Debug, Default, Parser)]
pub(crate) struct BuildCommand {
    /// Region the build droplet runs in (for example `nyc3`).
    #[arg(long, value_name = "SLUG")]
    pub(crate) region: Option<String>,
    /// Droplet size slug.
    #[arg(long, value_name = "SLUG")]
    pub(crate) size: Option<String>,
    /// Base image, as a numeric id or a slug.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Name of the resulting snapshot.
    #[arg(long, value_name = "NAME")]
    pub(crate) snapshot_name: Option<String>,
    /// Extra region to copy the snapshot to. Repeat for several regions.
    #[arg(long = "snapshot-region", value_name = "SLUG")]
    pub(crate) snapshot_regions: Vec<String>,
    /// Request regional transfers without waiting for them to finish.
    #[arg(long)]
    pub(crate) no_wait_transfer: bool,
}

/// Arguments for `dropsmith image`.
#[derive(Debug, Default, Parser)]
#[command(group(ArgGroup::new("selector").required(true).args(["name", "name_regex"])))]
pub(crate) struct ImageCommand {
    /// Exact image name.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Regular expression matched against image names.
    #[arg(long, value_name = "REGEX")]
    pub(crate) name_regex: Option<String>,
    /// Only consider images available in this region.
    #[arg(long, value_name = "SLUG")]
    pub(crate) region: Option<String>,
    /// Image type: application, distribution, or user.
    #[arg(long = "type", value_name = "TYPE")]
    pub(crate) kind: Option<String>,
    /// Pick the most recently created image when several match.
    #[arg(long)]
    pub(crate) latest: bool,
}

/// Arguments for `dropsmith import`.
///
/// Spaces credentials come from `DIGITALOCEAN_SPACES_ACCESS_KEY` and
/// `DIGITALOCEAN_SPACES_SECRET_KEY` or the matching `dropsmith.toml` keys.
#[derive(Debug, Default, Parser)]
pub(crate) struct ImportCommand {
    /// Disk image to import. When several files are given the first with a
    /// known image suffix is used.
    #[arg(required = true, value_name = "FILE")]
    pub(crate) files: Vec<String>,
    /// Name of the resulting image.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: String,
    /// Region the image must end up in. The first receives the import.
    #[arg(long = "image-region", value_name = "SLUG", required = true)]
    pub(crate) regions: Vec<String>,
    /// Image description.
    #[arg(long, value_name = "TEXT")]
    pub(crate) description: Option<String>,
    /// Distribution label shown in the control panel.
    #[arg(long, value_name = "NAME")]
    pub(crate) distribution: Option<String>,
    /// Tag applied to the image. Repeat for several tags.
    #[arg(long = "tag", value_name = "TAG")]
    pub(crate) tags: Vec<String>,
    /// Space that stages the upload.
    #[arg(long, value_name = "NAME")]
    pub(crate) space_name: Option<String>,
    /// Region hosting the Space.
    #[arg(long, value_name = "SLUG")]
    pub(crate) spaces_region: Option<String>,
    /// Object key for the upload.
    #[arg(long, value_name = "KEY")]
    pub(crate) object_name: Option<String>,
    /// Leave the uploaded file in the Space afterwards.
    #[arg(long)]
    pub(crate) skip_clean: bool,
    /// Seconds to wait for the import and for each regional transfer.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout_secs: Option<u64>,
}
