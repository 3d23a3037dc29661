//! Version command - Print the computed release version.

use anyhow::{Context, Result};
use clap::Args;

use keel_templates::ReleaseInfo;

#[derive(Args)]
pub struct VersionArgs {
    /// Print the image-tag-safe variant only
    #[arg(long)]
    image_tag: bool,
}

pub async fn execute(args: VersionArgs) -> Result<()> {
    let release = tokio::task::spawn_blocking(ReleaseInfo::detect)
        .await
        .context("Version detection panicked")?;

    if args.image_tag {
        println!("{}", release.image_tag);
    } else {
        println!("version:   {}", release.version);
        println!("image tag: {}", release.image_tag);
    }
    Ok(())
}
