//! Expand command - Replace ${...} placeholders in a text template.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use keel_templates::{parse_external_vars, PipelineConfig};

use super::{build_pipeline, load_project, write_output};

#[derive(Args)]
pub struct ExpandArgs {
    /// Template file to expand
    file: PathBuf,

    /// Sentry project used by a bare ${SENTRY_DSN}
    #[arg(long, value_name = "PROJECT")]
    sentry: Option<String>,

    /// Fixed placeholder value (KEY=VALUE)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Resolve Sentry DSNs to empty strings instead of failing without credentials
    #[arg(long)]
    disable_sentry: bool,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn execute(args: ExpandArgs) -> Result<()> {
    let project = load_project()?;

    let mut config = PipelineConfig::from_project(&project).disable_sentry(args.disable_sentry);
    if let Some(sentry) = &args.sentry {
        config = config.with_sentry_project(sentry);
    }
    for (name, value) in parse_external_vars(args.set.as_slice())? {
        config = config.with_fixed_value(name, value);
    }

    let file = args.file.clone();
    let output = tokio::task::spawn_blocking(move || -> Result<String> {
        let (pipeline, _) = build_pipeline(config)?;
        let document = pipeline
            .render_flat(&file)
            .with_context(|| format!("Failed to expand {:?}", file))?;
        Ok(document.render()?)
    })
    .await
    .context("Expansion task panicked")??;

    write_output(args.output.as_deref(), &output)?;
    if let Some(path) = &args.output {
        info!("Wrote {:?}", path);
    }
    Ok(())
}
