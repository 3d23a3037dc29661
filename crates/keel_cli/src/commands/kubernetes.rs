//! Kubernetes command - Render a Jsonnet script into a resource list.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use keel_templates::{FilterPath, PipelineConfig};

use super::{build_pipeline, load_project, write_output};

#[derive(Args)]
pub struct KubernetesArgs {
    /// Jsonnet script to evaluate
    script: PathBuf,

    /// Only extract resources under this dot-separated path
    #[arg(short, long)]
    filter: Option<String>,

    /// External variable available through std.extVar (KEY=VALUE)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Directory to search for imported libraries
    #[arg(short, long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Apply the output with kubectl instead of printing it
    #[arg(long)]
    apply: bool,

    /// Resolve Sentry DSNs to empty strings instead of failing without credentials
    #[arg(long)]
    disable_sentry: bool,
}

pub async fn execute(args: KubernetesArgs) -> Result<()> {
    let project = load_project()?;

    let mut config = PipelineConfig::from_project(&project)
        .with_external_pairs(args.env.as_slice())?
        .disable_sentry(args.disable_sentry);
    for dir in &args.include {
        config = config.with_include(dir);
    }
    if let Some(filter) = &args.filter {
        config = config.with_filter(FilterPath::parse(filter)?);
    }

    let script = args.script.clone();
    let (output, release) = tokio::task::spawn_blocking(move || -> Result<_> {
        let (pipeline, release) = build_pipeline(config)?;
        let document = pipeline
            .render_structured(&script)
            .with_context(|| format!("Failed to render {:?}", script))?;
        Ok((document.render()?, release))
    })
    .await
    .context("Rendering task panicked")??;

    if !args.apply {
        return write_output(None, &output);
    }

    info!(
        "Deploying {:?} with version {}",
        args.script, release.version
    );
    apply(&output).await
}

/// Pipe `manifest` into `kubectl apply -f -`.
async fn apply(manifest: &str) -> Result<()> {
    let mut child = Command::new("kubectl")
        .args(["apply", "-f", "-"])
        .stdin(Stdio::piped())
        .spawn()
        .context("Failed to start kubectl")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(manifest.as_bytes())
            .await
            .context("Failed to write manifest to kubectl")?;
    }

    let status = child.wait().await.context("Failed to wait for kubectl")?;
    if !status.success() {
        anyhow::bail!("kubectl apply exited with {}", status);
    }
    Ok(())
}
