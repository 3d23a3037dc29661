//! CLI command definitions.
//!
//! Each subcommand renders one kind of deployment artifact.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use keel_templates::{
    KeelConfig, Pipeline, PipelineConfig, ReleaseInfo, ResolverRegistry, SecretService,
    SentryClient,
};

pub mod expand;
pub mod kubernetes;
pub mod version;

/// keel - deployment artifact generator
#[derive(Parser)]
#[command(name = "keel")]
#[command(version, about = "keel - deployment artifact generator")]
#[command(long_about = r#"
keel renders deployment artifacts from templates with release metadata
and secrets filled in.

COMMANDS:
  kubernetes  → Evaluate a Jsonnet script into a Kubernetes List (optionally apply it)
  expand      → Replace ${...} placeholders in a text file
  version     → Print the computed release version

ENVIRONMENT:
  SENTRY_AUTH_TOKEN  Token for Sentry DSN lookups
  SENTRY_URL         Sentry base URL (defaults to https://sentry.io)
  KEEL_VERSION       Overrides the detected release version

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Placeholder or secret resolution failure
  4 - Template error
  5 - Deployment error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a Jsonnet script and print or apply the resulting resources
    Kubernetes(kubernetes::KubernetesArgs),

    /// Expand ${...} placeholders in a text template
    Expand(expand::ExpandArgs),

    /// Print the computed release version
    Version(version::VersionArgs),
}

/// Load `keel.yaml` from the current directory, if any.
pub fn load_project() -> Result<KeelConfig> {
    let current_dir = std::env::current_dir()?;
    KeelConfig::load(&current_dir).context("Failed to load project configuration")
}

/// Build a pipeline for `config`.
///
/// Blocking: detects the release from git and builds a blocking HTTP
/// client, so call it outside the async reactor.
pub fn build_pipeline(config: PipelineConfig) -> Result<(Pipeline, ReleaseInfo)> {
    let release = ReleaseInfo::detect();
    debug!("Release version {} (image tag {})", release.version, release.image_tag);

    let secrets: Option<Arc<dyn SecretService>> = if config.disable_sentry {
        None
    } else {
        SentryClient::from_env(&config.sentry)?.map(|client| Arc::new(client) as Arc<dyn SecretService>)
    };

    let registry = ResolverRegistry::from_config(&config, &release, secrets);
    Ok((Pipeline::new(config, Arc::new(registry)), release))
}

/// Write `content` to `path` or stdout.
pub fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_kubernetes_flags() {
        let cli = Cli::try_parse_from([
            "keel", "kubernetes", "k8s/deploy.jsonnet", "-f", "web", "-e", "env=prod", "-e",
            "region=eu", "-i", "lib", "--disable-sentry",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Kubernetes(_)));
    }

    #[test]
    fn test_parse_expand_flags() {
        let cli = Cli::try_parse_from([
            "keel", "-v", "expand", "compose.yaml", "--sentry", "web", "--set", "REPO=ecr/app",
            "-o", "out.yaml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Expand(_)));
    }

    #[test]
    fn test_write_output_to_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out.json");
        write_output(Some(&path), "{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
