//! keel CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Placeholder or secret resolution failure
//! - 4: Template error (evaluation, extraction, expansion)
//! - 5: Deployment error

use std::process::ExitCode;

use clap::Parser;
use keel_templates::TemplateError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const RESOLUTION_FAILURE: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
    pub const DEPLOY_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    // Logs go to stderr, stdout carries the rendered artifact.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,keel={}", level)));
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Kubernetes(args) => commands::kubernetes::execute(args).await,
        Commands::Expand(args) => commands::expand::execute(args).await,
        Commands::Version(args) => commands::version::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let template_error = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<TemplateError>());

    match template_error {
        Some(err) if err.is_configuration() => ExitCodes::INVALID_ARGS,
        Some(err) if err.is_resolution() => ExitCodes::RESOLUTION_FAILURE,
        Some(TemplateError::Expansion { source, .. }) if source.is_resolution() => {
            ExitCodes::RESOLUTION_FAILURE
        }
        Some(TemplateError::NotFound(_)) => ExitCodes::INVALID_ARGS,
        Some(_) => ExitCodes::TEMPLATE_ERROR,
        None if e.to_string().contains("kubectl") => ExitCodes::DEPLOY_ERROR,
        None => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn wrapped(err: TemplateError) -> anyhow::Error {
        Err::<(), _>(err).context("Failed to render").unwrap_err()
    }

    #[test]
    fn test_categorize_template_errors() {
        assert_eq!(
            categorize_error(&wrapped(TemplateError::MalformedVariable("x".into()))),
            ExitCodes::INVALID_ARGS
        );
        assert_eq!(
            categorize_error(&wrapped(TemplateError::MissingCredential("SENTRY_AUTH_TOKEN".into()))),
            ExitCodes::RESOLUTION_FAILURE
        );
        assert_eq!(
            categorize_error(&wrapped(TemplateError::Expansion {
                token: "NOPE".into(),
                source: Box::new(TemplateError::UnknownPlaceholder("NOPE".into())),
            })),
            ExitCodes::RESOLUTION_FAILURE
        );
        assert_eq!(
            categorize_error(&wrapped(TemplateError::Evaluation("boom".into()))),
            ExitCodes::TEMPLATE_ERROR
        );
    }

    #[test]
    fn test_categorize_other_errors() {
        assert_eq!(
            categorize_error(&anyhow::anyhow!("kubectl apply exited with status 1")),
            ExitCodes::DEPLOY_ERROR
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("something else")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
