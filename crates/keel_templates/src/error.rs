//! Error types for the templating engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while rendering a deployment artifact.
///
/// Every variant is fatal to the pipeline invocation that raised it.
#[derive(Error, Debug)]
pub enum TemplateError {
    // Configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed external variable: {0}")]
    MalformedVariable(String),

    #[error("Malformed filter path: {0}")]
    MalformedFilter(String),

    // Resolution
    #[error("Unknown placeholder: {0}")]
    UnknownPlaceholder(String),

    #[error("Missing credential: {0} environment variable is not set")]
    MissingCredential(String),

    #[error("Secret service failed for project {project}: {message}")]
    SecretService { project: String, message: String },

    // Evaluation
    #[error("Template evaluation failed: {0}")]
    Evaluation(String),

    #[error("Import of {path} failed: {message}")]
    Import { path: String, message: String },

    #[error("Native function {function} failed: {message}")]
    NativeFunction { function: String, message: String },

    // Extraction
    #[error("Unexpected {found} at '{path}', expected an object or null")]
    Extraction { path: String, found: String },

    // Expansion
    #[error("Cannot expand ${{{token}}}: {source}")]
    Expansion {
        token: String,
        #[source]
        source: Box<TemplateError>,
    },

    #[error("Malformed placeholder at byte {offset}: {message}")]
    MalformedPlaceholder { offset: usize, message: String },

    #[error("Template file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TemplateError {
    /// Whether the error comes from a placeholder or secret lookup.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            TemplateError::UnknownPlaceholder(_)
                | TemplateError::MissingCredential(_)
                | TemplateError::SecretService { .. }
        )
    }

    /// Whether the error was detected before any evaluation started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TemplateError::Configuration(_)
                | TemplateError::MalformedVariable(_)
                | TemplateError::MalformedFilter(_)
        )
    }
}
