//! Pipeline configuration.
//!
//! Everything a pipeline run needs is carried by [`PipelineConfig`], built
//! once by the caller from flags and the optional `keel.yaml` project file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};

/// Default field that marks an object as a deployable resource.
pub const DEFAULT_MARKER_FIELD: &str = "apiVersion";

/// Default organization used for secret lookups.
pub const DEFAULT_SENTRY_ORGANIZATION: &str = "keel";

/// Default secret service endpoint.
pub const DEFAULT_SENTRY_URL: &str = "https://sentry.io";

/// Name of the optional project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "keel.yaml";

/// Ordered sequence of object keys restricting extraction to a subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPath(Vec<String>);

impl FilterPath {
    /// A filter that selects everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a dot-delimited filter such as `web.deployment`.
    ///
    /// An empty string is the empty filter. Empty segments are rejected.
    pub fn parse(raw: &str) -> TemplateResult<Self> {
        if raw.is_empty() {
            return Ok(Self::empty());
        }

        let segments: Vec<String> = raw.split('.').map(String::from).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TemplateError::MalformedFilter(raw.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FilterPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Parse `KEY=VALUE` pairs, keeping their order.
///
/// A pair must contain exactly one `=`.
pub fn parse_external_vars<S: AsRef<str>>(pairs: &[S]) -> TemplateResult<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            let pair = pair.as_ref();
            let parts: Vec<&str> = pair.split('=').collect();
            match parts.as_slice() {
                [key, value] => Ok((key.to_string(), value.to_string())),
                _ => Err(TemplateError::MalformedVariable(pair.to_string())),
            }
        })
        .collect()
}

/// Secret service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentrySettings {
    /// Organization slug owning the projects.
    pub organization: String,
    /// Base URL of the API.
    pub url: String,
}

impl Default for SentrySettings {
    fn default() -> Self {
        Self {
            organization: DEFAULT_SENTRY_ORGANIZATION.to_string(),
            url: DEFAULT_SENTRY_URL.to_string(),
        }
    }
}

/// Contents of the optional `keel.yaml` project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KeelConfig {
    /// Extra Jsonnet library directories.
    pub includes: Vec<PathBuf>,
    /// Marker field override.
    pub marker_field: Option<String>,
    /// Secret service settings.
    pub sentry: SentrySettings,
}

impl KeelConfig {
    /// Load the project file from `dir`, falling back to defaults when absent.
    pub fn load(dir: &Path) -> TemplateResult<Self> {
        let path = dir.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        debug!("Loading project configuration from {:?}", path);
        let content = fs::read_to_string(&path)?;
        let config: KeelConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Configuration of a single pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jsonnet library directories, searched before the current directory.
    pub includes: Vec<PathBuf>,
    /// Caller supplied external variables.
    pub external_vars: Vec<(String, String)>,
    /// Subtree selection for extraction.
    pub filter: FilterPath,
    /// Field marking resource objects.
    pub marker_field: String,
    /// Resolve secret placeholders to empty strings when no credential exists.
    pub disable_sentry: bool,
    /// Project used by the bare `SENTRY_DSN` placeholder.
    pub sentry_project: Option<String>,
    /// Secret service settings.
    pub sentry: SentrySettings,
    /// Extra exact-name placeholder values.
    pub fixed_values: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            includes: Vec::new(),
            external_vars: Vec::new(),
            filter: FilterPath::empty(),
            marker_field: DEFAULT_MARKER_FIELD.to_string(),
            disable_sentry: false,
            sentry_project: None,
            sentry: SentrySettings::default(),
            fixed_values: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a configuration from the project file.
    pub fn from_project(project: &KeelConfig) -> Self {
        let mut config = Self {
            includes: project.includes.clone(),
            sentry: project.sentry.clone(),
            ..Self::default()
        };
        if let Some(marker) = &project.marker_field {
            config.marker_field = marker.clone();
        }
        config
    }

    pub fn with_include(mut self, dir: impl Into<PathBuf>) -> Self {
        self.includes.push(dir.into());
        self
    }

    pub fn with_external_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_vars.push((key.into(), value.into()));
        self
    }

    /// Parse and append `KEY=VALUE` pairs.
    pub fn with_external_pairs<S: AsRef<str>>(mut self, pairs: &[S]) -> TemplateResult<Self> {
        self.external_vars.extend(parse_external_vars(pairs)?);
        Ok(self)
    }

    pub fn with_filter(mut self, filter: FilterPath) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_marker_field(mut self, marker: impl Into<String>) -> Self {
        self.marker_field = marker.into();
        self
    }

    pub fn disable_sentry(mut self, disable: bool) -> Self {
        self.disable_sentry = disable;
        self
    }

    pub fn with_sentry_project(mut self, project: impl Into<String>) -> Self {
        self.sentry_project = Some(project.into());
        self
    }

    pub fn with_fixed_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_values.insert(name.into(), value.into());
        self
    }
}
