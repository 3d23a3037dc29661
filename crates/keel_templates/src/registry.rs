//! Resolver registry for placeholder values.
//!
//! Maps symbolic placeholder names to their values. Lookups are tried in
//! order: computed values, parameterized resolvers (`PREFIX(arg)`), the
//! process environment. Anything else is an unknown placeholder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{TemplateError, TemplateResult};
use crate::secrets::{SecretService, SENTRY_AUTH_TOKEN_VAR};
use crate::version::ReleaseInfo;

/// Placeholder holding the release version.
pub const VERSION: &str = "VERSION";

/// Placeholder holding the image-tag-safe release version.
pub const IMAGE_TAG: &str = "IMAGE_TAG";

/// Parameterized placeholder resolving a project DSN.
pub const SENTRY_DSN: &str = "SENTRY_DSN";

/// Environment lookup used for the environment tier.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Split a token into name and optional argument.
///
/// `SENTRY_DSN(web)` yields `("SENTRY_DSN", Some("web"))`; the argument is
/// kept verbatim.
pub fn split_token(token: &str) -> (&str, Option<&str>) {
    match (token.find('('), token.strip_suffix(')')) {
        (Some(open), Some(inner)) => (&token[..open], Some(&inner[open + 1..])),
        _ => (token, None),
    }
}

/// Registry of placeholder resolvers for one pipeline run.
pub struct ResolverRegistry {
    values: BTreeMap<String, String>,
    secrets: Option<Arc<dyn SecretService>>,
    disable_sentry: bool,
    sentry_project: Option<String>,
    env: EnvLookup,
    dsn_cache: Mutex<HashMap<String, String>>,
}

impl ResolverRegistry {
    /// Create a registry with the computed release values.
    pub fn new(release: &ReleaseInfo) -> Self {
        let mut values = BTreeMap::new();
        values.insert(VERSION.to_string(), release.version.clone());
        values.insert(IMAGE_TAG.to_string(), release.image_tag.clone());

        Self {
            values,
            secrets: None,
            disable_sentry: false,
            sentry_project: None,
            env: Arc::new(|name| std::env::var(name).ok()),
            dsn_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry from a pipeline configuration.
    ///
    /// `secrets` is `None` when no credential for the secret service exists.
    pub fn from_config(
        config: &PipelineConfig,
        release: &ReleaseInfo,
        secrets: Option<Arc<dyn SecretService>>,
    ) -> Self {
        let mut registry = Self::new(release).disable_sentry(config.disable_sentry);
        registry.secrets = secrets;
        registry.sentry_project = config.sentry_project.clone();
        for (name, value) in &config.fixed_values {
            registry.values.insert(name.clone(), value.clone());
        }
        registry
    }

    /// Register an exact-name value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretService>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn disable_sentry(mut self, disable: bool) -> Self {
        self.disable_sentry = disable;
        self
    }

    /// Project used by the bare `SENTRY_DSN` placeholder.
    pub fn with_sentry_project(mut self, project: impl Into<String>) -> Self {
        self.sentry_project = Some(project.into());
        self
    }

    /// Replace the environment tier, mostly for tests.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Resolve a placeholder.
    pub fn resolve(&self, name: &str, arg: Option<&str>) -> TemplateResult<String> {
        if arg.is_none() {
            if let Some(value) = self.values.get(name) {
                debug!("Resolved {} from computed values", name);
                return Ok(value.clone());
            }
        }

        match (name, arg) {
            (SENTRY_DSN, Some(project)) => self.sentry_dsn(project),
            (SENTRY_DSN, None) => match &self.sentry_project {
                Some(project) => self.sentry_dsn(project),
                None => Err(TemplateError::Configuration(
                    "SENTRY_DSN requires a default sentry project".to_string(),
                )),
            },
            (_, Some(arg)) => Err(TemplateError::UnknownPlaceholder(format!("{}({})", name, arg))),
            (_, None) => match (self.env)(name).filter(|v| !v.is_empty()) {
                Some(value) => {
                    debug!("Resolved {} from environment", name);
                    Ok(value)
                }
                None => Err(TemplateError::UnknownPlaceholder(name.to_string())),
            },
        }
    }

    /// Release values as currently registered, including overrides.
    pub fn release(&self) -> ReleaseInfo {
        ReleaseInfo {
            version: self.values.get(VERSION).cloned().unwrap_or_default(),
            image_tag: self.values.get(IMAGE_TAG).cloned().unwrap_or_default(),
        }
    }

    /// Resolve a raw token such as `VERSION` or `SENTRY_DSN(web)`.
    pub fn resolve_token(&self, token: &str) -> TemplateResult<String> {
        let (name, arg) = split_token(token);
        self.resolve(name, arg)
    }

    /// Public DSN of `project`, memoized for the lifetime of the registry.
    pub fn sentry_dsn(&self, project: &str) -> TemplateResult<String> {
        let secrets = match &self.secrets {
            Some(secrets) => secrets,
            None if self.disable_sentry => {
                warn!("Sentry disabled, resolving DSN of {} to an empty value", project);
                return Ok(String::new());
            }
            None => {
                return Err(TemplateError::MissingCredential(
                    SENTRY_AUTH_TOKEN_VAR.to_string(),
                ))
            }
        };

        if let Some(dsn) = self.dsn_cache.lock().get(project) {
            return Ok(dsn.clone());
        }

        debug!("Resolving DSN of project {}", project);
        let dsn = secrets.client_dsn(project)?;
        self.dsn_cache
            .lock()
            .insert(project.to_string(), dsn.clone());
        Ok(dsn)
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("secrets", &self.secrets.is_some())
            .field("disable_sentry", &self.disable_sentry)
            .field("sentry_project", &self.sentry_project)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSecretService;

    fn registry() -> ResolverRegistry {
        ResolverRegistry::new(&ReleaseInfo::new("1.2.3+abc"))
            .with_env_lookup(|name| match name {
                "REGION" => Some("eu-west-1".to_string()),
                "BLANK" => Some(String::new()),
                _ => None,
            })
    }

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("VERSION"), ("VERSION", None));
        assert_eq!(split_token("SENTRY_DSN(web)"), ("SENTRY_DSN", Some("web")));
        assert_eq!(split_token("SENTRY_DSN()"), ("SENTRY_DSN", Some("")));
        assert_eq!(split_token("F(a(b))"), ("F", Some("a(b)")));
        assert_eq!(split_token("OPEN("), ("OPEN(", None));
    }

    #[test]
    fn test_computed_values() {
        let registry = registry().with_value("REPO", "registry/app");
        assert_eq!(registry.resolve(VERSION, None).unwrap(), "1.2.3+abc");
        assert_eq!(registry.resolve(IMAGE_TAG, None).unwrap(), "1.2.3-abc");
        assert_eq!(registry.resolve("REPO", None).unwrap(), "registry/app");
    }

    #[test]
    fn test_release_reflects_overrides() {
        let registry = registry().with_value(VERSION, "9.9.9");
        let release = registry.release();
        assert_eq!(release.version, "9.9.9");
        assert_eq!(release.image_tag, "1.2.3-abc");
    }

    #[test]
    fn test_environment_tier() {
        let registry = registry();
        assert_eq!(registry.resolve("REGION", None).unwrap(), "eu-west-1");

        let err = registry.resolve("BLANK", None).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(ref n) if n == "BLANK"));
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = registry().resolve_token("NOPE").unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("NOPE"));

        let err = registry().resolve_token("OTHER(x)").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(ref n) if n == "OTHER(x)"));
    }

    #[test]
    fn test_sentry_dsn_lookup() {
        let mock = MockSecretService::new().with_dsn("proj", "dsn-proj");
        let registry = registry().with_secrets(Arc::new(mock.clone()));

        assert_eq!(registry.resolve_token("SENTRY_DSN(proj)").unwrap(), "dsn-proj");
        assert_eq!(mock.captured_calls(), vec!["proj"]);
    }

    #[test]
    fn test_sentry_dsn_memoized() {
        let mock = MockSecretService::new().with_dsn("proj", "dsn-proj");
        let registry = registry().with_secrets(Arc::new(mock.clone()));

        registry.resolve_token("SENTRY_DSN(proj)").unwrap();
        registry.resolve_token("SENTRY_DSN(proj)").unwrap();
        assert_eq!(mock.calls_for("proj"), 1);
    }

    #[test]
    fn test_bare_sentry_dsn_uses_default_project() {
        let mock = MockSecretService::new().with_dsn("web", "dsn-web");
        let registry = registry()
            .with_secrets(Arc::new(mock))
            .with_sentry_project("web");
        assert_eq!(registry.resolve(SENTRY_DSN, None).unwrap(), "dsn-web");

        let err = self::registry().resolve(SENTRY_DSN, None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_credential() {
        let err = registry().resolve_token("SENTRY_DSN(proj)").unwrap_err();
        assert!(matches!(err, TemplateError::MissingCredential(ref v) if v == SENTRY_AUTH_TOKEN_VAR));
    }

    #[test]
    fn test_missing_credential_disabled() {
        let registry = registry().disable_sentry(true);
        assert_eq!(registry.resolve_token("SENTRY_DSN(proj)").unwrap(), "");
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::new()
            .with_fixed_value("REPO", "ecr/app")
            .with_sentry_project("api")
            .disable_sentry(true);
        let registry = ResolverRegistry::from_config(&config, &ReleaseInfo::new("2.0.0"), None);

        assert_eq!(registry.resolve("REPO", None).unwrap(), "ecr/app");
        assert_eq!(registry.resolve(SENTRY_DSN, None).unwrap(), "");
    }
}
