//! Secret service access.
//!
//! Placeholders such as `SENTRY_DSN(project)` and the `sentry` native
//! function resolve the public DSN of a project through a [`SecretService`].

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::SentrySettings;
use crate::error::{TemplateError, TemplateResult};

/// Environment variable holding the secret service token.
pub const SENTRY_AUTH_TOKEN_VAR: &str = "SENTRY_AUTH_TOKEN";

/// Environment variable overriding the secret service base URL.
pub const SENTRY_URL_VAR: &str = "SENTRY_URL";

/// Lookup of client DSNs by project name.
pub trait SecretService: Send + Sync {
    /// Public DSN of the first client key of `project`.
    fn client_dsn(&self, project: &str) -> TemplateResult<String>;
}

#[derive(Debug, Deserialize)]
struct ClientKey {
    dsn: KeyDsn,
}

#[derive(Debug, Deserialize)]
struct KeyDsn {
    public: String,
}

/// Blocking Sentry API client.
pub struct SentryClient {
    client: Client,
    base_url: String,
    organization: String,
    token: String,
}

impl SentryClient {
    pub fn new(token: impl Into<String>, settings: &SentrySettings) -> TemplateResult<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: settings.url.trim_end_matches('/').to_string(),
            organization: settings.organization.clone(),
            token: token.into(),
        })
    }

    /// Build a client from `SENTRY_AUTH_TOKEN`.
    ///
    /// Returns `None` when the token is not configured.
    pub fn from_env(settings: &SentrySettings) -> TemplateResult<Option<Self>> {
        let token = match std::env::var(SENTRY_AUTH_TOKEN_VAR) {
            Ok(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };

        let mut settings = settings.clone();
        if let Ok(url) = std::env::var(SENTRY_URL_VAR) {
            if !url.is_empty() {
                settings.url = url;
            }
        }
        Self::new(token, &settings).map(Some)
    }

    fn keys_url(&self, project: &str) -> String {
        format!(
            "{}/api/0/projects/{}/{}/keys/",
            self.base_url, self.organization, project
        )
    }
}

impl SecretService for SentryClient {
    fn client_dsn(&self, project: &str) -> TemplateResult<String> {
        let url = self.keys_url(project);
        debug!("Fetching client keys from {}", url);

        let response = self.client.get(&url).bearer_auth(&self.token).send()?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TemplateError::SecretService {
                project: project.to_string(),
                message: "project not found".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TemplateError::SecretService {
                project: project.to_string(),
                message: format!("API error {}: {}", status, body),
            });
        }

        let keys: Vec<ClientKey> = response.json()?;
        keys.into_iter()
            .next()
            .map(|key| key.dsn.public)
            .ok_or_else(|| TemplateError::SecretService {
                project: project.to_string(),
                message: "project has no client keys".to_string(),
            })
    }
}

impl std::fmt::Debug for SentryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryClient")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_url() {
        let settings = SentrySettings {
            organization: "acme".to_string(),
            url: "https://sentry.example.com/".to_string(),
        };
        let client = SentryClient::new("token", &settings).unwrap();
        assert_eq!(
            client.keys_url("web"),
            "https://sentry.example.com/api/0/projects/acme/web/keys/"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let client = SentryClient::new("s3cr3t", &SentrySettings::default()).unwrap();
        assert!(!format!("{:?}", client).contains("s3cr3t"));
    }

    #[test]
    fn test_client_key_payload() {
        let payload = r#"[{"id": "k1", "dsn": {"public": "https://pub@sentry.io/1", "secret": "x"}}]"#;
        let keys: Vec<ClientKey> = serde_json::from_str(payload).unwrap();
        assert_eq!(keys[0].dsn.public, "https://pub@sentry.io/1");
    }
}
