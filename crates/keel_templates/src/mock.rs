//! Mock secret service for testing.
//!
//! Provides a configurable [`SecretService`] that records every lookup,
//! allowing tests to assert which projects were (or were not) queried.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{TemplateError, TemplateResult};
use crate::secrets::SecretService;

/// Mock secret service.
#[derive(Clone, Default)]
pub struct MockSecretService {
    /// Configured DSNs by project.
    dsns: Arc<RwLock<HashMap<String, String>>>,
    /// Projects looked up, in call order.
    captured_calls: Arc<RwLock<Vec<String>>>,
}

impl MockSecretService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the DSN returned for `project`.
    pub fn with_dsn(self, project: impl Into<String>, dsn: impl Into<String>) -> Self {
        self.dsns.write().insert(project.into(), dsn.into());
        self
    }

    /// Get all captured lookups.
    pub fn captured_calls(&self) -> Vec<String> {
        self.captured_calls.read().clone()
    }

    /// Number of lookups for `project`.
    pub fn calls_for(&self, project: &str) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|p| p.as_str() == project)
            .count()
    }

    pub fn clear_captured_calls(&self) {
        self.captured_calls.write().clear();
    }
}

impl SecretService for MockSecretService {
    fn client_dsn(&self, project: &str) -> TemplateResult<String> {
        self.captured_calls.write().push(project.to_string());
        self.dsns
            .read()
            .get(project)
            .cloned()
            .ok_or_else(|| TemplateError::SecretService {
                project: project.to_string(),
                message: "project not found".to_string(),
            })
    }
}
