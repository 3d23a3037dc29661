//! Native functions exposed to structured templates.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::evaluator::{string_arg, NativeFunction};
use crate::registry::ResolverRegistry;

/// `std.native('sentry')(name)`: public DSN of a project.
pub struct SentryFunction {
    registry: Arc<ResolverRegistry>,
}

impl SentryFunction {
    pub const NAME: &'static str = "sentry";

    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self { registry }
    }
}

impl NativeFunction for SentryFunction {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> &[&'static str] {
        &["name"]
    }

    fn call(&self, args: &[Value]) -> TemplateResult<Value> {
        let project = string_arg(Self::NAME, args, 0)?;
        self.registry.sentry_dsn(project).map(Value::String)
    }
}

/// `std.native('envfile')(filename)`: dotenv file as base64 values.
///
/// Values are URL-safe, padded base64, ready for a Kubernetes `Secret`.
#[derive(Default)]
pub struct EnvFileFunction;

impl EnvFileFunction {
    pub const NAME: &'static str = "envfile";

    pub fn new() -> Self {
        Self
    }

    /// Read a dotenv file into base64 encoded values.
    pub fn read(path: &Path) -> TemplateResult<Map<String, Value>> {
        debug!("Reading env file {:?}", path);
        let entries = dotenvy::from_path_iter(path).map_err(|e| env_error(path, e))?;

        let mut values = Map::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| env_error(path, e))?;
            values.insert(key, Value::String(URL_SAFE.encode(value.as_bytes())));
        }
        Ok(values)
    }
}

impl NativeFunction for EnvFileFunction {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> &[&'static str] {
        &["filename"]
    }

    fn call(&self, args: &[Value]) -> TemplateResult<Value> {
        let filename = string_arg(Self::NAME, args, 0)?;
        Self::read(Path::new(filename)).map(Value::Object)
    }
}

fn env_error(path: &Path, err: dotenvy::Error) -> TemplateError {
    TemplateError::NativeFunction {
        function: EnvFileFunction::NAME.to_string(),
        message: format!("{}: {}", path.display(), err),
    }
}

/// The native functions every structured template can call.
pub fn standard_natives(registry: Arc<ResolverRegistry>) -> Vec<Arc<dyn NativeFunction>> {
    vec![
        Arc::new(SentryFunction::new(registry)),
        Arc::new(EnvFileFunction::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSecretService;
    use crate::version::ReleaseInfo;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sentry_function() {
        let mock = MockSecretService::new().with_dsn("web", "https://key@sentry.io/1");
        let registry = ResolverRegistry::new(&ReleaseInfo::new("1")).with_secrets(Arc::new(mock));
        let function = SentryFunction::new(Arc::new(registry));

        assert_eq!(function.call(&[json!("web")]).unwrap(), json!("https://key@sentry.io/1"));
        assert!(function.call(&[json!(1)]).is_err());
    }

    #[test]
    fn test_sentry_function_disabled() {
        let registry = ResolverRegistry::new(&ReleaseInfo::new("1")).disable_sentry(true);
        let function = SentryFunction::new(Arc::new(registry));
        assert_eq!(function.call(&[json!("web")]).unwrap(), json!(""));
    }

    #[test]
    fn test_envfile_function() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("prod.env");
        fs::write(&path, "# comment\nDATABASE_URL=postgres://db?a=1\nEMPTY=\nQUOTED=\"hello world\"\n").unwrap();

        let result = EnvFileFunction::new()
            .call(&[json!(path.to_str().unwrap())])
            .unwrap();
        assert_eq!(
            result,
            json!({
                "DATABASE_URL": URL_SAFE.encode("postgres://db?a=1"),
                "EMPTY": "",
                "QUOTED": URL_SAFE.encode("hello world"),
            })
        );
    }

    #[test]
    fn test_envfile_url_safe_alphabet() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "KEY=??>>\n").unwrap();

        let values = EnvFileFunction::read(&path).unwrap();
        assert_eq!(values["KEY"], json!("Pz8-Pg=="));
    }

    #[test]
    fn test_envfile_missing_file() {
        let err = EnvFileFunction::new()
            .call(&[json!("/definitely/missing.env")])
            .unwrap_err();
        assert!(matches!(err, TemplateError::NativeFunction { ref function, .. } if function == "envfile"));
    }

    #[test]
    fn test_standard_natives() {
        let registry = Arc::new(ResolverRegistry::new(&ReleaseInfo::new("1")));
        let names: Vec<String> = standard_natives(registry)
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["sentry", "envfile"]);
    }
}
