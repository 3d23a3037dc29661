//! Structured template evaluation.
//!
//! Structured templates are Jsonnet scripts. This module owns everything
//! the script can reach from the host:
//!
//! - imports, resolved in two tiers (embedded library first, filesystem second)
//! - external variables (`std.extVar`)
//! - native functions (`std.native`), see [`NativeFunction`]
//!
//! The Jsonnet engine itself lives in [`crate::jsonnet`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::jsonnet::{self, JsonnetNode};
use crate::version::ReleaseInfo;

/// Import name that always resolves to the bundled library.
pub const RESERVED_LIBRARY: &str = "keel.jsonnet";

/// Directory prefix of embedded import paths.
pub const EMBEDDED_ROOT: &str = "<embedded>";

/// External variable holding the release version.
pub const EXT_VAR_VERSION: &str = "version";

/// External variable holding the image-tag-safe release version.
pub const EXT_VAR_IMAGE_TAG: &str = "image-tag";

const KEEL_LIBRARY: &str = include_str!("../assets/keel.jsonnet");

/// A host function callable from templates through `std.native(name)`.
pub trait NativeFunction {
    /// Name the function is registered under.
    fn name(&self) -> &str;

    /// Parameter names, in call order.
    fn params(&self) -> &[&'static str];

    /// Invoke the function. Arguments arrive as JSON values.
    fn call(&self, args: &[Value]) -> TemplateResult<Value>;
}

/// Fetch a string argument, naming the function on mismatch.
pub fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> TemplateResult<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(TemplateError::NativeFunction {
            function: function.to_string(),
            message: format!("argument {} must be a string, got {}", index, other),
        }),
        None => Err(TemplateError::NativeFunction {
            function: function.to_string(),
            message: format!("missing argument {}", index),
        }),
    }
}

/// Build-time bundled Jsonnet libraries.
#[derive(Debug, Clone)]
pub struct EmbeddedLibrary {
    files: BTreeMap<&'static str, &'static str>,
}

impl Default for EmbeddedLibrary {
    fn default() -> Self {
        let mut files = BTreeMap::new();
        files.insert(RESERVED_LIBRARY, KEEL_LIBRARY);
        Self { files }
    }
}

impl EmbeddedLibrary {
    /// An embedded library with no files.
    pub fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, name: &'static str, content: &'static str) -> Self {
        self.files.insert(name, content);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Virtual path under which an embedded file is registered.
    pub fn virtual_path(name: &str) -> PathBuf {
        Path::new(EMBEDDED_ROOT).join(name)
    }

    /// Content of the embedded file addressed by a virtual path.
    pub fn load(&self, resolved: &Path) -> Option<&'static str> {
        let name = resolved.strip_prefix(EMBEDDED_ROOT).ok()?.to_str()?;
        self.files.get(name).copied()
    }
}

/// Two-tier import resolution.
#[derive(Debug, Clone)]
pub struct Importer {
    embedded: EmbeddedLibrary,
    search_paths: Vec<PathBuf>,
}

impl Importer {
    /// Create an importer searching `includes` and the current directory.
    pub fn new(includes: &[PathBuf]) -> Self {
        Self::with_library(EmbeddedLibrary::default(), includes)
    }

    pub fn with_library(embedded: EmbeddedLibrary, includes: &[PathBuf]) -> Self {
        // Later include directories take precedence, the current directory first of all.
        let mut search_paths = vec![PathBuf::from(".")];
        search_paths.extend(includes.iter().rev().cloned());
        Self {
            embedded,
            search_paths,
        }
    }

    /// Resolve `path` imported from a file located in `from`.
    pub fn resolve(&self, from: &Path, path: &Path) -> TemplateResult<PathBuf> {
        if let Some(name) = path.to_str() {
            if self.embedded.contains(name) {
                debug!("Import {} resolved to the embedded library", name);
                return Ok(EmbeddedLibrary::virtual_path(name));
            }
        }

        let direct = from.join(path);
        if direct.is_file() {
            return Ok(direct);
        }

        for dir in &self.search_paths {
            let candidate = dir.join(path);
            if candidate.is_file() {
                debug!("Import {:?} resolved to {:?}", path, candidate);
                return Ok(candidate);
            }
        }

        Err(TemplateError::Import {
            path: path.display().to_string(),
            message: format!(
                "not found relative to {:?} or in {:?}",
                from, self.search_paths
            ),
        })
    }

    /// Load the content of a resolved import.
    pub fn load(&self, resolved: &Path) -> TemplateResult<String> {
        if let Some(content) = self.embedded.load(resolved) {
            return Ok(content.to_string());
        }
        fs::read_to_string(resolved).map_err(|e| TemplateError::Import {
            path: resolved.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Evaluates Jsonnet templates.
pub struct StructuredEvaluator {
    importer: Importer,
    ext_vars: Vec<(String, String)>,
    natives: Vec<Arc<dyn NativeFunction>>,
}

impl StructuredEvaluator {
    /// Create an evaluator with the release external variables set.
    pub fn new(importer: Importer, release: &ReleaseInfo) -> Self {
        Self {
            importer,
            ext_vars: vec![
                (EXT_VAR_VERSION.to_string(), release.version.clone()),
                (EXT_VAR_IMAGE_TAG.to_string(), release.image_tag.clone()),
            ],
            natives: Vec::new(),
        }
    }

    pub fn with_external_vars(mut self, vars: &[(String, String)]) -> Self {
        self.ext_vars.extend(vars.iter().cloned());
        self
    }

    pub fn with_native(mut self, function: Arc<dyn NativeFunction>) -> Self {
        self.natives.push(function);
        self
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn external_vars(&self) -> &[(String, String)] {
        &self.ext_vars
    }

    pub fn natives(&self) -> &[Arc<dyn NativeFunction>] {
        &self.natives
    }

    /// Evaluate the script at `path`.
    ///
    /// The result is lazy: fields are only evaluated when visited.
    pub fn evaluate(&self, path: &Path) -> TemplateResult<JsonnetNode> {
        if !path.is_file() {
            return Err(TemplateError::NotFound(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        self.evaluate_source(path, &source)
    }

    /// Evaluate an in-memory script. `path` is used for relative imports and messages.
    pub fn evaluate_source(&self, path: &Path, source: &str) -> TemplateResult<JsonnetNode> {
        debug!(
            "Evaluating {:?} with {} external variables and {} native functions",
            path,
            self.ext_vars.len(),
            self.natives.len()
        );
        jsonnet::evaluate(self, path, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_string_arg() {
        let args = vec![json!("web"), json!(3)];
        assert_eq!(string_arg("sentry", &args, 0).unwrap(), "web");

        let err = string_arg("sentry", &args, 1).unwrap_err();
        assert!(err.to_string().contains("sentry"));
        assert!(string_arg("sentry", &args, 2).is_err());
    }

    #[test]
    fn test_reserved_name_prefers_embedded() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(RESERVED_LIBRARY), "{ shadowed: true }").unwrap();

        let importer = Importer::new(&[temp.path().to_path_buf()]);
        let resolved = importer
            .resolve(temp.path(), Path::new(RESERVED_LIBRARY))
            .unwrap();
        assert_eq!(resolved, EmbeddedLibrary::virtual_path(RESERVED_LIBRARY));
        assert_eq!(importer.load(&resolved).unwrap(), KEEL_LIBRARY);
    }

    #[test]
    fn test_resolve_relative_then_includes() {
        let temp = tempdir().unwrap();
        let app = temp.path().join("app");
        let lib = temp.path().join("lib");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&lib).unwrap();
        fs::write(app.join("local.libsonnet"), "{}").unwrap();
        fs::write(lib.join("shared.libsonnet"), "{}").unwrap();

        let importer = Importer::new(&[lib.clone()]);
        assert_eq!(
            importer.resolve(&app, Path::new("local.libsonnet")).unwrap(),
            app.join("local.libsonnet")
        );
        assert_eq!(
            importer.resolve(&app, Path::new("shared.libsonnet")).unwrap(),
            lib.join("shared.libsonnet")
        );
    }

    #[test]
    fn test_later_include_wins() {
        let temp = tempdir().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        for dir in [&first, &second] {
            fs::create_dir_all(dir).unwrap();
            fs::write(dir.join("lib.libsonnet"), "{}").unwrap();
        }

        let importer = Importer::new(&[first, second.clone()]);
        let resolved = importer
            .resolve(&temp.path().join("nowhere"), Path::new("lib.libsonnet"))
            .unwrap();
        assert_eq!(resolved, second.join("lib.libsonnet"));
    }

    #[test]
    fn test_missing_import() {
        let temp = tempdir().unwrap();
        let err = Importer::new(&[])
            .resolve(temp.path(), Path::new("missing.libsonnet"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Import { ref path, .. } if path == "missing.libsonnet"));
    }

    #[test]
    fn test_embedded_library_load() {
        let library = EmbeddedLibrary::empty().with_file("extra.libsonnet", "{ a: 1 }");
        assert!(library.contains("extra.libsonnet"));
        assert!(!library.contains(RESERVED_LIBRARY));
        assert_eq!(
            library.load(&EmbeddedLibrary::virtual_path("extra.libsonnet")),
            Some("{ a: 1 }")
        );
        assert_eq!(library.load(Path::new("extra.libsonnet")), None);
    }

    #[test]
    fn test_release_external_vars() {
        let evaluator = StructuredEvaluator::new(Importer::new(&[]), &ReleaseInfo::new("1.0+b"))
            .with_external_vars(&[("env".to_string(), "prod".to_string())]);
        assert_eq!(
            evaluator.external_vars(),
            &[
                ("version".to_string(), "1.0+b".to_string()),
                ("image-tag".to_string(), "1.0-b".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]
        );
    }

    #[test]
    fn test_evaluate_missing_file() {
        let evaluator = StructuredEvaluator::new(Importer::new(&[]), &ReleaseInfo::new("1"));
        let err = evaluator
            .evaluate(Path::new("does/not/exist.jsonnet"))
            .err()
            .unwrap();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }
}
