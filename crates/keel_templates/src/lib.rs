//! # keel_templates
//!
//! Deployment artifact templating for keel.
//!
//! Two rendering modes share one [`ResolverRegistry`] of placeholder values:
//!
//! - **Structured**: a Jsonnet script is evaluated, resource objects (those
//!   carrying the marker field, `apiVersion` by default) are extracted from
//!   the result and assembled into a single Kubernetes `List` document.
//! - **Flat**: `${NAME}` and `${PREFIX(ARG)}` tokens in plain text are
//!   replaced with resolved values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use keel_templates::{FilterPath, Pipeline, PipelineConfig, ReleaseInfo, ResolverRegistry};
//!
//! let config = PipelineConfig::new()
//!     .with_include("lib")
//!     .with_external_var("env", "prod")
//!     .with_filter(FilterPath::parse("app.prod").unwrap())
//!     .disable_sentry(true);
//!
//! let registry = ResolverRegistry::from_config(&config, &ReleaseInfo::detect(), None);
//! let pipeline = Pipeline::new(config, Arc::new(registry));
//!
//! let output = pipeline.render_structured(Path::new("deploy.jsonnet")).unwrap();
//! print!("{}", output.render().unwrap());
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expander;
pub mod extractor;
pub mod jsonnet;
pub mod mock;
pub mod natives;
pub mod pipeline;
pub mod registry;
pub mod secrets;
pub mod version;

pub use assembler::{OutputDocument, ResourceList};
pub use config::{parse_external_vars, FilterPath, KeelConfig, PipelineConfig, SentrySettings};
pub use error::{TemplateError, TemplateResult};
pub use evaluator::{EmbeddedLibrary, Importer, NativeFunction, StructuredEvaluator};
pub use expander::FlatExpander;
pub use extractor::{NodeKind, ResourceExtractor, TreeNode};
pub use jsonnet::JsonnetNode;
pub use mock::MockSecretService;
pub use natives::{standard_natives, EnvFileFunction, SentryFunction};
pub use pipeline::Pipeline;
pub use registry::ResolverRegistry;
pub use secrets::{SecretService, SentryClient};
pub use version::ReleaseInfo;
