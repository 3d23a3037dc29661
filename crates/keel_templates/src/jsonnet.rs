//! Jsonnet engine binding.
//!
//! Wires an [`StructuredEvaluator`] into a jrsonnet evaluation state and
//! exposes the (lazy) result as a [`TreeNode`]. Errors raised by our own
//! import resolver or native functions are kept and surfaced unchanged
//! instead of the engine's stringified copy.

use std::any::Any;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use jrsonnet_evaluator::error::{Error as JsonnetError, LocError, Result as JsonnetResult};
use jrsonnet_evaluator::native::{NativeCallback, NativeCallbackHandler};
use jrsonnet_evaluator::{EvaluationState, ImportResolver, Val};
use jrsonnet_gc::{unsafe_empty_trace, Finalize, Gc, Trace};
use jrsonnet_interner::IStr;
use jrsonnet_parser::{Param, ParamsDesc};
use serde_json::Value;
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::evaluator::{Importer, NativeFunction, StructuredEvaluator};
use crate::extractor::{NodeKind, TreeNode};

/// First host-side error raised during evaluation.
type Failure = Rc<RefCell<Option<TemplateError>>>;

fn record(failure: &Failure, err: TemplateError) {
    let mut slot = failure.borrow_mut();
    if slot.is_none() {
        *slot = Some(err);
    }
}

struct ImportBridge {
    importer: Importer,
    failure: Failure,
}

impl Finalize for ImportBridge {}
unsafe impl Trace for ImportBridge {
    unsafe_empty_trace!();
}

impl ImportResolver for ImportBridge {
    fn resolve_file(&self, from: &Path, path: &Path) -> JsonnetResult<Rc<Path>> {
        match self.importer.resolve(from, path) {
            Ok(resolved) => Ok(resolved.into()),
            Err(err) => {
                record(&self.failure, err);
                Err(LocError::new(JsonnetError::ImportFileNotFound(
                    from.to_path_buf(),
                    path.to_path_buf(),
                )))
            }
        }
    }

    fn load_file_contents(&self, resolved: &Path) -> JsonnetResult<IStr> {
        match self.importer.load(resolved) {
            Ok(content) => Ok(content.into()),
            Err(err) => {
                record(&self.failure, err);
                Err(LocError::new(JsonnetError::ResolvedFileNotFound(
                    resolved.to_path_buf(),
                )))
            }
        }
    }

    unsafe fn as_any(&self) -> &dyn Any {
        self
    }
}

struct NativeBridge {
    function: Arc<dyn NativeFunction>,
    failure: Failure,
}

impl Finalize for NativeBridge {}
unsafe impl Trace for NativeBridge {
    unsafe_empty_trace!();
}

impl NativeCallbackHandler for NativeBridge {
    fn call(&self, _from: Option<Rc<Path>>, args: &[Val]) -> JsonnetResult<Val> {
        let result = args
            .iter()
            .map(|arg| argument_to_json(self.function.name(), arg))
            .collect::<TemplateResult<Vec<_>>>()
            .and_then(|args| self.function.call(&args));

        match result {
            Ok(value) => Ok(Val::from(&value)),
            Err(err) => {
                let message = err.to_string();
                record(&self.failure, err);
                Err(LocError::new(JsonnetError::RuntimeError(message.into())))
            }
        }
    }
}

fn argument_to_json(function: &str, arg: &Val) -> TemplateResult<Value> {
    let unsupported = |kind: &str| TemplateError::NativeFunction {
        function: function.to_string(),
        message: format!("unsupported {} argument", kind),
    };

    match arg {
        Val::Str(s) => Ok(Value::String(s.to_string())),
        Val::Bool(b) => Ok(Value::Bool(*b)),
        Val::Null => Ok(Value::Null),
        Val::Num(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or_else(|| unsupported("non-finite number")),
        Val::Arr(_) => Err(unsupported("array")),
        Val::Obj(_) => Err(unsupported("object")),
        Val::Func(_) => Err(unsupported("function")),
    }
}

struct Context {
    state: EvaluationState,
    failure: Failure,
}

impl Context {
    fn error(&self, err: LocError) -> TemplateError {
        if let Some(failure) = self.failure.borrow_mut().take() {
            return failure;
        }
        TemplateError::Evaluation(self.state.stringify_err(&err))
    }
}

/// A lazily evaluated Jsonnet value.
#[derive(Clone)]
pub struct JsonnetNode {
    context: Rc<Context>,
    value: Val,
}

impl TreeNode for JsonnetNode {
    fn kind(&self) -> NodeKind {
        match &self.value {
            Val::Obj(_) => NodeKind::Object,
            Val::Arr(_) => NodeKind::Array,
            Val::Str(_) => NodeKind::String,
            Val::Num(_) => NodeKind::Number,
            Val::Bool(_) => NodeKind::Bool,
            Val::Null => NodeKind::Null,
            Val::Func(_) => NodeKind::Function,
        }
    }

    fn keys(&self) -> TemplateResult<Vec<String>> {
        match &self.value {
            Val::Obj(obj) => {
                let fields = self.context.state.run_in_state(|| obj.fields());
                Ok(fields.iter().map(|field| field.to_string()).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn has_key(&self, key: &str) -> bool {
        match &self.value {
            Val::Obj(obj) => self
                .context
                .state
                .run_in_state(|| obj.fields())
                .iter()
                .any(|field| &**field == key),
            _ => false,
        }
    }

    fn child(&self, key: &str) -> TemplateResult<Option<Self>> {
        let obj = match &self.value {
            Val::Obj(obj) => obj,
            _ => return Ok(None),
        };

        let value = self
            .context
            .state
            .run_in_state(|| obj.get(key.into()))
            .map_err(|err| self.context.error(err))?;

        Ok(value.map(|value| JsonnetNode {
            context: self.context.clone(),
            value,
        }))
    }

    fn to_json(&self) -> TemplateResult<Value> {
        let state = &self.context.state;
        let manifest = state
            .run_in_state(|| state.manifest(self.value.clone()))
            .map_err(|err| self.context.error(err))?;
        Ok(serde_json::from_str(&manifest)?)
    }
}

/// Evaluate `source` with the evaluator's imports, variables and natives.
pub(crate) fn evaluate(
    evaluator: &StructuredEvaluator,
    path: &Path,
    source: &str,
) -> TemplateResult<JsonnetNode> {
    let failure: Failure = Rc::new(RefCell::new(None));
    let state = EvaluationState::default();
    state.with_stdlib();

    state.set_import_resolver(Box::new(ImportBridge {
        importer: evaluator.importer().clone(),
        failure: failure.clone(),
    }));

    for (name, value) in evaluator.external_vars() {
        state.add_ext_str(name.as_str().into(), value.as_str().into());
    }

    for function in evaluator.natives() {
        debug!("Registering native function {}", function.name());
        let params = ParamsDesc(Rc::new(
            function
                .params()
                .iter()
                .map(|param| Param((*param).into(), None))
                .collect(),
        ));
        let handler = NativeBridge {
            function: function.clone(),
            failure: failure.clone(),
        };
        state.add_native(
            function.name().into(),
            Gc::new(NativeCallback::new(params, Box::new(handler))),
        );
    }

    let context = Rc::new(Context { state, failure });
    let value = context
        .state
        .evaluate_snippet_raw(Rc::from(path), source.into())
        .map_err(|err| context.error(err))?;

    Ok(JsonnetNode { context, value })
}
