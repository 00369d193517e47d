//! Method catalog: the typed, registered surface the interpreter's Task
//! states dispatch into.
//!
//! Rust has no runtime reflection, so the catalog is built once, up front:
//! each method is registered with its ordered parameter descriptors, return
//! descriptor, and a boxed async handler. From those descriptors the
//! catalog derives both the metadata document embedded into LLM prompts
//! ([`MethodCatalog::metadata_document`]) and the per-parameter coercions
//! applied before every invocation. The finished catalog is immutable and
//! shared behind an `Arc`.
//!
//! Handlers receive their arguments as JSON values already coerced to the
//! declared kinds; unparseable arguments arrive as `null`, and coercion
//! never fails a call on its own. A handler may return a single value or a
//! stream; streams are drained fully into a sequence before the result is
//! handed back to the interpreter.

pub(crate) mod marshal;
mod schema;

pub use schema::{AslKind, Descriptor, ObjectType, ValueFormat};

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::recorder::OutputRecorder;

/// Error surfaced by a domain method handler.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{method}: {message}")]
#[diagnostic(code(statesman::catalog::host))]
pub struct HostError {
    pub method: String,
    pub message: String,
}

impl HostError {
    pub fn msg<M: Into<String>>(method: impl Into<String>, message: M) -> Self {
        Self {
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Errors raised when resolving or invoking a catalog method.
#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    /// No registered method matches the name (case-insensitive) and arity.
    #[error("no method '{name}' taking {arity} argument(s)")]
    #[diagnostic(
        code(statesman::catalog::unknown_method),
        help("Method lookup matches the name case-insensitively and requires an exact argument count.")
    )]
    UnknownMethod { name: String, arity: usize },

    /// The handler reported a failure.
    #[error(transparent)]
    #[diagnostic(code(statesman::catalog::host))]
    Host(#[from] HostError),

    /// The invocation was cancelled while draining a result stream.
    #[error("invocation cancelled")]
    #[diagnostic(code(statesman::catalog::cancelled))]
    Cancelled,
}

/// What a handler produces: one value, or a stream drained into a sequence.
pub enum MethodOutput {
    Value(Value),
    Stream(BoxStream<'static, Result<Value, HostError>>),
}

impl MethodOutput {
    /// Convenience for the common single-value case.
    pub fn value(v: Value) -> Result<Self, HostError> {
        Ok(MethodOutput::Value(v))
    }
}

/// Boxed async handler. Arguments arrive positionally, coerced to the
/// declared parameter kinds.
pub type MethodHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<MethodOutput, HostError>> + Send + Sync>;

/// A parameter compiled at catalog construction: its descriptor plus the
/// resolved enum member list when the descriptor references one.
#[derive(Clone)]
pub(crate) struct CompiledParam {
    pub name: String,
    pub descriptor: Descriptor,
    pub enum_members: Option<Arc<Vec<String>>>,
}

/// A registered method: descriptors fixed at registration, handler boxed.
#[derive(Clone)]
pub struct Method {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) params: Vec<CompiledParam>,
    pub(crate) returns: Descriptor,
    pub(crate) handler: MethodHandler,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Registration-time description of one method; consumed by
/// [`CatalogBuilder::method`].
pub struct MethodSpec {
    name: String,
    description: Option<String>,
    params: Vec<(String, Descriptor)>,
    returns: Descriptor,
    handler: Option<MethodHandler>,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
            returns: Descriptor::any(),
            handler: None,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Appends a parameter; declaration order is invocation order.
    pub fn param(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.params.push((name.into(), descriptor));
        self
    }

    pub fn returns(mut self, descriptor: Descriptor) -> Self {
        self.returns = descriptor;
        self
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, Result<MethodOutput, HostError>>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Arc::new(f));
        self
    }
}

/// Immutable dispatch table keyed by case-insensitive `(name, arity)`.
///
/// # Examples
///
/// ```rust
/// use futures_util::FutureExt;
/// use serde_json::json;
/// use statesman::catalog::{Descriptor, MethodCatalog, MethodOutput, MethodSpec};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let catalog = MethodCatalog::builder()
///     .method(
///         MethodSpec::new("Double")
///             .describe("Doubles a number")
///             .param("value", Descriptor::number())
///             .returns(Descriptor::number())
///             .handler(|args| {
///                 async move {
///                     let n = args[0].as_f64().unwrap_or(0.0);
///                     MethodOutput::value(json!(n * 2.0))
///                 }
///                 .boxed()
///             }),
///     )
///     .build();
///
/// let out = catalog
///     .invoke("double", vec![json!("21")], &Default::default())
///     .await
///     .unwrap();
/// assert_eq!(out, json!(42.0));
/// # }
/// ```
pub struct MethodCatalog {
    methods: Vec<Method>,
    index: FxHashMap<(String, usize), usize>,
    types: Vec<ObjectType>,
    enums: Vec<(String, Vec<String>)>,
}

impl MethodCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Case-insensitive lookup requiring an exact argument count.
    pub fn lookup(&self, name: &str, arity: usize) -> Option<&Method> {
        self.index
            .get(&(name.to_lowercase(), arity))
            .map(|&i| &self.methods[i])
    }

    /// Resolves and invokes a method: coerces each argument to its declared
    /// parameter kind, awaits the handler, drains a stream result into a
    /// sequence (cooperatively cancellable), and canonicalises the return
    /// value per the declared return descriptor.
    pub async fn invoke(
        &self,
        name: &str,
        args: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, CatalogError> {
        let method = self
            .lookup(name, args.len())
            .ok_or_else(|| CatalogError::UnknownMethod {
                name: name.to_string(),
                arity: args.len(),
            })?;
        debug!(method = method.name.as_str(), arity = args.len(), "invoking");

        let coerced: Vec<Value> = args
            .iter()
            .zip(&method.params)
            .map(|(arg, param)| marshal::coerce_argument(arg, param))
            .collect();

        let output = (method.handler)(coerced).await?;
        let value = match output {
            MethodOutput::Value(v) => v,
            MethodOutput::Stream(stream) => drain_stream(stream, cancel).await?,
        };
        Ok(marshal::canonicalise_return(value, &method.returns))
    }

    /// All registered methods, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }

    /// The metadata document (`Methods` / `Types` / `Enums`) embedded
    /// verbatim into LLM prompts. Structurally stable: generating it twice
    /// yields equal documents.
    pub fn metadata_document(&self) -> Value {
        schema::metadata_document(&self.methods, &self.types, &self.enums)
    }
}

async fn drain_stream(
    mut stream: BoxStream<'static, Result<Value, HostError>>,
    cancel: &CancellationToken,
) -> Result<Value, CatalogError> {
    let mut items = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
            next = stream.next() => match next {
                Some(Ok(item)) => items.push(item),
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
        }
    }
    Ok(Value::Array(items))
}

/// Collects type definitions and method specs; `build` freezes them into a
/// [`MethodCatalog`], resolving enum references into per-parameter member
/// lists. Type names are registered before their shapes are consulted, so
/// mutually-referential object types are fine.
#[derive(Default)]
pub struct CatalogBuilder {
    methods: Vec<MethodSpec>,
    types: Vec<ObjectType>,
    enums: Vec<(String, Vec<String>)>,
}

impl CatalogBuilder {
    pub fn method(mut self, spec: MethodSpec) -> Self {
        self.methods.push(spec);
        self
    }

    /// Registers a composite type referenced by `object as <name>`
    /// descriptors.
    pub fn object_type(mut self, ty: ObjectType) -> Self {
        self.types.push(ty);
        self
    }

    /// Registers an enum referenced by `enum:<name>` formats.
    pub fn enum_type<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums.push((
            name.into(),
            members.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Registers the canonical `RecordOutput` method: appends
    /// `(category, content)` to the shared recorder. This is how Task
    /// states contribute data to the final rendering prompt.
    pub fn record_output(self, recorder: Arc<OutputRecorder>) -> Self {
        self.method(
            MethodSpec::new("RecordOutput")
                .describe(
                    "Records a piece of collected data under a category so it \
                     appears in the final answer. Call this for every result \
                     worth reporting.",
                )
                .param(
                    "category",
                    Descriptor::string().describe("Short label for the recorded data"),
                )
                .param("content", Descriptor::any().describe("The data to record"))
                .returns(Descriptor::null())
                .handler(move |mut args| {
                    let recorder = Arc::clone(&recorder);
                    Box::pin(async move {
                        let content = args.pop().unwrap_or(Value::Null);
                        let category = match args.pop() {
                            Some(Value::String(s)) => s,
                            Some(other) => other.to_string(),
                            None => String::new(),
                        };
                        recorder.record(category, content);
                        MethodOutput::value(Value::Null)
                    })
                }),
        )
    }

    pub fn build(self) -> MethodCatalog {
        let enums = self.enums;
        let mut methods = Vec::with_capacity(self.methods.len());
        let mut index = FxHashMap::default();
        for spec in self.methods {
            let params = spec
                .params
                .into_iter()
                .map(|(name, descriptor)| {
                    let enum_members = descriptor.enum_name().and_then(|enum_name| {
                        enums
                            .iter()
                            .find(|(n, _)| n == enum_name)
                            .map(|(_, members)| Arc::new(members.clone()))
                    });
                    CompiledParam {
                        name,
                        descriptor,
                        enum_members,
                    }
                })
                .collect();
            let handler = spec
                .handler
                .unwrap_or_else(|| Arc::new(|_| Box::pin(async { MethodOutput::value(Value::Null) })));
            let method = Method {
                name: spec.name,
                description: spec.description,
                params,
                returns: spec.returns,
                handler,
            };
            index.insert((method.name.to_lowercase(), method.arity()), methods.len());
            methods.push(method);
        }
        MethodCatalog {
            methods,
            index,
            types: self.types,
            enums,
        }
    }
}
