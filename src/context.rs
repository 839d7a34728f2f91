//! Creation context shared by the factories of a dependency graph
//!
//! A [Context] carries:
//!
//! * the raw configuration tree, already expanded by [crate::template],
//! * an optional typed [Configuration] able to look up nodes by path,
//! * the breadcrumbs: tokens accumulated while creation recurses into dependencies,
//! * an [ExecutionScope] carrying cancellation and deadline of the surrounding work.
//!
//! Every top-level creation clones the context: tree, configuration and scope are
//! shared while the breadcrumbs are copied, so that sibling branches of the
//! dependency graph never observe each other's breadcrumbs.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{DiError, LookupError, Result};
use crate::lookup::node_lookup;
use crate::token::InjectionToken;

/// Generic nested-map form of a configuration document
pub type ConfigRawData = Map<String, Value>;

/// Typed configuration source.
///
/// Implementors only need to expose a JSON view of themselves. The default
/// [Configuration::lookup_node] walks that view with [node_lookup]; types with a
/// cheaper access path can override it.
pub trait Configuration: Send + Sync {
    fn to_value(&self) -> Result<Value, serde_json::Error>;

    fn lookup_node(&self, path: &str) -> Result<Value, LookupError> {
        let root = self.to_value().map_err(|err| LookupError::TypeMismatch {
            path: path.to_string(),
            expected: "configuration document",
            reason: err.to_string(),
        })?;
        node_lookup(&root, path)
    }

    /// Decode the configuration into its raw tree form
    fn to_raw(&self) -> Result<ConfigRawData> {
        match self.to_value()? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(ConfigRawData::new()),
            _ => Err(DiError::DecodeShape {
                expected: "configuration map",
            }),
        }
    }
}

impl Configuration for Value {
    fn to_value(&self) -> Result<Value, serde_json::Error> {
        Ok(self.clone())
    }

    fn lookup_node(&self, path: &str) -> Result<Value, LookupError> {
        node_lookup(self, path)
    }
}

impl Configuration for ConfigRawData {
    fn to_value(&self) -> Result<Value, serde_json::Error> {
        Ok(Value::Object(self.clone()))
    }

    fn to_raw(&self) -> Result<ConfigRawData> {
        Ok(self.clone())
    }
}

/// Cancellation and deadline of the work a creation runs for
#[derive(Clone, Debug, Default)]
pub struct ExecutionScope {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecutionScope {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancelled explicitly, or past its deadline
    pub fn is_done(&self) -> bool {
        self.cancellation.is_cancelled()
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }
}

/// Dependency creation context
#[derive(Clone, Default)]
pub struct Context {
    raw: Arc<ConfigRawData>,
    configuration: Option<Arc<dyn Configuration>>,
    breadcrumbs: Vec<String>,
    execution: ExecutionScope,
}

impl Context {
    /// Empty context: no configuration and a fresh execution scope
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Build a context from arguments classified by their kind, in any order.
    ///
    /// See [ContextBuilder] for the inheritance rules.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<ContextArg>,
    {
        args.into_iter()
            .fold(ContextBuilder::default(), |builder, arg| builder.arg(arg))
            .build()
    }

    pub fn raw_configuration(&self) -> &ConfigRawData {
        &self.raw
    }

    pub fn configuration(&self) -> Option<&Arc<dyn Configuration>> {
        self.configuration.as_ref()
    }

    pub fn execution(&self) -> &ExecutionScope {
        &self.execution
    }

    pub fn is_cancelled(&self) -> bool {
        self.execution.is_done()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.execution.deadline()
    }

    pub fn breadcrumbs(&self) -> &[String] {
        &self.breadcrumbs
    }

    /// Push a token on the breadcrumb stack, nothing happens without token
    pub fn append_breadcrumb(&mut self, token: Option<&InjectionToken>) {
        if let Some(token) = token {
            self.breadcrumbs.push(token.to_string());
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("raw", &self.raw)
            .field("configuration", &self.configuration.is_some())
            .field("breadcrumbs", &self.breadcrumbs)
            .field("execution", &self.execution)
            .finish()
    }
}

/// Argument of [Context::from_args]
pub enum ContextArg {
    Parent(Context),
    Raw(ConfigRawData),
    Configuration(Arc<dyn Configuration>),
    Execution(ExecutionScope),
}

impl From<Context> for ContextArg {
    fn from(ctx: Context) -> Self {
        ContextArg::Parent(ctx)
    }
}

impl From<&Context> for ContextArg {
    fn from(ctx: &Context) -> Self {
        ContextArg::Parent(ctx.clone())
    }
}

impl From<ConfigRawData> for ContextArg {
    fn from(raw: ConfigRawData) -> Self {
        ContextArg::Raw(raw)
    }
}

impl From<Arc<dyn Configuration>> for ContextArg {
    fn from(cfg: Arc<dyn Configuration>) -> Self {
        ContextArg::Configuration(cfg)
    }
}

impl From<ExecutionScope> for ContextArg {
    fn from(scope: ExecutionScope) -> Self {
        ContextArg::Execution(scope)
    }
}

impl From<CancellationToken> for ContextArg {
    fn from(token: CancellationToken) -> Self {
        ContextArg::Execution(ExecutionScope::new(token))
    }
}

/// Builder for [Context].
///
/// Raw tree, typed configuration and execution scope are inherited from the parent
/// unless set explicitly. An explicit typed configuration always provides the raw
/// tree through [Configuration::to_raw], replacing any raw tree given alongside it.
/// Breadcrumbs always start empty.
#[derive(Default)]
pub struct ContextBuilder {
    parent: Option<Context>,
    raw: Option<ConfigRawData>,
    configuration: Option<Arc<dyn Configuration>>,
    execution: Option<ExecutionScope>,
}

impl ContextBuilder {
    pub fn parent(mut self, parent: &Context) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn raw(mut self, raw: ConfigRawData) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn configuration(mut self, configuration: impl Configuration + 'static) -> Self {
        self.configuration = Some(Arc::new(configuration));
        self
    }

    pub fn shared_configuration(mut self, configuration: Arc<dyn Configuration>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn execution(mut self, execution: ExecutionScope) -> Self {
        self.execution = Some(execution);
        self
    }

    /// Set whichever field matches the kind of the argument
    pub fn arg(mut self, arg: impl Into<ContextArg>) -> Self {
        match arg.into() {
            ContextArg::Parent(parent) => self.parent = Some(parent),
            ContextArg::Raw(raw) => self.raw = Some(raw),
            ContextArg::Configuration(cfg) => self.configuration = Some(cfg),
            ContextArg::Execution(scope) => self.execution = Some(scope),
        }
        self
    }

    pub fn build(self) -> Result<Context> {
        let ContextBuilder {
            parent,
            raw,
            mut configuration,
            mut execution,
        } = self;

        let mut raw = match &configuration {
            Some(configuration) => Some(Arc::new(configuration.to_raw()?)),
            None => raw.map(Arc::new),
        };
        if let Some(parent) = parent {
            if raw.is_none() {
                raw = Some(parent.raw);
            }
            if configuration.is_none() {
                configuration = parent.configuration;
            }
            if execution.is_none() {
                execution = Some(parent.execution);
            }
        }

        Ok(Context {
            raw: raw.unwrap_or_default(),
            configuration,
            breadcrumbs: Vec::new(),
            execution: execution.unwrap_or_default(),
        })
    }
}
