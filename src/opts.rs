//! Per-call options of registration and creation

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::registry::{global, Registry};
use crate::token::InjectionToken;

/// Options driving registration and creation calls.
///
/// The token together with the configuration node locate the configuration of a
/// dependency, see [crate::lookup::assemble_path].
#[derive(Clone)]
pub struct RegistryOpts {
    pub registry: Arc<dyn Registry>,
    pub token: Option<InjectionToken>,
    pub config_node: String,
    /// Pre-resolved configuration, bypassing the node lookup
    pub configuration: Option<Value>,
}

impl Default for RegistryOpts {
    fn default() -> Self {
        Self {
            registry: global(),
            token: None,
            config_node: String::new(),
            configuration: None,
        }
    }
}

impl RegistryOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an option mutator, e.g. one of [with_token] or [with_config_node]
    pub fn apply(mut self, mutator: impl FnOnce(&mut RegistryOpts)) -> Self {
        mutator(&mut self);
        self
    }

    pub fn with_registry(mut self, registry: &Arc<dyn Registry>) -> Self {
        with_registry(registry)(&mut self);
        self
    }

    pub fn with_token(mut self, token: &InjectionToken) -> Self {
        with_token(token)(&mut self);
        self
    }

    /// Append a fragment to the configuration node path
    pub fn with_config_node(mut self, path: &str) -> Self {
        with_config_node(path)(&mut self);
        self
    }

    pub fn with_configuration(mut self, configuration: impl Into<Value>) -> Self {
        with_configuration(configuration.into())(&mut self);
        self
    }

    pub fn token_str(&self) -> &str {
        self.token.as_ref().map(InjectionToken::as_str).unwrap_or("")
    }

    /// Snapshot stored along a registration, without the registry handle.
    pub(crate) fn detached(&self) -> RegistrationOpts {
        RegistrationOpts {
            token: self.token.clone(),
            config_node: self.config_node.clone(),
        }
    }
}

impl fmt::Debug for RegistryOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryOpts")
            .field("token", &self.token)
            .field("config_node", &self.config_node)
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

/// Options captured at registration time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationOpts {
    pub token: Option<InjectionToken>,
    pub config_node: String,
}

/// Replace all options with a copy of the provided ones
pub fn with_opts(opts: &RegistryOpts) -> impl FnOnce(&mut RegistryOpts) + '_ {
    move |target| *target = opts.clone()
}

pub fn with_registry(registry: &Arc<dyn Registry>) -> impl FnOnce(&mut RegistryOpts) + '_ {
    move |opts| opts.registry = registry.clone()
}

pub fn with_token(token: &InjectionToken) -> impl FnOnce(&mut RegistryOpts) + '_ {
    move |opts| opts.token = Some(token.clone())
}

/// Append a fragment to the configuration node path, joining with a dot
pub fn with_config_node(path: &str) -> impl FnOnce(&mut RegistryOpts) + '_ {
    move |opts| {
        if opts.config_node.is_empty() {
            opts.config_node = path.to_string();
        } else {
            opts.config_node = format!("{}.{}", opts.config_node, path);
        }
    }
}

/// Bypass the configuration lookup with an already resolved node
pub fn with_configuration(configuration: Value) -> impl FnOnce(&mut RegistryOpts) {
    move |opts| opts.configuration = Some(configuration)
}
