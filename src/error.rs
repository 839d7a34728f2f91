//! Errors raised while registering, creating and configuring dependencies

use thiserror::Error;

/// Boxed error returned by user factories
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias
pub type Result<T, E = DiError> = std::result::Result<T, E>;

/// Reasons an injection token is rejected at registration time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("injection token cannot be empty")]
    Empty,
    #[error("injection token {0} cannot start with a dot")]
    LeadingDot(String),
    #[error("injection token {0} cannot end with a dot")]
    TrailingDot(String),
    #[error("injection token {0} cannot contain consecutive dots")]
    ConsecutiveDots(String),
    #[error("injection token {0} cannot contain the key separator '{1}'")]
    ReservedCharacter(String, char),
    #[error("injection token {0} already registered")]
    AlreadyRegistered(String),
}

/// Failures of the configuration path resolver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("injection token and configuration node path cannot be both empty")]
    EmptyPath,
    #[error("context carries no typed configuration")]
    MissingConfiguration,
    #[error("null value encountered in path '{path}' before '{segment}'")]
    NilInPath { path: String, segment: String },
    #[error("cannot access field '{segment}' on non-object value in path '{path}'")]
    NotNavigable { path: String, segment: String },
    #[error("field '{segment}' not found in path '{path}'")]
    FieldNotFound { path: String, segment: String },
    #[error("configuration node at '{path}' is not a valid {expected}: {reason}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        reason: String,
    },
}

/// Failures of the `${di.path}` reference resolver
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to parse document for DI resolution: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to resolve DI reference {placeholder}: {reason}")]
    Unresolved { placeholder: String, reason: String },
    #[error("failed to marshal referenced node {placeholder}: {source}")]
    Serialize {
        placeholder: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors triggered while wiring or resolving dependencies
#[derive(Error, Debug)]
pub enum DiError {
    #[error(transparent)]
    InvalidToken(#[from] TokenError),
    #[error("dependency not registered: {0}")]
    NotRegistered(String),
    #[error("configuration dependency not registered: {0}")]
    ConfigurationNotRegistered(String),
    #[error("configuration lookup failed: {0}")]
    Configuration(#[from] LookupError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to decode value: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("decoded value is not a {expected}")]
    DecodeShape { expected: &'static str },
    #[error("circular dependency detected while creating {key}")]
    Cycle { key: String },
    #[error("failed to create {type_name} (token: {token}, breadcrumbs: [{breadcrumbs}]): {source}")]
    Creation {
        type_name: &'static str,
        token: String,
        breadcrumbs: String,
        #[source]
        source: Box<DiError>,
    },
    #[error("{0}")]
    Factory(#[source] BoxError),
}

impl DiError {
    /// Wrap an arbitrary factory failure
    pub fn factory(err: impl Into<BoxError>) -> Self {
        DiError::Factory(err.into())
    }

    /// The key reported missing, if this is a top-level "not registered" failure.
    ///
    /// Wrapped failures of nested creations are not inspected.
    pub fn missing_key(&self) -> Option<&str> {
        match self {
            DiError::NotRegistered(key) | DiError::ConfigurationNotRegistered(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_not_registered(&self) -> bool {
        self.missing_key().is_some()
    }

    /// Walk `Creation` wrappers down to the original failure
    pub fn root(&self) -> &DiError {
        match self {
            DiError::Creation { source, .. } => source.root(),
            other => other,
        }
    }
}
