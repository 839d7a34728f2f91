//! Configuration path assembly and node lookup
//!
//! A dependency finds its configuration at ```<token>.<config node>``` inside the
//! configuration document. Paths are walked segment by segment through JSON objects;
//! a segment matches a key exactly or through its serialization alias, so that
//! ```PaymentBusinessLayer``` and ```paymentBusinessLayer``` both reach a
//! ```payment_business_layer``` key.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{LookupError, Result};
use crate::opts::RegistryOpts;

const PATH_SEPARATOR: char = '.';

/// Build the lookup path of a dependency from its token and configuration node
pub fn assemble_path(opts: &RegistryOpts) -> Result<String, LookupError> {
    let fragment = opts.config_node.as_str();
    let path = match &opts.token {
        None if fragment.is_empty() => return Err(LookupError::EmptyPath),
        None => fragment.to_string(),
        Some(token) if fragment.is_empty() => token.to_string(),
        Some(token) => format!("{}{}{}", token, PATH_SEPARATOR, fragment),
    };

    if path.is_empty() {
        return Err(LookupError::EmptyPath);
    }
    Ok(path)
}

/// Walk a dot-separated path through nested objects.
///
/// The empty path designates the root itself.
pub fn node_lookup(root: &Value, path: &str) -> Result<Value, LookupError> {
    if path.is_empty() {
        return Ok(root.clone());
    }

    let mut current = root;
    for segment in path.split(PATH_SEPARATOR) {
        let fields = match current {
            Value::Object(fields) => fields,
            Value::Null => {
                return Err(LookupError::NilInPath {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
            _ => {
                return Err(LookupError::NotNavigable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };

        current = find_field(fields, segment).ok_or_else(|| LookupError::FieldNotFound {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }

    Ok(current.clone())
}

/// Exact key first, then the first key matching as an alias
fn find_field<'a>(fields: &'a Map<String, Value>, segment: &str) -> Option<&'a Value> {
    fields.get(segment).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| alias_matches(key, segment))
            .map(|(_, field)| field)
    })
}

/// Compare a serialized key and a path segment, ignoring case and word separators
fn alias_matches(key: &str, segment: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    normalize(key) == normalize(segment)
}

/// Locate and decode the configuration of a dependency.
///
/// A configuration set in the options is used as is. Otherwise the path is assembled
/// from the options and looked up in the typed configuration of the context.
pub fn configuration_lookup<T: DeserializeOwned>(ctx: &Context, opts: &RegistryOpts) -> Result<T> {
    if let Some(preset) = &opts.configuration {
        return narrow(preset.clone(), "<preset>");
    }

    let configuration = ctx
        .configuration()
        .ok_or(LookupError::MissingConfiguration)?;
    let path = assemble_path(opts)?;
    tracing::trace!(path = %path, breadcrumbs = ?ctx.breadcrumbs(), "configuration lookup");
    let node = configuration.lookup_node(&path)?;
    narrow(node, &path)
}

/// Look up a node in the raw configuration tree of a context
pub fn raw_lookup(ctx: &Context, path: &str) -> Result<Value, LookupError> {
    let raw = ctx.raw_configuration();
    if path.is_empty() {
        return Ok(Value::Object(raw.clone()));
    }

    // Resolve the first segment on the map itself to avoid cloning the whole tree
    let (head, rest) = path.split_once(PATH_SEPARATOR).unwrap_or((path, ""));
    let field = find_field(raw, head).ok_or_else(|| LookupError::FieldNotFound {
        path: path.to_string(),
        segment: head.to_string(),
    })?;
    node_lookup(field, rest).map_err(|err| relocate(err, path))
}

fn relocate(err: LookupError, full_path: &str) -> LookupError {
    match err {
        LookupError::NilInPath { segment, .. } => LookupError::NilInPath {
            path: full_path.to_string(),
            segment,
        },
        LookupError::NotNavigable { segment, .. } => LookupError::NotNavigable {
            path: full_path.to_string(),
            segment,
        },
        LookupError::FieldNotFound { segment, .. } => LookupError::FieldNotFound {
            path: full_path.to_string(),
            segment,
        },
        other => other,
    }
}

fn narrow<T: DeserializeOwned>(node: Value, path: &str) -> Result<T> {
    serde_json::from_value(node).map_err(|err| {
        LookupError::TypeMismatch {
            path: path.to_string(),
            expected: std::any::type_name::<T>(),
            reason: err.to_string(),
        }
        .into()
    })
}
