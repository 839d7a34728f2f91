//! Expansion of `${di.<path>}` references in configuration documents
//!
//! A document may declare reusable nodes, usually in a `$shared` top-level section,
//! and point at them from anywhere a value is expected:
//!
//! ```json
//! {
//!   "$shared": { "cache": { "host": "redis" } },
//!   "sessions": { "cache": ${di.$shared.cache} },
//!   "payments": { "cache": "${di.$shared.cache}" }
//! }
//! ```
//!
//! Expansion is textual and runs before the document is deserialized:
//!
//! 1. bare placeholders following a `:` are quoted so the document becomes valid JSON,
//! 2. a skeleton is parsed with every placeholder replaced by `null`,
//! 3. each distinct placeholder of the original text is resolved against the skeleton,
//! 4. every quoted or bare occurrence is replaced with the JSON text of its node.
//!
//! References are resolved in a single pass against the skeleton: a placeholder
//! pointing at another placeholder resolves to `null`, never to the final node.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::{ConfigRawData, Context};
use crate::error::{Result, TemplateError};

/// Conventional name of the section holding shared nodes
pub const SHARED_SECTION: &str = "$shared";

const PATH_SEPARATOR: char = '.';

// Placeholder with its optional surrounding quotes
static QUOTED_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']?(\$\{di\.([^}]+)\})["']?"#).expect("valid regex"));

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{di\.([^}]+)\}").expect("valid regex"));

// Bare placeholder used as a value
static BARE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*(\$\{di\.[^}]+\})([,\s}\]])").expect("valid regex"));

/// Replace every `${di.<path>}` reference with the node it points to
pub fn resolve_references(document: &str) -> Result<String, TemplateError> {
    let valid = quote_bare_references(document);

    let skeleton = QUOTED_REFERENCE.replace_all(&valid, "null");
    let data: ConfigRawData =
        serde_json::from_str(&skeleton).map_err(TemplateError::Malformed)?;

    // Resolve everything before touching the text: a failure leaves nothing half-expanded
    let mut replacements: Vec<(String, String)> = Vec::new();
    for placeholder in find_references(document) {
        let path = reference_path(&placeholder);
        let node = extract_node(&data, path)?;
        let text = serde_json::to_string(&node).map_err(|source| TemplateError::Serialize {
            placeholder: placeholder.clone(),
            source,
        })?;
        tracing::trace!(placeholder = %placeholder, "resolved DI reference");
        replacements.push((placeholder, text));
    }

    let mut result = valid;
    for (placeholder, text) in &replacements {
        result = result.replace(&format!("\"{}\"", placeholder), text);
        result = result.replace(placeholder.as_str(), text);
    }
    if !replacements.is_empty() {
        tracing::debug!(references = replacements.len(), "expanded DI references");
    }
    Ok(result)
}

/// Quote bare placeholders used as values, leaving quoted ones untouched
fn quote_bare_references(document: &str) -> String {
    BARE_REFERENCE
        .replace_all(document, r#": "$1"$2"#)
        .into_owned()
}

/// Path part of a `${di.<path>}` placeholder
fn reference_path(placeholder: &str) -> &str {
    placeholder
        .strip_prefix("${di.")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(placeholder)
}

/// Distinct placeholders of a document, in order of first appearance
pub fn find_references(document: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    REFERENCE
        .find_iter(document)
        .map(|found| found.as_str())
        .filter(|placeholder| seen.insert(*placeholder))
        .map(str::to_string)
        .collect()
}

/// Check that every placeholder of a document resolves in the given data
pub fn validate_references(document: &str, data: &Map<String, Value>) -> Result<(), TemplateError> {
    for placeholder in find_references(document) {
        extract_node(data, reference_path(&placeholder))?;
    }
    Ok(())
}

/// Walk a dot-separated path through nested objects only
pub fn extract_node(data: &Map<String, Value>, path: &str) -> Result<Value, TemplateError> {
    if path.is_empty() {
        return Ok(Value::Object(data.clone()));
    }

    let unresolved = |reason: String| TemplateError::Unresolved {
        placeholder: format!("${{di.{}}}", path),
        reason,
    };

    let mut current = data;
    let mut segments = path.split(PATH_SEPARATOR).peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment).ok_or_else(|| {
            unresolved(format!(
                "path component '{}' not found in path '{}'",
                segment, path
            ))
        })?;
        if segments.peek().is_none() {
            return Ok(value.clone());
        }
        current = value.as_object().ok_or_else(|| {
            unresolved(format!(
                "path component '{}' is not an object, cannot navigate further in path '{}'",
                segment, path
            ))
        })?;
    }
    Ok(Value::Object(current.clone()))
}

/// Expand references and deserialize the document
pub fn from_str_with_references<T: DeserializeOwned>(document: &str) -> Result<T, TemplateError> {
    let resolved = resolve_references(document)?;
    serde_json::from_str(&resolved).map_err(TemplateError::Malformed)
}

/// Expand references and load the document into a new context.
///
/// The expanded tree is both the raw configuration and the typed configuration of the context.
pub fn context_from_document(document: &str) -> Result<Context> {
    let raw: ConfigRawData = from_str_with_references(document)?;
    Context::builder().configuration(raw.clone()).raw(raw).build()
}
