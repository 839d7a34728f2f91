//! Injection tokens and registry key derivation
//!
//! Registry entries are indexed by plain strings derived from the canonical
//! name of a type, optionally qualified by an [InjectionToken]:
//!
//! * ```type_key::<T>(None)``` gives the type name, e.g. ```my_app::Database```
//! * ```type_key::<T>(Some(&token))``` gives ```primary:my_app::Database```
//! * [pair_key] joins an instance key and its configuration key with ```;```
//!
//! One outer ```Arc<...>``` is stripped from the type name, so a value type and its
//! shared pointer resolve to the same registry entry.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::TokenError;

const TOKEN_SEPARATOR: char = '.';
const TOKEN_KEY_SEPARATOR: &str = ":";
const PAIR_SEPARATOR: &str = ";";

// Separators of registry keys
const RESERVED: [char; 2] = [':', ';'];

static REGISTERED_TOKENS: Lazy<Mutex<HashSet<Arc<str>>>> = Lazy::new(Mutex::default);

/// Validated name distinguishing several bindings of the same type.
///
/// Tokens are unique for the lifetime of the process: a given string can only be
/// registered once and is never released.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectionToken(Arc<str>);

impl InjectionToken {
    /// Validate and register a new token.
    ///
    /// The token must not be empty, start or end with a dot, contain consecutive dots,
    /// or contain the ```:``` and ```;``` key separators.
    pub fn register(raw: &str) -> Result<Self, TokenError> {
        validate(raw)?;

        let mut registered = REGISTERED_TOKENS.lock();
        if registered.contains(raw) {
            return Err(TokenError::AlreadyRegistered(raw.to_string()));
        }
        let token: Arc<str> = Arc::from(raw);
        registered.insert(token.clone());
        tracing::debug!(token = raw, "registered injection token");
        Ok(InjectionToken(token))
    }

    /// Check whether a token string has already been claimed
    pub fn is_registered(raw: &str) -> bool {
        REGISTERED_TOKENS.lock().contains(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments of the token
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(TOKEN_SEPARATOR)
    }
}

impl fmt::Display for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InjectionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str) -> Result<(), TokenError> {
    if raw.is_empty() {
        return Err(TokenError::Empty);
    }
    if raw.starts_with(TOKEN_SEPARATOR) {
        return Err(TokenError::LeadingDot(raw.to_string()));
    }
    if raw.ends_with(TOKEN_SEPARATOR) {
        return Err(TokenError::TrailingDot(raw.to_string()));
    }
    if raw.split(TOKEN_SEPARATOR).any(str::is_empty) {
        return Err(TokenError::ConsecutiveDots(raw.to_string()));
    }
    if let Some(reserved) = raw.chars().find(|c| RESERVED.contains(c)) {
        return Err(TokenError::ReservedCharacter(raw.to_string(), reserved));
    }
    Ok(())
}

/// Canonical name of a type, with one outer `Arc` removed
pub fn type_name_of<T: ?Sized>() -> &'static str {
    strip_shared(std::any::type_name::<T>())
}

fn strip_shared(name: &'static str) -> &'static str {
    let inner = ["alloc::sync::Arc<", "std::sync::Arc<"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix('>'));
    match inner {
        Some(inner) => inner
            .strip_suffix(", alloc::alloc::Global")
            .unwrap_or(inner),
        None => name,
    }
}

/// Derive a registry key from a type name and an optional token
pub fn type_key(type_name: &str, token: Option<&InjectionToken>) -> String {
    match token {
        Some(token) => format!("{}{}{}", token, TOKEN_KEY_SEPARATOR, type_name),
        None => type_name.to_string(),
    }
}

/// Derive the registry key of a type
pub fn type_key_of<T: ?Sized>(token: Option<&InjectionToken>) -> String {
    type_key(type_name_of::<T>(), token)
}

/// Join two keys of related types.
///
/// The order matters: the configuration side of a pair is registered under
/// ```pair_key(config, instance)``` and the instance side under ```pair_key(instance, config)```.
pub fn pair_key(first: &str, second: &str) -> String {
    format!("{}{}{}", first, PAIR_SEPARATOR, second)
}
