//! Type-erased values flowing through the registry

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

type Shared = Arc<dyn Any + Send + Sync>;

/// Marker configuration type for pairs whose instance needs no configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoConfig;

impl NoConfig {
    pub(crate) fn is<CT: 'static>() -> bool {
        TypeId::of::<CT>() == TypeId::of::<NoConfig>()
            || TypeId::of::<CT>() == TypeId::of::<Arc<NoConfig>>()
    }
}

/// Shared, type-erased value produced by a factory.
///
/// Cloning an instance is cheap and keeps pointing to the same allocation,
/// which is what makes cached singletons identity-equal.
#[derive(Clone)]
pub struct Instance {
    value: Shared,
    type_name: &'static str,
    share: fn(&Shared) -> Option<Box<dyn Any>>,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            share: share_as_arc::<T>,
        }
    }

    /// Name of the stored type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.as_ref().type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_ref().downcast_ref::<T>()
    }

    /// Check if two instances share the same allocation
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    /// Narrow the instance to the requested type.
    ///
    /// Besides an exact match, two conversions are supported between a type ```T```
    /// and its shared pointer ```Arc<T>```:
    /// * a stored ```Arc<T>``` requested as ```T``` yields a clone of the pointee
    /// * a stored ```T``` requested as ```Arc<T>``` yields the stored allocation itself
    pub fn coerce<T: Clone + 'static>(&self) -> Option<T> {
        if let Some(direct) = self.downcast_ref::<T>() {
            return Some(direct.clone());
        }
        if let Some(shared) = self.downcast_ref::<Arc<T>>() {
            return Some(T::clone(shared));
        }
        (self.share)(&self.value)
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn share_as_arc<T: Any + Send + Sync>(value: &Shared) -> Option<Box<dyn Any>> {
    let shared: Arc<T> = value.clone().downcast::<T>().ok()?;
    Some(Box::new(shared))
}

/// Attempt to narrow an opaque instance, see [Instance::coerce]
pub fn safe_type_assert<T: Clone + 'static>(instance: &Instance) -> Option<T> {
    instance.coerce::<T>()
}

/// Narrow an instance produced by the registry, panicking on a mismatch.
///
/// A mismatch means a factory was bound to the wrong key, which callers cannot recover from.
pub(crate) fn coerce_or_panic<T: Clone + 'static>(instance: &Instance, key: &str) -> T {
    match instance.coerce::<T>() {
        Some(typed) => typed,
        None => panic!(
            "TypeMismatch: failed to cast dependency {} to expected type {} (stored {})",
            key,
            std::any::type_name::<T>(),
            instance.type_name()
        ),
    }
}
