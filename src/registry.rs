//! Type-keyed storage of factories and singleton instances
//!
//! The registry is a plain map from string keys (see [crate::token]) to type-erased
//! factories. It knows nothing about the concrete types: the typed entry points in
//! [crate::create] derive keys and narrow the produced [Instance]s.
//!
//! Two namespaces are kept apart: instance factories and configuration factories.
//! A third map stores the hot instances, the cached singletons produced by these
//! factories.
//!
//! Registries have a two-phase lifecycle. Factories are registered during the
//! wiring phase, which is expected to be single-threaded. Creation calls then run
//! concurrently; only the hot-instance map is mutated in this phase, and each cache
//! slot is guarded so that a factory runs at most once per key.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::error::{DiError, Result};
use crate::instance::Instance;
use crate::opts::{RegistrationOpts, RegistryOpts};
use crate::token::type_key;

/// Erased instance factory, receiving the configuration instance of its pair
pub type CreateInstanceHandler =
    Arc<dyn Fn(&Context, &RegistryOpts, Instance) -> Result<Instance> + Send + Sync>;

/// Erased configuration factory
pub type CreateConfigurationHandler =
    Arc<dyn Fn(&Context, &RegistryOpts) -> Result<Instance> + Send + Sync>;

/// Dependency injection container.
///
/// All creation methods receive the context and the options of the current call.
pub trait Registry: Send + Sync {
    /// Store an instance factory. An existing factory for the same key is replaced.
    fn register(&self, type_key: &str, handler: CreateInstanceHandler, opts: &RegistryOpts)
        -> Result<()>;

    /// Store a configuration factory. An existing factory for the same key is replaced.
    fn register_configuration(
        &self,
        type_key: &str,
        handler: CreateConfigurationHandler,
        opts: &RegistryOpts,
    ) -> Result<()>;

    /// Invoke the instance factory stored under the key
    fn create(
        &self,
        ctx: &Context,
        type_key: &str,
        config: Instance,
        opts: &RegistryOpts,
    ) -> Result<Instance>;

    /// Invoke the configuration factory stored under the key
    fn create_configuration(
        &self,
        ctx: &Context,
        type_key: &str,
        opts: &RegistryOpts,
    ) -> Result<Instance>;

    /// Retrieve a cached instance, failing with [DiError::NotRegistered] on a miss
    fn get_hot_instance(&self, ctx: &Context, opts: &RegistryOpts, type_key: &str)
        -> Result<Instance>;

    fn set_hot_instance(
        &self,
        ctx: &Context,
        opts: &RegistryOpts,
        type_key: &str,
        instance: Instance,
    ) -> Result<()>;

    /// Retrieve a cached instance or build it with `init`.
    ///
    /// Concurrent callers for the same key wait for the first construction,
    /// `init` is called at most once per successful construction.
    fn get_or_init_hot_instance(
        &self,
        ctx: &Context,
        opts: &RegistryOpts,
        type_key: &str,
        init: &mut dyn FnMut() -> Result<Instance>,
    ) -> Result<Instance>;
}

/// Cache key of a hot instance: the type key, qualified by the active token if any
pub fn hot_cache_key(opts: &RegistryOpts, type_key: &str) -> String {
    self::type_key(type_key, opts.token.as_ref())
}

struct Registration {
    creator: CreateInstanceHandler,
    opts: RegistrationOpts,
}

struct ConfigurationRegistration {
    creator: CreateConfigurationHandler,
    opts: RegistrationOpts,
}

type HotSlot = Arc<OnceCell<Instance>>;

thread_local! {
    // Slots under construction on this thread, by registry address and cache key
    static BUILDING: RefCell<HashSet<(usize, String)>> = RefCell::new(HashSet::new());
}

/// Marks a slot as under construction on the current thread until dropped
struct BuildGuard {
    slot: (usize, String),
}

impl BuildGuard {
    /// `None` if the slot is already under construction on this thread
    fn enter(registry: usize, key: &str) -> Option<Self> {
        let slot = (registry, key.to_string());
        BUILDING
            .with(|building| building.borrow_mut().insert(slot.clone()))
            .then_some(BuildGuard { slot })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with(|building| building.borrow_mut().remove(&self.slot));
    }
}

/// Default [Registry] implementation
#[derive(Default)]
pub struct DiRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
    configuration_registrations: RwLock<HashMap<String, ConfigurationRegistration>>,
    hot_instances: Mutex<HashMap<String, HotSlot>>,
}

impl DiRegistry {
    /// Create an isolated registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an isolated registry, ready to be passed in [RegistryOpts]
    pub fn shared() -> Arc<dyn Registry> {
        Arc::new(Self::new())
    }

    pub fn is_registered(&self, type_key: &str) -> bool {
        self.registrations.read().contains_key(type_key)
    }

    pub fn is_configuration_registered(&self, type_key: &str) -> bool {
        self.configuration_registrations.read().contains_key(type_key)
    }

    /// Options captured when the instance factory under `type_key` was registered
    pub fn registration_opts(&self, type_key: &str) -> Option<RegistrationOpts> {
        self.registrations
            .read()
            .get(type_key)
            .map(|registration| registration.opts.clone())
    }

    pub fn configuration_registration_opts(&self, type_key: &str) -> Option<RegistrationOpts> {
        self.configuration_registrations
            .read()
            .get(type_key)
            .map(|registration| registration.opts.clone())
    }

    /// Number of constructed singletons
    pub fn hot_instance_count(&self) -> usize {
        self.hot_instances
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Fetch the slot for a key, creating an empty one if needed.
    ///
    /// The map lock is released before the slot is initialized, so that factories
    /// can create other dependencies.
    fn slot(&self, key: &str) -> HotSlot {
        let mut hot = self.hot_instances.lock();
        match hot.get(key) {
            Some(slot) => slot.clone(),
            None => {
                let slot = HotSlot::default();
                hot.insert(key.to_string(), slot.clone());
                slot
            }
        }
    }
}

impl fmt::Debug for DiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registrations: Vec<String> = self.registrations.read().keys().cloned().collect();
        registrations.sort();
        let mut configurations: Vec<String> = self
            .configuration_registrations
            .read()
            .keys()
            .cloned()
            .collect();
        configurations.sort();
        f.debug_struct("DiRegistry")
            .field("registrations", &registrations)
            .field("configuration_registrations", &configurations)
            .field("hot_instances", &self.hot_instance_count())
            .finish()
    }
}

impl Registry for DiRegistry {
    fn register(
        &self,
        type_key: &str,
        handler: CreateInstanceHandler,
        opts: &RegistryOpts,
    ) -> Result<()> {
        let registration = Registration {
            creator: handler,
            opts: opts.detached(),
        };
        if self
            .registrations
            .write()
            .insert(type_key.to_string(), registration)
            .is_some()
        {
            tracing::warn!(type_key, "replacing existing dependency registration");
        } else {
            tracing::debug!(type_key, "registered dependency");
        }
        Ok(())
    }

    fn register_configuration(
        &self,
        type_key: &str,
        handler: CreateConfigurationHandler,
        opts: &RegistryOpts,
    ) -> Result<()> {
        let registration = ConfigurationRegistration {
            creator: handler,
            opts: opts.detached(),
        };
        if self
            .configuration_registrations
            .write()
            .insert(type_key.to_string(), registration)
            .is_some()
        {
            tracing::warn!(type_key, "replacing existing configuration registration");
        } else {
            tracing::debug!(type_key, "registered configuration");
        }
        Ok(())
    }

    fn create(
        &self,
        ctx: &Context,
        type_key: &str,
        config: Instance,
        opts: &RegistryOpts,
    ) -> Result<Instance> {
        // Release the read lock before running the factory, it may register or create
        let creator = match self.registrations.read().get(type_key) {
            Some(registration) => registration.creator.clone(),
            None => return Err(DiError::NotRegistered(type_key.to_string())),
        };
        creator(ctx, opts, config)
    }

    fn create_configuration(
        &self,
        ctx: &Context,
        type_key: &str,
        opts: &RegistryOpts,
    ) -> Result<Instance> {
        let creator = match self.configuration_registrations.read().get(type_key) {
            Some(registration) => registration.creator.clone(),
            None => return Err(DiError::ConfigurationNotRegistered(type_key.to_string())),
        };
        creator(ctx, opts)
    }

    fn get_hot_instance(
        &self,
        _ctx: &Context,
        opts: &RegistryOpts,
        type_key: &str,
    ) -> Result<Instance> {
        let key = hot_cache_key(opts, type_key);
        self.hot_instances
            .lock()
            .get(&key)
            .and_then(|slot| slot.get().cloned())
            .ok_or(DiError::NotRegistered(key))
    }

    fn set_hot_instance(
        &self,
        _ctx: &Context,
        opts: &RegistryOpts,
        type_key: &str,
        instance: Instance,
    ) -> Result<()> {
        let key = hot_cache_key(opts, type_key);
        let slot = HotSlot::new(OnceCell::with_value(instance));
        self.hot_instances.lock().insert(key, slot);
        Ok(())
    }

    fn get_or_init_hot_instance(
        &self,
        _ctx: &Context,
        opts: &RegistryOpts,
        type_key: &str,
        init: &mut dyn FnMut() -> Result<Instance>,
    ) -> Result<Instance> {
        let key = hot_cache_key(opts, type_key);
        let slot = self.slot(&key);
        if let Some(instance) = slot.get() {
            tracing::trace!(key = %key, "hot instance hit");
            return Ok(instance.clone());
        }

        // A factory reaching its own slot would wait for itself forever
        let registry = self as *const Self as usize;
        let guard = match BuildGuard::enter(registry, &key) {
            Some(guard) => guard,
            None => {
                tracing::warn!(key = %key, "circular dependency");
                return Err(DiError::Cycle { key });
            }
        };
        let built = slot
            .get_or_try_init(|| {
                tracing::debug!(key = %key, "constructing hot instance");
                init()
            })
            .cloned();
        drop(guard);
        built
    }
}

static INSTANCE: Lazy<Arc<dyn Registry>> = Lazy::new(DiRegistry::shared);

/// The process-wide registry, used when no registry is set in the options
pub fn global() -> Arc<dyn Registry> {
    INSTANCE.clone()
}
