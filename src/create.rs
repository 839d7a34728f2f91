//! Typed registration and creation entry points
//!
//! These functions derive the registry keys from the requested types and the token
//! of the options, then narrow the erased [Instance]s produced by the registry.
//!
//! Every registered factory is wrapped so that its result is cached as a hot
//! instance: a binding produces a single value per registry and cache key.
//!
//! When a token is set, creation first looks for a binding qualified by that token,
//! then falls back to the unqualified binding. A default binding can thus be
//! overridden for specific tokens only.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::{DiError, Result};
use crate::instance::{coerce_or_panic, Instance, NoConfig};
use crate::lookup::configuration_lookup;
use crate::opts::RegistryOpts;
use crate::registry::{CreateConfigurationHandler, CreateInstanceHandler};
use crate::token::{pair_key, type_key_of, type_name_of, InjectionToken};

/// Register a factory for ```T```
pub fn register<T, F>(factory: F, opts: &RegistryOpts) -> Result<()>
where
    T: Send + Sync + 'static,
    F: Fn(&Context, &RegistryOpts) -> Result<T> + Send + Sync + 'static,
{
    let key = type_key_of::<T>(opts.token.as_ref());
    let hot = from_hot_memory(factory, key.clone());
    let handler: CreateInstanceHandler =
        Arc::new(move |ctx: &Context, opts: &RegistryOpts, _config: Instance| hot(ctx, opts));
    opts.registry.register(&key, handler, opts)
}

/// Register a pre-built value of ```T```
pub fn register_instance<T>(value: T, opts: &RegistryOpts) -> Result<()>
where
    T: Clone + Send + Sync + 'static,
{
    register(move |_: &Context, _: &RegistryOpts| Ok(value.clone()), opts)
}

/// Register a factory for the configuration type ```CT```
pub fn register_configuration<CT, F>(factory: F, opts: &RegistryOpts) -> Result<()>
where
    CT: Send + Sync + 'static,
    F: Fn(&Context, &RegistryOpts) -> Result<CT> + Send + Sync + 'static,
{
    let key = type_key_of::<CT>(opts.token.as_ref());
    let handler = from_hot_memory(factory, key.clone());
    opts.registry.register_configuration(&key, handler, opts)
}

/// Register ```T``` together with its configuration ```CT```.
///
/// The configuration factory runs first and its result is handed to the instance factory.
pub fn register_pair<T, CT, F, FC>(factory: F, config_factory: FC, opts: &RegistryOpts) -> Result<()>
where
    T: Send + Sync + 'static,
    CT: Clone + Send + Sync + 'static,
    F: Fn(&Context, &RegistryOpts, CT) -> Result<T> + Send + Sync + 'static,
    FC: Fn(&Context, &RegistryOpts) -> Result<CT> + Send + Sync + 'static,
{
    let keys = PairKeys::of::<T, CT>(opts.token.as_ref());

    let config_handler = from_hot_memory(config_factory, keys.config.clone());
    opts.registry
        .register_configuration(&keys.config, config_handler, opts)?;

    let handler = from_hot_memory_with_config(factory, keys.instance.clone());
    opts.registry.register(&keys.instance, handler, opts)
}

/// Register ```T``` with a configuration read from the context.
///
/// The configuration is looked up with [configuration_lookup], under the token and
/// configuration node of the creation call. The configuration node given here is
/// used when the creation call does not set one.
pub fn register_configured<T, CT, F>(factory: F, opts: &RegistryOpts) -> Result<()>
where
    T: Send + Sync + 'static,
    CT: DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(&Context, &RegistryOpts, CT) -> Result<T> + Send + Sync + 'static,
{
    let default_node = opts.config_node.clone();
    let lookup = move |ctx: &Context, call: &RegistryOpts| {
        if call.config_node.is_empty() && !default_node.is_empty() {
            let mut call = call.clone();
            call.config_node = default_node.clone();
            return configuration_lookup::<CT>(ctx, &call);
        }
        configuration_lookup::<CT>(ctx, call)
    };
    register_pair::<T, CT, _, _>(factory, lookup, opts)
}

/// Create, or fetch the cached, instance of ```T```
pub fn create<T: Clone + 'static>(ctx: &Context, opts: &RegistryOpts) -> Result<T> {
    let ctx = scoped(ctx, opts);
    let token = opts.token.as_ref();
    let key = type_key_of::<T>(token);
    tracing::debug!(key = %key, breadcrumbs = ?ctx.breadcrumbs(), "create dependency");

    let instance = with_fallback(token, |token| {
        let key = type_key_of::<T>(token);
        let created = opts
            .registry
            .create(&ctx, &key, Instance::new(NoConfig), opts);
        (created, vec![key])
    })
    .map_err(|err| creation_error::<T>(err, opts, &ctx))?;

    Ok(coerce_or_panic::<T>(&instance, &key))
}

/// Create, or fetch the cached, configuration ```CT```
pub fn create_configuration<CT: Clone + 'static>(ctx: &Context, opts: &RegistryOpts) -> Result<CT> {
    let ctx = scoped(ctx, opts);
    let token = opts.token.as_ref();
    let key = type_key_of::<CT>(token);
    tracing::debug!(key = %key, breadcrumbs = ?ctx.breadcrumbs(), "create configuration");

    let instance = with_fallback(token, |token| {
        let key = type_key_of::<CT>(token);
        let created = opts.registry.create_configuration(&ctx, &key, opts);
        (created, vec![key])
    })
    .map_err(|err| creation_error::<CT>(err, opts, &ctx))?;

    Ok(coerce_or_panic::<CT>(&instance, &key))
}

/// Create ```T``` from its configuration ```CT```, see [register_pair].
///
/// With [NoConfig] as configuration type, no configuration is created.
pub fn create_pair<T, CT>(ctx: &Context, opts: &RegistryOpts) -> Result<T>
where
    T: Clone + 'static,
    CT: 'static,
{
    let ctx = scoped(ctx, opts);
    let token = opts.token.as_ref();
    let key = PairKeys::of::<T, CT>(token).instance;
    tracing::debug!(key = %key, breadcrumbs = ?ctx.breadcrumbs(), "create dependency pair");

    let instance = with_fallback(token, |token| {
        let keys = PairKeys::of::<T, CT>(token);
        let created = create_pair_erased::<CT>(&ctx, &keys, opts);
        (created, vec![keys.config, keys.instance])
    })
    .map_err(|err| creation_error::<T>(err, opts, &ctx))?;

    Ok(coerce_or_panic::<T>(&instance, &key))
}

fn create_pair_erased<CT: 'static>(
    ctx: &Context,
    keys: &PairKeys,
    opts: &RegistryOpts,
) -> Result<Instance> {
    let config = if NoConfig::is::<CT>() {
        Instance::new(NoConfig)
    } else {
        opts.registry.create_configuration(ctx, &keys.config, opts)?
    };
    opts.registry.create(ctx, &keys.instance, config, opts)
}

/// Registry keys of the two sides of a pair
struct PairKeys {
    config: String,
    instance: String,
}

impl PairKeys {
    fn of<T, CT>(token: Option<&InjectionToken>) -> Self {
        let config_key = type_key_of::<CT>(token);
        let instance_key = type_key_of::<T>(token);
        Self {
            config: pair_key(&config_key, &instance_key),
            instance: pair_key(&instance_key, &config_key),
        }
    }
}

/// Run an attempt with the token, then without it if one of the keys of the first
/// attempt was reported missing.
fn with_fallback<F>(token: Option<&InjectionToken>, mut attempt: F) -> Result<Instance>
where
    F: FnMut(Option<&InjectionToken>) -> (Result<Instance>, Vec<String>),
{
    let (result, keys) = attempt(token);
    let err = match result {
        Ok(instance) => return Ok(instance),
        Err(err) => err,
    };

    let missing = err
        .missing_key()
        .map(|missing| keys.iter().any(|key| key == missing))
        .unwrap_or(false);
    match token {
        Some(token) if missing => {
            tracing::debug!(
                token = %token,
                missing = err.missing_key().unwrap_or_default(),
                "no binding for token, falling back to the default binding"
            );
            attempt(None).0
        }
        _ => Err(err),
    }
}

fn scoped(ctx: &Context, opts: &RegistryOpts) -> Context {
    let mut ctx = ctx.clone();
    ctx.append_breadcrumb(opts.token.as_ref());
    ctx
}

fn creation_error<T: ?Sized>(err: DiError, opts: &RegistryOpts, ctx: &Context) -> DiError {
    DiError::Creation {
        type_name: type_name_of::<T>(),
        token: opts.token_str().to_string(),
        breadcrumbs: ctx.breadcrumbs().join(", "),
        source: Box::new(err),
    }
}

/// Wrap a factory so that it runs once per cache key, see [crate::registry::Registry::get_or_init_hot_instance]
fn from_hot_memory<T, F>(factory: F, key: String) -> CreateConfigurationHandler
where
    T: Send + Sync + 'static,
    F: Fn(&Context, &RegistryOpts) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &Context, opts: &RegistryOpts| {
        opts.registry
            .get_or_init_hot_instance(ctx, opts, &key, &mut || {
                factory(ctx, opts).map(Instance::new)
            })
    })
}

fn from_hot_memory_with_config<T, CT, F>(factory: F, key: String) -> CreateInstanceHandler
where
    T: Send + Sync + 'static,
    CT: Clone + 'static,
    F: Fn(&Context, &RegistryOpts, CT) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &Context, opts: &RegistryOpts, config: Instance| {
        opts.registry
            .get_or_init_hot_instance(ctx, opts, &key, &mut || {
                let config = coerce_or_panic::<CT>(&config, &key);
                factory(ctx, opts, config).map(Instance::new)
            })
    })
}
