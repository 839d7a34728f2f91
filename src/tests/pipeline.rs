use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{isolated, token};
use crate::*;

#[derive(Clone, Debug, PartialEq)]
struct Database {
    name: &'static str,
}

#[test]
fn token_falls_back_to_default_binding() -> Result<()> {
    let primary = token("pipeline.fallback.primary");
    let replica = token("pipeline.fallback.replica");
    let opts = isolated();

    register(|_: &Context, _: &RegistryOpts| Ok(Database { name: "default" }), &opts)?;
    register(
        |_: &Context, _: &RegistryOpts| Ok(Database { name: "replica" }),
        &opts.clone().with_token(&replica),
    )?;

    let ctx = Context::new();
    assert_eq!(create::<Database>(&ctx, &opts)?.name, "default");
    assert_eq!(create::<Database>(&ctx, &opts.clone().with_token(&primary))?.name, "default");
    assert_eq!(create::<Database>(&ctx, &opts.clone().with_token(&replica))?.name, "replica");
    Ok(())
}

#[test]
fn fallback_builds_a_singleton_per_token() -> Result<()> {
    let other = token("pipeline.singleton.other");
    let opts = isolated();
    register(|_: &Context, _: &RegistryOpts| Ok(Arc::new(Database { name: "shared" })), &opts)?;

    let ctx = Context::new();
    let default: Arc<Database> = create(&ctx, &opts)?;
    let again: Arc<Database> = create(&ctx, &opts)?;
    let tokened: Arc<Database> = create(&ctx, &opts.clone().with_token(&other))?;
    let tokened_again: Arc<Database> = create(&ctx, &opts.clone().with_token(&other))?;

    assert!(Arc::ptr_eq(&default, &again));
    assert!(Arc::ptr_eq(&tokened, &tokened_again));
    assert!(!Arc::ptr_eq(&default, &tokened));
    Ok(())
}

#[test]
fn missing_binding_is_reported_with_context() {
    let missing = token("pipeline.missing");
    let opts = isolated().with_token(&missing);

    let err = create::<Database>(&Context::new(), &opts).unwrap_err();
    match &err {
        DiError::Creation {
            type_name,
            token,
            breadcrumbs,
            source,
        } => {
            assert_eq!(*type_name, std::any::type_name::<Database>());
            assert_eq!(token, "pipeline.missing");
            assert_eq!(breadcrumbs, "pipeline.missing");
            // the unqualified retry is the one reported
            assert_eq!(source.missing_key(), Some(std::any::type_name::<Database>()));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("pipeline.missing"));
}

#[derive(Clone, Debug, PartialEq)]
struct Settings {
    level: u8,
}

#[test]
fn values_and_shared_pointers_are_interchangeable() -> Result<()> {
    let opts = isolated();
    let ctx = Context::new();

    // value stored, shared pointer requested: the cached allocation is handed out
    register(|_: &Context, _: &RegistryOpts| Ok(Settings { level: 3 }), &opts)?;
    let first: Arc<Settings> = create(&ctx, &opts)?;
    let second: Arc<Settings> = create(&ctx, &opts)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(create::<Settings>(&ctx, &opts)?, Settings { level: 3 });

    // shared pointer stored, value requested: the pointee is cloned
    let other = isolated();
    register_instance(Arc::new(Settings { level: 4 }), &other)?;
    assert_eq!(create::<Settings>(&ctx, &other)?, Settings { level: 4 });
    Ok(())
}

#[test]
#[should_panic(expected = "TypeMismatch")]
fn mismatched_binding_panics() {
    let opts = isolated();
    let handler: registry::CreateInstanceHandler =
        Arc::new(|_: &Context, _: &RegistryOpts, _: Instance| Ok(Instance::new(5u8)));
    opts.registry
        .register(&type_key_of::<String>(None), handler, &opts)
        .expect("registration");

    let _ = create::<String>(&Context::new(), &opts);
}

struct Leaf;

struct Branch {
    leaf: Arc<Leaf>,
}

struct Root {
    branch: Arc<Branch>,
    leaf: Arc<Leaf>,
}

#[test]
fn nested_dependencies_share_singletons() -> Result<()> {
    let opts = isolated();
    register(|_: &Context, _: &RegistryOpts| Ok(Arc::new(Leaf)), &opts)?;
    register(
        |ctx: &Context, opts: &RegistryOpts| {
            Ok(Arc::new(Branch {
                leaf: create(ctx, opts)?,
            }))
        },
        &opts,
    )?;
    register(
        |ctx: &Context, opts: &RegistryOpts| {
            Ok(Arc::new(Root {
                branch: create(ctx, opts)?,
                leaf: create(ctx, opts)?,
            }))
        },
        &opts,
    )?;

    let root: Arc<Root> = create(&Context::new(), &opts)?;
    assert!(Arc::ptr_eq(&root.leaf, &root.branch.leaf));
    Ok(())
}

#[test]
fn nested_failures_are_not_retried_without_token() {
    let outer = token("pipeline.nested.outer");
    let opts = isolated();
    register(
        |ctx: &Context, opts: &RegistryOpts| {
            Ok(Arc::new(Branch {
                leaf: create(ctx, opts)?,
            }))
        },
        &opts,
    )
    .expect("registration");

    let err = match create::<Arc<Branch>>(&Context::new(), &opts.clone().with_token(&outer)) {
        Ok(_) => panic!("the leaf is not registered"),
        Err(err) => err,
    };
    assert!(matches!(err.root(), DiError::NotRegistered(key) if key == std::any::type_name::<Leaf>()));
    match err {
        DiError::Creation { source, breadcrumbs, .. } => {
            assert_eq!(breadcrumbs, "pipeline.nested.outer");
            assert!(matches!(
                *source,
                DiError::Creation { ref breadcrumbs, .. }
                    if breadcrumbs == "pipeline.nested.outer, pipeline.nested.outer"
            ));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
struct HttpConfig {
    port: u16,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Clone)]
struct HttpServer {
    address: String,
}

#[test]
fn pairs_receive_their_configuration() -> Result<()> {
    let server = token("pipeline.pair");
    let opts = isolated().with_token(&server);

    register_pair(
        |_: &Context, _: &RegistryOpts, config: HttpConfig| {
            Ok(HttpServer {
                address: format!("{}:{}", config.host.unwrap_or_default(), config.port),
            })
        },
        |ctx: &Context, opts: &RegistryOpts| configuration_lookup::<HttpConfig>(ctx, opts),
        &opts,
    )?;

    let ctx = context_from_document(
        r#"{
            "$shared": { "host": "0.0.0.0" },
            "pipeline": { "pair": { "port": 8080, "host": ${di.$shared.host} } }
        }"#,
    )?;
    let created = create_pair::<HttpServer, HttpConfig>(&ctx, &opts)?;
    assert_eq!(created.address, "0.0.0.0:8080");

    let shared = create_pair::<Arc<HttpServer>, HttpConfig>(&ctx, &opts)?;
    let again = create_pair::<Arc<HttpServer>, HttpConfig>(&ctx, &opts)?;
    assert!(Arc::ptr_eq(&shared, &again));
    Ok(())
}

#[test]
fn configured_pairs_use_their_registration_node() -> Result<()> {
    let api = token("pipeline.configured");
    let opts = isolated().with_token(&api);
    register_configured(
        |_: &Context, _: &RegistryOpts, config: HttpConfig| Ok(config.port),
        &opts.clone().with_config_node("http"),
    )?;

    let ctx = Context::builder()
        .configuration(json!({ "pipeline": { "configured": { "http": { "port": 9000 } } } }))
        .build()?;
    assert_eq!(create_pair::<u16, HttpConfig>(&ctx, &opts)?, 9000);
    Ok(())
}

#[test]
fn pairs_without_configuration_skip_the_configuration_side() -> Result<()> {
    let opts = isolated();
    register_pair(
        |_: &Context, _: &RegistryOpts, _: NoConfig| Ok(Database { name: "plain" }),
        |_: &Context, _: &RegistryOpts| -> Result<NoConfig> {
            unreachable!("no configuration is created for NoConfig pairs")
        },
        &opts,
    )?;

    let created = create_pair::<Database, NoConfig>(&Context::new(), &opts)?;
    assert_eq!(created.name, "plain");
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
struct Limits {
    max: usize,
}

#[test]
fn configurations_fall_back_too() -> Result<()> {
    let tenant = token("pipeline.limits.tenant");
    let opts = isolated();
    register_configuration(|_: &Context, _: &RegistryOpts| Ok(Limits { max: 10 }), &opts)?;

    let limits: Limits = create_configuration(&Context::new(), &opts.clone().with_token(&tenant))?;
    assert_eq!(limits, Limits { max: 10 });

    let err = create_configuration::<Database>(&Context::new(), &opts).unwrap_err();
    assert!(matches!(err.root(), DiError::ConfigurationNotRegistered(_)));
    Ok(())
}

#[test]
fn factories_observe_the_execution_scope() -> Result<()> {
    let opts = isolated();
    register(
        |ctx: &Context, _: &RegistryOpts| {
            if ctx.is_cancelled() {
                return Err(DiError::factory("creation cancelled"));
            }
            Ok(Settings { level: 1 })
        },
        &opts,
    )?;

    let cancellation = CancellationToken::new();
    cancellation.cancel();
    let ctx = Context::from_args([cancellation])?;

    let err = create::<Settings>(&ctx, &opts).unwrap_err();
    assert!(matches!(err.root(), DiError::Factory(_)));
    assert!(err.to_string().contains("creation cancelled"));

    // failures are not cached
    assert_eq!(create::<Settings>(&Context::new(), &opts)?, Settings { level: 1 });
    Ok(())
}

struct Cyclic {
    _inner: Arc<Cyclic>,
}

#[test]
fn cyclic_dependencies_are_reported() {
    let opts = isolated();
    register(
        |ctx: &Context, opts: &RegistryOpts| {
            Ok(Arc::new(Cyclic {
                _inner: create(ctx, opts)?,
            }))
        },
        &opts,
    )
    .expect("registration");

    for _ in 0..2 {
        let err = match create::<Arc<Cyclic>>(&Context::new(), &opts) {
            Ok(_) => panic!("a cyclic dependency cannot be built"),
            Err(err) => err,
        };
        assert!(matches!(
            err.root(),
            DiError::Cycle { key } if key == std::any::type_name::<Cyclic>()
        ));
    }
}

#[test]
fn tokens_isolate_their_bindings() -> Result<()> {
    let east = token("pipeline.isolation.east");
    let west = token("pipeline.isolation.west");
    let opts = isolated();
    let calls = Arc::new(AtomicUsize::new(0));

    for (token, name) in [(&east, "east"), (&west, "west")] {
        let calls = calls.clone();
        register(
            move |_: &Context, _: &RegistryOpts| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Database { name }))
            },
            &opts.clone().with_token(token),
        )?;
    }

    let ctx = Context::new();
    let east_opts = opts.clone().with_token(&east);
    let west_opts = opts.clone().with_token(&west);
    let first_east: Arc<Database> = create(&ctx, &east_opts)?;
    let first_west: Arc<Database> = create(&ctx, &west_opts)?;
    let second_east: Arc<Database> = create(&ctx, &east_opts)?;
    let second_west: Arc<Database> = create(&ctx, &west_opts)?;

    assert_eq!((first_east.name, first_west.name), ("east", "west"));
    assert!(!Arc::ptr_eq(&first_east, &first_west));
    assert!(Arc::ptr_eq(&first_east, &second_east));
    assert!(Arc::ptr_eq(&first_west, &second_west));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}
