use std::sync::Arc;

use crate::*;

mod pipeline;

trait TestTrait: Send + Sync {
    fn secret(&self) -> &str;
}

#[derive(Default)]
struct SecretImpl {}
impl TestTrait for SecretImpl {
    fn secret(&self) -> &str {
        "here is the secret ingredient"
    }
}

/// Options bound to a fresh registry, isolated from the process-wide one
fn isolated() -> RegistryOpts {
    RegistryOpts::new().with_registry(&DiRegistry::shared())
}

/// Tokens are global to the process: every test claims its own names
fn token(name: &str) -> InjectionToken {
    InjectionToken::register(name).expect("token not claimed by another test")
}

// Disable clippy lint on the comparison of fat pointers:
// this is only test code, the issue should not arise in this context
#[allow(clippy::vtable_address_comparisons)]
#[test]
fn trait_object_singleton() -> Result<()> {
    let opts = isolated();
    register(
        |_: &Context, _: &RegistryOpts| Ok(Arc::new(SecretImpl {}) as Arc<dyn TestTrait>),
        &opts,
    )?;

    let ctx = Context::new();
    let v1: Arc<dyn TestTrait> = create(&ctx, &opts)?;
    let v2: Arc<dyn TestTrait> = create(&ctx, &opts)?;

    assert_eq!(v1.secret(), "here is the secret ingredient");
    assert!(Arc::ptr_eq(&v1, &v2));

    Ok(())
}

#[test]
fn instances_narrow_to_value_or_shared_pointer() {
    let instance = Instance::new(String::from("value"));
    assert!(instance.is::<String>());
    assert_eq!(safe_type_assert::<String>(&instance), Some(String::from("value")));
    assert_eq!(safe_type_assert::<u8>(&instance), None);

    let shared: Arc<String> = safe_type_assert(&instance).expect("shared pointer");
    let again: Arc<String> = safe_type_assert(&instance).expect("shared pointer");
    assert!(Arc::ptr_eq(&shared, &again));

    let pointer = Instance::new(Arc::new(7u32));
    assert_eq!(safe_type_assert::<u32>(&pointer), Some(7));
    assert_eq!(safe_type_assert::<Arc<u8>>(&pointer), None);
}
