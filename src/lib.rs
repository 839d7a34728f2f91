//! Token-keyed dependency injection with templated JSON configuration.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use kizuna::*;
//! // Define traits and implementors
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! #[derive(Clone, serde::Deserialize)]
//! struct GreeterConfig {
//!     name: String,
//! }
//!
//! struct ConfiguredGreeter(GreeterConfig);
//!
//! impl Greeter for ConfiguredGreeter {
//!     fn greet(&self) -> String {
//!         format!("Hello {}", self.0.name)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! // Bind the trait object to a factory reading its configuration under the token
//! let token = InjectionToken::register("greeter")?;
//! let opts = RegistryOpts::new().with_token(&token);
//! register_configured(
//!     |_ctx: &Context, _opts: &RegistryOpts, config: GreeterConfig| {
//!         Ok(Arc::new(ConfiguredGreeter(config)) as Arc<dyn Greeter>)
//!     },
//!     &opts,
//! )?;
//!
//! // Load a document and create the singleton
//! let ctx = context_from_document(r#"{
//!     "$shared": { "name": "world" },
//!     "greeter": { "name": ${di.$shared.name} }
//! }"#)?;
//! let greeter = create_pair::<Arc<dyn Greeter>, GreeterConfig>(&ctx, &opts)?;
//! assert_eq!(greeter.greet(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! The registry is a map of type-erased factories keyed by strings derived from the
//! type names, see [token]. Typed entry points in [create] derive these keys and narrow
//! the produced values. Factories registered through them are wrapped to cache their
//! result: each binding produces a singleton, shared by every creation call.
//!
//! * An [InjectionToken] names a configuration section and qualifies registry keys,
//!   so that the same type can be bound several times.
//! * The [Context] carries the configuration, the breadcrumbs of the tokens crossed
//!   during a creation, and the cancellation scope of the surrounding work.
//! * The [lookup] module locates the configuration node of a dependency from its
//!   token and configuration node, see [assemble_path].
//! * The [template] module expands ```${di.<path>}``` references before a document
//!   is loaded.
//!
//! Creation with a token first looks for a binding qualified by that token, then
//! falls back to the unqualified binding.

pub mod context;
pub mod create;
pub mod decode;
pub mod error;
pub mod instance;
pub mod lookup;
pub mod opts;
pub mod registry;
pub mod template;
pub mod token;

pub use context::{ConfigRawData, Configuration, Context, ContextArg, ContextBuilder, ExecutionScope};
pub use create::{
    create, create_configuration, create_pair, register, register_configuration,
    register_configured, register_instance, register_pair,
};
pub use error::{BoxError, DiError, LookupError, Result, TemplateError, TokenError};
pub use instance::{safe_type_assert, Instance, NoConfig};
pub use lookup::{assemble_path, configuration_lookup, node_lookup, raw_lookup};
pub use opts::{
    with_config_node, with_configuration, with_opts, with_registry, with_token, RegistrationOpts,
    RegistryOpts,
};
pub use registry::{global, DiRegistry, Registry};
pub use template::{context_from_document, from_str_with_references, resolve_references};
pub use token::{type_key, type_key_of, InjectionToken};

#[cfg(test)]
mod tests;
