//! # Herald Framework
//!
//! The dispatch engine: everything between an inbound [`Interaction`] and a
//! typed call to the handler that owns its label.
//!
//! This layer provides:
//! - Definitions: commands, their parameters and constraints, checked once
//!   when the [`InteractionRegistry`] is built
//! - Type adapters and constraint validators keyed by parameter type
//! - A three-phase filter chain for cross-cutting checks (mute, rate limits,
//!   permissions, ...)
//! - Axum-style handlers bound to a controller type, stored as tower services
//! - Session runtimes owning controller instances across related dispatches
//! - The [`Dispatcher`] that runs the pipeline and contains every failure
//! - A text command-line parser (with the `command-line` feature)
//!
//! ```rust,ignore
//! use herald_framework::*;
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! async fn greet(_: Arc<Greeter>, _: CommandEvent, name: String) -> String {
//!     format!("Hello, {name}!")
//! }
//!
//! let adapters = TypeAdapterRegistry::new();
//! let registry = InteractionRegistry::builder()
//!     .command(command("greet").param(Param::new::<String>("name")).handler(greet))
//!     .build(&adapters, &ValidatorRegistry::new())?;
//!
//! let mut factories = ControllerFactories::new();
//! factories.register_default::<Greeter>();
//!
//! let dispatcher = Dispatcher::builder(registry, adapters).provider(factories).build();
//! ```
//!
//! [`Interaction`]: herald_core::Interaction

pub mod adapter;
pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod help;
pub mod reply;
pub mod supervisor;
pub mod validation;

#[cfg(feature = "command-line")]
pub mod command_line;

pub use adapter::{TypeAdapter, TypeAdapterRegistry};
pub use context::{DispatchStage, ExecutionContext};
pub use definition::{
    CommandBuilder, Constraint, ConstraintDefinition, InteractionDefinition, InteractionRegistry,
    Param, ParameterDefinition, RegistryBuilder, command,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::{
    ArgumentError, BoxError, DefinitionError, DispatchError, DispatchErrorKind, ParseError,
    ProvideError,
};
pub use event::CommandEvent;
pub use filter::{
    ActiveFilter, BoxedFilter, Filter, FilterPosition, FilterRegistry, GuildOnlyFilter,
    MuteFilter, MuteSettings, PermissionFilter, PermissionResolver, RateLimitFilter,
    StaticPermissions, filter_fn,
};
pub use handler::{
    ArgShape, ArgValue, BoxedHandler, FromArg, Handler, HandlerOutput, Invocation, TypeKey,
};
pub use help::{DefaultHelpRenderer, HelpRenderer};
pub use reply::ReplyContext;
pub use supervisor::{
    BoxedInstance, ControllerFactories, InstanceProvider, InteractionRuntime, RuntimeLease,
    RuntimeSupervisor,
};
pub use validation::{Validator, ValidatorRegistry};

#[cfg(feature = "command-line")]
pub use command_line::{CommandLineParser, parse_command_line, shell_split};
