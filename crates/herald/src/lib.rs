//! # Herald
//!
//! A type-safe interaction dispatch engine: it receives structured chat
//! commands ("interactions"), routes each one to the handler registered for
//! its label, converts raw option strings into typed arguments, validates
//! them, runs cross-cutting filters, and replies through the transport the
//! interaction came from.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────────────────────────────┐     ┌───────────┐
//! │  Transport  │────▶│ Dispatcher                                       │────▶│  Handler  │
//! │             │     │ filters → route → filters → adapt → validate     │     │ (typed)   │
//! │             │◀────│ → filters → acquire session runtime → invoke     │◀────│           │
//! └─────────────┘     └──────────────────────────────────────────────────┘     └───────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, one task per interaction, sweep of
//!   idle session runtimes, graceful shutdown
//! - **Definitions**: commands with typed parameters, validated when the
//!   registry is built
//! - **Filters**: checks at `BeforeRouting`, `BeforeAdapting` and
//!   `BeforeExecution`
//! - **Handlers**: async functions taking a controller, the event, and typed
//!   arguments (Axum-style)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! async fn greet(_: Arc<Greeter>, _: CommandEvent, name: String) -> String {
//!     format!("Hello, {name}!")
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut controllers = ControllerFactories::new();
//!     controllers.register_default::<Greeter>();
//!
//!     let runtime = HeraldRuntime::builder()
//!         .command(command("greet").param(Param::new::<String>("name")).handler(greet))
//!         .provider(controllers)
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command-line`: text command-line parsing (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_framework as framework;
pub use herald_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use herald_runtime::{HeraldConfig, HeraldRuntime, RuntimeError};

    // Boundary types
    pub use herald_core::{
        BoxedTransport, Interaction, Reply, ReplyOptions, ReplyStage, RichContent, SessionKey,
        Transport, TransportError, TransportResult,
    };

    // Definitions
    pub use herald_framework::{
        Constraint, InteractionRegistry, Param, TypeAdapterRegistry, ValidatorRegistry, command,
    };

    // Handlers and controllers
    pub use herald_framework::{CommandEvent, ControllerFactories, InstanceProvider};

    // Filters
    pub use herald_framework::{
        ExecutionContext, Filter, FilterPosition, PermissionResolver, StaticPermissions,
        filter_fn,
    };

    // Dispatching
    pub use herald_framework::{DispatchError, DispatchErrorKind, DispatchOutcome, Dispatcher};

    #[cfg(feature = "command-line")]
    pub use herald_framework::parse_command_line;
}
