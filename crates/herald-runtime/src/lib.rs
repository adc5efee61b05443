//! Herald Runtime - process-level layer of the Herald interaction engine.
//!
//! This crate provides:
//! - Layered configuration (`HeraldConfig`) loaded with figment
//! - Logging setup on `tracing-subscriber` and `tracing-appender`
//! - [`HeraldRuntime`]: wires the built-in filters from configuration, runs
//!   one task per inbound interaction and the idle-runtime sweep, and shuts
//!   down gracefully
//!
//! ```ignore
//! use herald_runtime::HeraldRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = HeraldRuntime::builder()
//!         .commands(my_commands())
//!         .provider(my_controllers())
//!         .build()?;
//!
//!     // Hand `runtime` to the transport, then run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, HeraldConfig, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{HeraldRuntime, RuntimeBuilder, wait_for_signal};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
