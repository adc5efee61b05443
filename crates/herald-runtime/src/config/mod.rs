//! Configuration for the Herald runtime.
//!
//! Settings are layered with figment: built-in defaults, then configuration
//! files, then `HERALD_*` environment variables, then programmatic merges.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, FilterConfig, HeraldConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RateLimitConfig, SpanEventConfig,
};
pub use validation::validate_config;
