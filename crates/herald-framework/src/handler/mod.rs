//! Handler system.
//!
//! - [`arg`]: type-erased arguments and the [`FromArg`] bridge
//! - [`traits`]: the [`Handler`] trait, implemented for async functions
//! - [`service`]: [`HandlerService`], the tower service definitions store

pub mod arg;
pub mod service;
pub mod traits;

pub use arg::{ArgShape, ArgValue, FromArg, TypeKey};
pub use service::{BoxedHandler, HandlerOutput, HandlerService, Invocation, into_boxed_handler};
pub use traits::Handler;
