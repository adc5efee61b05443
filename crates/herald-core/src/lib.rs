//! # Herald Core
//!
//! The boundary types of the Herald interaction dispatch engine.
//!
//! Everything a transport needs to talk to the engine lives here, and nothing
//! else does:
//!
//! - **Interactions**: the inbound structured event ([`Interaction`]) carrying a
//!   routing label, raw options and the invoking session ([`SessionKey`]).
//! - **Replies**: outbound payloads ([`Reply`]) in plain, rich or error form.
//! - **Transport**: the contract ([`Transport`]) the engine uses to acknowledge
//!   an interaction and deliver replies.
//!
//! ```text
//! ┌─────────────┐  Interaction  ┌────────────┐  typed call  ┌───────────┐
//! │  Transport  │──────────────▶│ Dispatcher │─────────────▶│  Handler  │
//! │             │◀──────────────│            │◀─────────────│           │
//! └─────────────┘ ack / Reply   └────────────┘    Reply     └───────────┘
//! ```
//!
//! The dispatcher itself lives in `herald-framework`. This crate has no async
//! runtime dependency.

pub mod error;
pub mod interaction;
pub mod reply;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use interaction::{Interaction, InteractionKind, RawOption, SessionKey};
pub use reply::{ErrorContent, Field, Reply, RichContent};
pub use transport::{BoxedTransport, ReplyOptions, ReplyStage, Transport};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::*;
    pub use super::interaction::*;
    pub use super::reply::*;
    pub use super::transport::*;
}
