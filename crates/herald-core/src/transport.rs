//! The transport contract.
//!
//! The engine never talks to a network itself. It calls back into a
//! [`Transport`] to acknowledge interactions and to deliver replies, and a
//! transport implementation decides what those mean on its wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use herald_core::{Interaction, Reply, ReplyOptions, Transport, TransportResult};
//!
//! struct StdoutTransport;
//!
//! #[async_trait]
//! impl Transport for StdoutTransport {
//!     async fn acknowledge(&self, _: &Interaction, _: bool) -> TransportResult<()> {
//!         Ok(())
//!     }
//!
//!     async fn reply(&self, _: &Interaction, reply: &Reply, _: ReplyOptions) -> TransportResult<()> {
//!         println!("{reply}");
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::interaction::Interaction;
use crate::reply::Reply;

/// Whether a reply is the first response to an interaction or a follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStage {
    /// The first reply, completing the acknowledged interaction.
    Initial,
    /// Any later reply.
    FollowUp,
}

/// Delivery options attached to each reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyOptions {
    pub stage: ReplyStage,
    /// Only the invoking user should see the reply.
    pub ephemeral: bool,
}

impl ReplyOptions {
    pub fn initial(ephemeral: bool) -> Self {
        Self {
            stage: ReplyStage::Initial,
            ephemeral,
        }
    }

    pub fn follow_up(ephemeral: bool) -> Self {
        Self {
            stage: ReplyStage::FollowUp,
            ephemeral,
        }
    }
}

/// A bidirectional link to the platform that produced an interaction.
///
/// Implementations must be cheap to share; the engine holds them behind an
/// [`Arc`] for the lifetime of each dispatch.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Acknowledges receipt of an interaction.
    ///
    /// The engine calls this at most once per interaction, before any reply.
    async fn acknowledge(&self, interaction: &Interaction, ephemeral: bool) -> TransportResult<()>;

    /// Delivers a reply for an interaction.
    async fn reply(
        &self,
        interaction: &Interaction,
        reply: &Reply,
        options: ReplyOptions,
    ) -> TransportResult<()>;
}

/// A shared, type-erased transport.
pub type BoxedTransport = Arc<dyn Transport>;
