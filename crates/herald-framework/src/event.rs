//! The event handed to every handler.

use std::fmt;
use std::sync::Arc;

use herald_core::{Interaction, Reply, SessionKey, TransportResult};

use crate::definition::InteractionDefinition;
use crate::reply::ReplyContext;
use crate::supervisor::InteractionRuntime;

/// The invoked command as seen by its handler.
///
/// Cheap to clone. Handlers use it to inspect the raw interaction and to send
/// replies beyond their return value:
///
/// ```rust,ignore
/// async fn long_job(_: Arc<Jobs>, event: CommandEvent) -> Result<String, BoxError> {
///     event.reply("Working on it...").await?;
///     Ok(run().await?)
/// }
/// ```
#[derive(Clone)]
pub struct CommandEvent {
    definition: Arc<InteractionDefinition>,
    replies: Arc<ReplyContext>,
    runtime: Arc<InteractionRuntime>,
}

impl CommandEvent {
    pub(crate) fn new(
        definition: Arc<InteractionDefinition>,
        replies: Arc<ReplyContext>,
        runtime: Arc<InteractionRuntime>,
    ) -> Self {
        Self {
            definition,
            replies,
            runtime,
        }
    }

    pub fn interaction(&self) -> &Interaction {
        self.replies.interaction()
    }

    pub fn definition(&self) -> &InteractionDefinition {
        &self.definition
    }

    pub fn session(&self) -> &SessionKey {
        self.runtime.key()
    }

    /// The session runtime the handler's controller lives in.
    pub fn runtime(&self) -> &Arc<InteractionRuntime> {
        &self.runtime
    }

    /// Sends a reply now. The first reply of an interaction is its initial
    /// response; the rest are follow-ups.
    pub async fn reply(&self, reply: impl Into<Reply>) -> TransportResult<()> {
        self.replies.send(reply).await
    }

    /// Makes subsequent replies visible to the invoking user only.
    pub fn set_ephemeral(&self, ephemeral: bool) {
        self.replies.set_ephemeral(ephemeral);
    }
}

impl fmt::Debug for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEvent")
            .field("label", &self.definition.label())
            .field("session", self.runtime.key())
            .finish_non_exhaustive()
    }
}
