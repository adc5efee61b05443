//! Reply bookkeeping for a single interaction.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use herald_core::{BoxedTransport, Interaction, Reply, ReplyOptions, TransportResult};
use tracing::{debug, trace, warn};

/// Sends acknowledgments and replies for one interaction.
///
/// The first [`send`](Self::send) acknowledges if nobody has yet and goes out
/// as the initial response; every later one is a follow-up. Acknowledgment is
/// attempted at most once no matter how many callers race for it.
pub struct ReplyContext {
    transport: BoxedTransport,
    interaction: Arc<Interaction>,
    acknowledged: AtomicBool,
    replied: AtomicBool,
    ephemeral: AtomicBool,
}

impl ReplyContext {
    pub fn new(transport: BoxedTransport, interaction: Arc<Interaction>) -> Self {
        Self {
            transport,
            interaction,
            acknowledged: AtomicBool::new(false),
            replied: AtomicBool::new(false),
            ephemeral: AtomicBool::new(false),
        }
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    pub fn has_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral.load(Ordering::Acquire)
    }

    /// Applies to acknowledgment and to every reply sent afterwards.
    pub fn set_ephemeral(&self, ephemeral: bool) {
        self.ephemeral.store(ephemeral, Ordering::Release);
    }

    /// Acknowledges the interaction. Later calls are no-ops.
    pub async fn acknowledge(&self) -> TransportResult<()> {
        if self.acknowledged.swap(true, Ordering::AcqRel) {
            trace!("Interaction already acknowledged");
            return Ok(());
        }
        let ephemeral = self.is_ephemeral();
        debug!(id = self.interaction.id(), ephemeral, "Acknowledging interaction");
        self.transport
            .acknowledge(&self.interaction, ephemeral)
            .await
    }

    /// Sends `reply`, acknowledging first when that has not happened yet.
    ///
    /// A failed acknowledgment is logged and the reply still goes out.
    pub async fn send(&self, reply: impl Into<Reply>) -> TransportResult<()> {
        let reply = reply.into();
        if let Err(error) = self.acknowledge().await {
            warn!(%error, id = self.interaction.id(), "Acknowledgment failed, replying anyway");
        }

        let ephemeral = self.is_ephemeral();
        let options = if self.replied.swap(true, Ordering::AcqRel) {
            ReplyOptions::follow_up(ephemeral)
        } else {
            ReplyOptions::initial(ephemeral)
        };
        trace!(stage = ?options.stage, "Sending reply");
        self.transport
            .reply(&self.interaction, &reply, options)
            .await
    }
}

impl fmt::Debug for ReplyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyContext")
            .field("interaction", &self.interaction.id())
            .field("acknowledged", &self.is_acknowledged())
            .field("replied", &self.has_replied())
            .field("ephemeral", &self.is_ephemeral())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use herald_core::ReplyStage;

    use super::testing::RecordingTransport;
    use super::*;

    fn context(transport: &Arc<RecordingTransport>) -> ReplyContext {
        let transport: BoxedTransport = transport.clone();
        ReplyContext::new(
            transport,
            Arc::new(Interaction::command("ping", "alice", "general")),
        )
    }

    #[tokio::test]
    async fn test_acknowledge_once() {
        let transport = Arc::new(RecordingTransport::default());
        let replies = context(&transport);

        tokio_test::assert_ok!(replies.acknowledge().await);
        tokio_test::assert_ok!(replies.acknowledge().await);
        assert_eq!(transport.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_first_reply_is_initial() {
        let transport = Arc::new(RecordingTransport::default());
        let replies = context(&transport);
        replies.set_ephemeral(true);

        tokio_test::assert_ok!(replies.send("one").await);
        tokio_test::assert_ok!(replies.send("two").await);

        assert_eq!(transport.ack_count(), 1);
        assert_eq!(transport.acks.lock()[0], ("ping".to_string(), true));
        let sent = transport.replies();
        assert_eq!(sent[0].1.stage, ReplyStage::Initial);
        assert_eq!(sent[1].1.stage, ReplyStage::FollowUp);
        assert!(sent.iter().all(|(_, options)| options.ephemeral));
    }

    #[tokio::test]
    async fn test_reply_sent_when_acknowledge_fails() {
        let transport = Arc::new(RecordingTransport {
            fail_acks: true,
            ..Default::default()
        });
        let replies = context(&transport);

        tokio_test::assert_err!(replies.acknowledge().await);
        tokio_test::assert_ok!(replies.send("still here").await);
        tokio_test::assert_ok!(replies.send("again").await);

        assert_eq!(transport.ack_count(), 1);
        let sent = transport.replies();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, Reply::text("still here"));
        assert_eq!(sent[0].1.stage, ReplyStage::Initial);
        assert_eq!(sent[1].1.stage, ReplyStage::FollowUp);
    }
}
