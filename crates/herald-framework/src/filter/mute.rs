//! Guild, channel and user muting.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Filter;
use crate::context::ExecutionContext;

/// Muted guild, channel and user identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuteSettings {
    pub guilds: BTreeSet<String>,
    pub channels: BTreeSet<String>,
    pub users: BTreeSet<String>,
}

/// Drops interactions from muted guilds, channels or users before routing.
///
/// The settings can be changed while the engine runs; every dispatch reads the
/// current state.
#[derive(Debug, Default)]
pub struct MuteFilter {
    settings: RwLock<MuteSettings>,
}

impl MuteFilter {
    pub fn new(settings: MuteSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// A snapshot of the current settings.
    pub fn settings(&self) -> MuteSettings {
        self.settings.read().clone()
    }

    pub fn mute_guild(&self, guild_id: impl Into<String>) -> bool {
        self.settings.write().guilds.insert(guild_id.into())
    }

    pub fn unmute_guild(&self, guild_id: &str) -> bool {
        self.settings.write().guilds.remove(guild_id)
    }

    pub fn mute_channel(&self, channel_id: impl Into<String>) -> bool {
        self.settings.write().channels.insert(channel_id.into())
    }

    pub fn unmute_channel(&self, channel_id: &str) -> bool {
        self.settings.write().channels.remove(channel_id)
    }

    pub fn mute_user(&self, user_id: impl Into<String>) -> bool {
        self.settings.write().users.insert(user_id.into())
    }

    pub fn unmute_user(&self, user_id: &str) -> bool {
        self.settings.write().users.remove(user_id)
    }

    fn check(&self, ctx: &ExecutionContext) -> Option<&'static str> {
        let settings = self.settings.read();
        let interaction = ctx.interaction();
        if let Some(guild) = interaction.guild_id()
            && settings.guilds.contains(guild)
        {
            return Some("Commands are muted in this guild.");
        }
        if settings.channels.contains(interaction.channel_id()) {
            return Some("Commands are muted in this channel.");
        }
        if settings.users.contains(interaction.user_id()) {
            return Some("You are muted.");
        }
        None
    }
}

#[async_trait]
impl Filter for MuteFilter {
    fn name(&self) -> &str {
        "mute"
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        if let Some(reason) = self.check(ctx) {
            debug!(session = %ctx.session(), reason, "Interaction muted");
            ctx.reject(self.name(), reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use herald_core::Interaction;

    use super::*;

    fn ctx(interaction: Interaction) -> ExecutionContext {
        ExecutionContext::new(Arc::new(interaction))
    }

    #[tokio::test]
    async fn test_muted_channel_rejects() {
        let filter = MuteFilter::default();
        filter.mute_channel("spam");

        let mut muted = ctx(Interaction::command("ping", "alice", "spam"));
        filter.apply(&mut muted).await;
        assert!(muted.is_cancelled());

        let mut allowed = ctx(Interaction::command("ping", "alice", "general"));
        filter.apply(&mut allowed).await;
        assert!(!allowed.is_cancelled());
    }

    #[tokio::test]
    async fn test_guild_and_user_mutes() {
        let filter = MuteFilter::new(MuteSettings {
            guilds: BTreeSet::from(["g1".to_string()]),
            users: BTreeSet::from(["troll".to_string()]),
            ..Default::default()
        });

        let mut in_guild = ctx(Interaction::command("ping", "alice", "c").in_guild("g1"));
        filter.apply(&mut in_guild).await;
        assert!(in_guild.is_cancelled());

        let mut troll = ctx(Interaction::command("ping", "troll", "c"));
        filter.apply(&mut troll).await;
        assert!(troll.is_cancelled());

        assert!(filter.unmute_user("troll"));
        let mut troll = ctx(Interaction::command("ping", "troll", "c"));
        filter.apply(&mut troll).await;
        assert!(!troll.is_cancelled());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: MuteSettings = serde_json::from_str(r#"{"channels": ["c1"]}"#).unwrap();
        assert!(settings.guilds.is_empty());
        assert!(settings.channels.contains("c1"));
    }
}
