//! Filters enforcing definition flags.

use async_trait::async_trait;
use tracing::debug;

use super::Filter;
use crate::context::ExecutionContext;

/// Rejects definitions marked inactive. Register at `BeforeAdapting`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveFilter;

#[async_trait]
impl Filter for ActiveFilter {
    fn name(&self) -> &str {
        "active"
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        let inactive = ctx
            .definition()
            .is_some_and(|definition| !definition.is_active());
        if inactive {
            debug!(label = ctx.interaction().label(), "Command is disabled");
            ctx.reject(self.name(), "This command is disabled.");
        }
    }
}

/// Rejects guild-only definitions invoked outside a guild. Register at
/// `BeforeAdapting`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuildOnlyFilter;

#[async_trait]
impl Filter for GuildOnlyFilter {
    fn name(&self) -> &str {
        "guild_only"
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        let guild_only = ctx
            .definition()
            .is_some_and(|definition| definition.is_guild_only());
        if guild_only && !ctx.interaction().is_from_guild() {
            ctx.reject(self.name(), "This command can only be used inside a guild.");
        }
    }
}
