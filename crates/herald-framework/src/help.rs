//! Help rendering.
//!
//! Help interactions never reach adaptation or a handler. The dispatcher looks
//! up the requested label and asks a [`HelpRenderer`] for either the help of
//! that one command or an overview of all of them.

use herald_core::{Reply, RichContent};

use crate::context::ExecutionContext;
use crate::definition::{InteractionDefinition, InteractionRegistry};

/// Renders help replies.
pub trait HelpRenderer: Send + Sync + 'static {
    /// Overview shown when no (known) command was asked about.
    fn generic_help(&self, registry: &InteractionRegistry, ctx: &ExecutionContext) -> Reply;

    /// Help for a single command.
    fn specific_help(&self, definition: &InteractionDefinition, ctx: &ExecutionContext) -> Reply;
}

/// Plain rich-content help.
#[derive(Debug, Clone, Default)]
pub struct DefaultHelpRenderer;

impl HelpRenderer for DefaultHelpRenderer {
    fn generic_help(&self, registry: &InteractionRegistry, _ctx: &ExecutionContext) -> Reply {
        let mut content = RichContent::new().title("Available commands");
        let mut any = false;
        for definition in registry.iter().filter(|d| d.is_active()) {
            let description = match definition.description() {
                "" => "No description",
                description => description,
            };
            content = content.field(definition.label(), description);
            any = true;
        }
        if !any {
            content = content.description("No commands are available.");
        }
        Reply::Rich(content)
    }

    fn specific_help(&self, definition: &InteractionDefinition, _ctx: &ExecutionContext) -> Reply {
        let mut content = RichContent::new()
            .title(format!("Command: {}", definition.label()))
            .field("Usage", definition.usage());
        if !definition.description().is_empty() {
            content = content.description(definition.description());
        }
        for parameter in definition.parameters() {
            if !parameter.description().is_empty() {
                content = content.inline_field(parameter.name(), parameter.description());
            }
        }
        if definition.is_guild_only() {
            content = content.footer("Only available inside a guild");
        }
        Reply::Rich(content)
    }
}
