//! The definition model.
//!
//! An [`InteractionDefinition`] is the immutable description of one routable
//! command: its label, positional parameters, flags, required permissions and
//! the type-erased handler bound to a controller type. Definitions are built
//! once through [`InteractionRegistry::builder`] and shared read-only by every
//! dispatch.
//!
//! Building the registry is where every declaration error surfaces: duplicate
//! labels, malformed parameter lists, unknown parameter types and handlers
//! whose arguments do not match the declared parameters. Nothing of the sort
//! is checked at dispatch time.

mod builder;
mod parameter;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapter::TypeAdapterRegistry;
use crate::error::DefinitionError;
use crate::handler::{BoxedHandler, TypeKey};
use crate::validation::ValidatorRegistry;

pub(crate) use builder::normalize_label;
pub use builder::{CommandBuilder, command};
pub use parameter::{
    Constraint, ConstraintDefinition, DEFAULT_CONSTRAINT_MESSAGE, Param, ParameterDefinition,
};

// ============================================================================
// InteractionDefinition
// ============================================================================

/// An immutable, routable command.
pub struct InteractionDefinition {
    label: String,
    description: String,
    parameters: Vec<ParameterDefinition>,
    guild_only: bool,
    active: bool,
    ephemeral: bool,
    permissions: BTreeSet<String>,
    controller: TypeKey,
    handler: BoxedHandler,
}

impl InteractionDefinition {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    pub fn is_guild_only(&self) -> bool {
        self.guild_only
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// The controller type whose instance the handler is called with.
    pub fn controller(&self) -> TypeKey {
        self.controller
    }

    /// A fresh handle to the (possibly layered) handler service.
    pub fn handler(&self) -> BoxedHandler {
        self.handler.clone()
    }

    /// One-line usage, e.g. `greet name:<String> [times:<u8>]`.
    pub fn usage(&self) -> String {
        std::iter::once(self.label.clone())
            .chain(self.parameters.iter().map(ParameterDefinition::usage))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for InteractionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionDefinition")
            .field("label", &self.label)
            .field("parameters", &self.parameters)
            .field("guild_only", &self.guild_only)
            .field("active", &self.active)
            .field("ephemeral", &self.ephemeral)
            .field("permissions", &self.permissions)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// InteractionRegistry
// ============================================================================

/// All definitions, indexed by label.
#[derive(Debug, Default)]
pub struct InteractionRegistry {
    definitions: Vec<Arc<InteractionDefinition>>,
    by_label: HashMap<String, usize>,
}

impl InteractionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Exact-match lookup on the fully-qualified label.
    pub fn resolve(&self, label: &str) -> Option<Arc<InteractionDefinition>> {
        self.by_label
            .get(label)
            .map(|&index| Arc::clone(&self.definitions[index]))
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<InteractionDefinition>> {
        self.definitions.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|definition| definition.label())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Collects command declarations and validates them into an
/// [`InteractionRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: Vec<CommandBuilder>,
}

impl RegistryBuilder {
    pub fn command(mut self, command: CommandBuilder) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands(mut self, commands: impl IntoIterator<Item = CommandBuilder>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Resolves every declaration against the populated adapter and validator
    /// registries.
    ///
    /// Constraints whose kind has no validator for the parameter type are
    /// skipped with a warning.
    pub fn build(
        self,
        adapters: &TypeAdapterRegistry,
        validators: &ValidatorRegistry,
    ) -> Result<InteractionRegistry, DefinitionError> {
        let mut registry = InteractionRegistry::default();

        for command in self.commands {
            let definition = command.build(adapters, validators)?;
            if registry.by_label.contains_key(definition.label()) {
                return Err(DefinitionError::DuplicateLabel(definition.label().to_string()));
            }
            debug!(
                label = definition.label(),
                parameters = definition.parameters().len(),
                controller = %definition.controller(),
                "Registered interaction"
            );
            registry
                .by_label
                .insert(definition.label().to_string(), registry.definitions.len());
            registry.definitions.push(Arc::new(definition));
        }

        info!(count = registry.len(), "Interaction registry built");
        Ok(registry)
    }
}
