//! Permission gate.
//!
//! The engine only knows that a definition requires a set of permission
//! names. Whether a user holds them is answered by a [`PermissionResolver`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Filter;
use crate::context::ExecutionContext;
use herald_core::Interaction;

/// Decides whether the invoking user holds every required permission.
#[async_trait]
pub trait PermissionResolver: Send + Sync + 'static {
    async fn has_permissions(&self, interaction: &Interaction, required: &BTreeSet<String>)
    -> bool;
}

/// Rejects invocations of definitions whose required permissions the user
/// lacks. Register at `BeforeExecution`.
pub struct PermissionFilter {
    resolver: Arc<dyn PermissionResolver>,
}

impl PermissionFilter {
    pub fn new(resolver: impl PermissionResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    pub fn from_arc(resolver: Arc<dyn PermissionResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Filter for PermissionFilter {
    fn name(&self) -> &str {
        "permission"
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        let Some(definition) = ctx.definition().cloned() else {
            return;
        };
        if definition.permissions().is_empty() {
            return;
        }

        let interaction = ctx.interaction_arc();
        if !self
            .resolver
            .has_permissions(&interaction, definition.permissions())
            .await
        {
            debug!(
                user = interaction.user_id(),
                required = ?definition.permissions(),
                "Insufficient permissions"
            );
            ctx.reject(self.name(), "Insufficient permissions.");
        }
    }
}

/// A fixed user → permissions table.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: HashMap<String, BTreeSet<String>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `permission` to `user_id`.
    pub fn grant(mut self, user_id: impl Into<String>, permission: impl Into<String>) -> Self {
        self.grants
            .entry(user_id.into())
            .or_default()
            .insert(permission.into());
        self
    }
}

#[async_trait]
impl PermissionResolver for StaticPermissions {
    async fn has_permissions(
        &self,
        interaction: &Interaction,
        required: &BTreeSet<String>,
    ) -> bool {
        required.is_empty()
            || self
                .grants
                .get(interaction.user_id())
                .is_some_and(|granted| required.is_subset(granted))
    }
}
