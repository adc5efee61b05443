//! Declarative command builder.
//!
//! ```rust,ignore
//! use herald_framework::{command, Constraint, Param};
//!
//! let greet = command("greet")
//!     .description("Greets someone")
//!     .param(Param::new::<String>("name").describe("Who to greet"))
//!     .param(Param::new::<u8>("times").default("1").constraint(Constraint::max(5)))
//!     .handler(Greeter::greet);
//! ```
//!
//! Nothing is checked until the registry is built; see
//! [`RegistryBuilder::build`](super::RegistryBuilder::build).

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use herald_core::Reply;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use tracing::warn;

use super::InteractionDefinition;
use super::parameter::{ConstraintDefinition, Param, ParameterDefinition};
use crate::adapter::TypeAdapterRegistry;
use crate::error::{BoxError, DefinitionError};
use crate::handler::{ArgShape, BoxedHandler, Handler, Invocation, TypeKey, into_boxed_handler};
use crate::validation::ValidatorRegistry;

type LayerFn = Box<dyn FnOnce(BoxedHandler) -> BoxedHandler + Send>;

struct BoundHandler {
    controller: TypeKey,
    signature: Vec<ArgShape>,
    service: BoxedHandler,
}

/// Starts declaring a command routed by `label`.
pub fn command(label: impl Into<String>) -> CommandBuilder {
    CommandBuilder::new(label)
}

/// Builder for one [`InteractionDefinition`].
pub struct CommandBuilder {
    label: String,
    description: String,
    params: Vec<Param>,
    guild_only: bool,
    active: bool,
    ephemeral: bool,
    permissions: BTreeSet<String>,
    handler: Option<BoundHandler>,
    layers: Vec<LayerFn>,
}

impl CommandBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            params: Vec::new(),
            guild_only: false,
            active: true,
            ephemeral: false,
            permissions: BTreeSet::new(),
            handler: None,
            layers: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a parameter. Parameters are positional in declaration order.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn guild_only(mut self, guild_only: bool) -> Self {
        self.guild_only = guild_only;
        self
    }

    /// Inactive commands stay registered but are rejected when invoked.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Acknowledge and reply so only the invoking user sees the response.
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Adds a permission the invoking user must hold.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Binds the handler. The controller type `C` is taken from its first
    /// parameter, `Arc<C>`.
    pub fn handler<H, C, T>(mut self, handler: H) -> Self
    where
        H: Handler<C, T>,
        C: Send + Sync + 'static,
        T: 'static,
    {
        self.handler = Some(BoundHandler {
            controller: TypeKey::of::<C>(),
            signature: H::signature(),
            service: into_boxed_handler(handler),
        });
        self
    }

    /// Wraps the handler in a tower layer. Layers are applied in the order
    /// they are added, so the last one added is outermost.
    ///
    /// ```rust,ignore
    /// command("slow").handler(slow).layer(TimeoutLayer::new(Duration::from_secs(3)))
    /// ```
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedHandler> + Send + 'static,
        L::Service: Service<Invocation, Response = Option<Reply>> + Clone + Send + Sync + 'static,
        <L::Service as Service<Invocation>>::Error: Into<BoxError>,
        <L::Service as Service<Invocation>>::Future: Send + 'static,
    {
        self.layers.push(Box::new(move |inner: BoxedHandler| {
            BoxCloneSyncService::new(layer.layer(inner).map_err(
                |error: <L::Service as Service<Invocation>>::Error| -> BoxError { error.into() },
            ))
        }));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Validates the declaration and resolves it into a definition.
    pub(crate) fn build(
        self,
        adapters: &TypeAdapterRegistry,
        validators: &ValidatorRegistry,
    ) -> Result<InteractionDefinition, DefinitionError> {
        let label = normalize_label(&self.label);
        if label.is_empty() {
            return Err(DefinitionError::EmptyLabel);
        }

        let Some(bound) = self.handler else {
            return Err(DefinitionError::MissingHandler { label });
        };

        check_parameters(&label, &self.params, adapters)?;
        check_signature(&label, &self.params, &bound.signature)?;

        let parameters = self
            .params
            .into_iter()
            .map(|param| resolve_parameter(&label, param, validators))
            .collect();

        let handler = self
            .layers
            .into_iter()
            .fold(bound.service, |inner, layer| layer(inner));

        Ok(InteractionDefinition {
            label,
            description: self.description,
            parameters,
            guild_only: self.guild_only,
            active: self.active,
            ephemeral: self.ephemeral,
            permissions: self.permissions,
            controller: bound.controller,
            handler,
        })
    }
}

impl fmt::Debug for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuilder")
            .field("label", &self.label)
            .field("params", &self.params)
            .field("has_handler", &self.handler.is_some())
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

/// Collapses runs of whitespace so `"admin  ban"` and `"admin ban"` are the
/// same label.
pub(crate) fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_parameters(
    label: &str,
    params: &[Param],
    adapters: &TypeAdapterRegistry,
) -> Result<(), DefinitionError> {
    let mut names = HashSet::new();
    let mut seen_optional = false;

    for (index, param) in params.iter().enumerate() {
        let ty = param.shape.ty();
        let err_label = || label.to_string();

        if !names.insert(param.name.as_str()) {
            return Err(DefinitionError::DuplicateParameter {
                label: err_label(),
                parameter: param.name.clone(),
            });
        }
        if param.concat {
            if !ty.is::<String>() {
                return Err(DefinitionError::ConcatRequiresString {
                    label: err_label(),
                    parameter: param.name.clone(),
                    ty: ty.to_string(),
                });
            }
            if index + 1 != params.len() {
                return Err(DefinitionError::ConcatNotLast {
                    label: err_label(),
                    parameter: param.name.clone(),
                });
            }
        }
        if param.optional {
            seen_optional = true;
        } else if seen_optional {
            return Err(DefinitionError::RequiredAfterOptional {
                label: err_label(),
                parameter: param.name.clone(),
            });
        }
        if param.optional
            && param.default.is_none()
            && !param.shape.is_nullable()
            && !param.shape.has_zero()
        {
            return Err(DefinitionError::MissingDefault {
                label: err_label(),
                parameter: param.name.clone(),
                ty: ty.to_string(),
            });
        }
        if !adapters.contains(ty) {
            return Err(DefinitionError::MissingAdapter {
                label: err_label(),
                parameter: param.name.clone(),
                ty: ty.to_string(),
            });
        }
    }
    Ok(())
}

fn check_signature(
    label: &str,
    params: &[Param],
    signature: &[ArgShape],
) -> Result<(), DefinitionError> {
    let declared: Vec<ArgShape> = params.iter().map(|param| param.shape).collect();
    if declared != signature {
        let render = |shapes: &[ArgShape]| {
            shapes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Err(DefinitionError::SignatureMismatch {
            label: label.to_string(),
            expected: render(signature),
            declared: render(&declared),
        });
    }
    Ok(())
}

fn resolve_parameter(
    label: &str,
    mut param: Param,
    validators: &ValidatorRegistry,
) -> ParameterDefinition {
    let ty = param.shape.ty();
    let constraints = std::mem::take(&mut param.constraints)
        .into_iter()
        .filter_map(|constraint| match validators.get(&constraint.kind, ty) {
            Some(validator) => Some(ConstraintDefinition::new(constraint, validator)),
            None => {
                warn!(
                    label,
                    parameter = %param.name,
                    kind = %constraint.kind,
                    ty = %ty,
                    "No validator registered for constraint, skipping"
                );
                None
            }
        })
        .collect();
    ParameterDefinition::new(param, constraints)
}
