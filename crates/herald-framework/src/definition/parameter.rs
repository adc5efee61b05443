//! Parameter and constraint definitions.
//!
//! [`Param`] and [`Constraint`] are the builder-side descriptions a command is
//! declared with. Building the registry resolves them into the immutable
//! [`ParameterDefinition`] and [`ConstraintDefinition`] the dispatcher reads.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::handler::{ArgShape, ArgValue, FromArg, TypeKey};
use crate::validation::Validator;

/// The failure message used when a constraint declares none.
pub const DEFAULT_CONSTRAINT_MESSAGE: &str = "Parameter validation failed";

// ============================================================================
// Builder side
// ============================================================================

/// A constraint as declared on a [`Param`].
#[derive(Debug, Clone)]
pub struct Constraint {
    pub(crate) kind: String,
    pub(crate) config: Value,
    pub(crate) message: Option<String>,
}

impl Constraint {
    /// A constraint of `kind` with validator configuration `config`.
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
            message: None,
        }
    }

    /// `value >= bound`.
    pub fn min(bound: impl Into<serde_json::Number>) -> Self {
        Self::new("min", serde_json::json!({ "value": bound.into() }))
    }

    /// `value <= bound`.
    pub fn max(bound: impl Into<serde_json::Number>) -> Self {
        Self::new("max", serde_json::json!({ "value": bound.into() }))
    }

    /// Sets the message reported when the constraint fails.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A parameter as declared on a command.
///
/// ```rust,ignore
/// Param::new::<String>("name").describe("Who to greet");
/// Param::new::<u8>("times").default("1").constraint(Constraint::max(5));
/// Param::new::<String>("text").concat();
/// ```
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) shape: ArgShape,
    pub(crate) concat: bool,
    pub(crate) optional: bool,
    pub(crate) default: Option<String>,
    pub(crate) constraints: Vec<Constraint>,
}

impl Param {
    /// A required parameter received by the handler as `T`.
    ///
    /// Declaring `Option<T>` uses `T`'s adapter and makes the parameter
    /// non-primitive: absence without a default reaches the handler as `None`.
    pub fn new<T: FromArg>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape: T::shape(),
            concat: false,
            optional: false,
            default: None,
            constraints: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Joins all remaining tokens into this parameter. Requires `String`.
    pub fn concat(mut self) -> Self {
        self.concat = true;
        self
    }

    /// Marks the parameter optional without a default.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the parameter optional with a default, converted through the
    /// same adapter as a supplied token. An empty default counts as none.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.optional = true;
        self.default = (!value.is_empty()).then_some(value);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

// ============================================================================
// Resolved side
// ============================================================================

/// A constraint bound to its validator.
#[derive(Clone)]
pub struct ConstraintDefinition {
    kind: String,
    validator: Arc<dyn Validator>,
    config: Value,
    message: String,
}

impl ConstraintDefinition {
    pub(crate) fn new(constraint: Constraint, validator: Arc<dyn Validator>) -> Self {
        Self {
            kind: constraint.kind,
            validator,
            config: constraint.config,
            message: constraint
                .message
                .unwrap_or_else(|| DEFAULT_CONSTRAINT_MESSAGE.to_string()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn validator(&self) -> &Arc<dyn Validator> {
        &self.validator
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for ConstraintDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintDefinition")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// An immutable parameter description.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    name: String,
    description: String,
    shape: ArgShape,
    concat: bool,
    optional: bool,
    default: Option<String>,
    constraints: Vec<ConstraintDefinition>,
}

impl ParameterDefinition {
    pub(crate) fn new(param: Param, constraints: Vec<ConstraintDefinition>) -> Self {
        Self {
            name: param.name,
            description: param.description,
            shape: param.shape,
            concat: param.concat,
            optional: param.optional,
            default: param.default,
            constraints,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The adapter type.
    pub fn ty(&self) -> TypeKey {
        self.shape.ty()
    }

    pub fn shape(&self) -> ArgShape {
        self.shape
    }

    pub fn is_concat(&self) -> bool {
        self.concat
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The declared type is non-nullable.
    pub fn is_primitive(&self) -> bool {
        !self.shape.is_nullable()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn constraints(&self) -> &[ConstraintDefinition] {
        &self.constraints
    }

    /// The value an optional parameter takes with neither token nor default:
    /// the zero value for primitive types, otherwise unset.
    pub fn absent_value(&self) -> Option<ArgValue> {
        if self.is_primitive() {
            self.shape.zero()
        } else {
            None
        }
    }

    /// Usage fragment such as `name:<String>` or `[times:<u8>]`.
    pub fn usage(&self) -> String {
        let core = if self.concat {
            format!("{}:<{}...>", self.name, self.ty())
        } else {
            format!("{}:<{}>", self.name, self.ty())
        };
        if self.optional {
            format!("[{core}]")
        } else {
            core
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_default_counts_as_none() {
        let param = Param::new::<i32>("n").default("");
        assert!(param.optional);
        assert_eq!(param.default, None);
    }

    #[test]
    fn test_absent_value() {
        let primitive = ParameterDefinition::new(Param::new::<i32>("n").optional(), Vec::new());
        let zero = primitive.absent_value().unwrap();
        assert_eq!(*zero.downcast::<i32>().unwrap(), 0);

        let nullable =
            ParameterDefinition::new(Param::new::<Option<i32>>("n").optional(), Vec::new());
        assert!(!nullable.is_primitive());
        assert!(nullable.absent_value().is_none());
    }

    #[test]
    fn test_usage() {
        let required = ParameterDefinition::new(Param::new::<String>("name"), Vec::new());
        assert_eq!(required.usage(), "name:<String>");
        let optional = ParameterDefinition::new(Param::new::<u8>("times").default("1"), Vec::new());
        assert_eq!(optional.usage(), "[times:<u8>]");
        let concat = ParameterDefinition::new(Param::new::<String>("text").concat(), Vec::new());
        assert_eq!(concat.usage(), "text:<String...>");
    }

    #[test]
    fn test_constraint_default_message() {
        let constraint = Constraint::min(1);
        assert_eq!(constraint.config, serde_json::json!({"value": 1}));
        assert_eq!(constraint.message, None);
        assert_eq!(
            Constraint::max(5).message("too many").message.as_deref(),
            Some("too many")
        );
    }
}
