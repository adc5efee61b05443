//! Error types for the Herald framework.
//!
//! - [`DispatchError`] is the pipeline taxonomy: every failure detected while
//!   dispatching an interaction becomes exactly one of these.
//! - [`DefinitionError`] is raised while building the interaction registry.
//! - [`ArgumentError`], [`ProvideError`] and [`ParseError`] cover the
//!   type-erased argument hand-off, controller construction and command-line
//!   parsing respectively.

use herald_core::{ErrorContent, Reply};
use thiserror::Error;

/// The user-facing message for failures whose details must not leak.
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An internal error occurred while processing this command. Please try again later.";

/// Boxed error type used by handlers and handler middleware.
pub type BoxError = tower::BoxError;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Discriminant of a [`DispatchError`], handy for assertions and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchErrorKind {
    Routing,
    FilterRejection,
    MissingArgument,
    AdaptationFailure,
    ConstraintViolation,
    HandlerFailure,
}

/// A failure detected while dispatching an interaction.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No definition is registered under the interaction's label.
    #[error("no interaction registered for label '{label}'")]
    Routing { label: String },

    /// A filter cancelled the pipeline.
    #[error("rejected by filter '{filter}': {reason}")]
    FilterRejection { filter: String, reason: String },

    /// A required parameter received no token.
    #[error("missing required argument '{parameter}'")]
    MissingArgument { parameter: String },

    /// A token could not be converted to the parameter's type.
    #[error("could not convert '{raw}' to {expected} for argument '{parameter}'")]
    AdaptationFailure {
        parameter: String,
        raw: String,
        expected: String,
    },

    /// An adapted value failed a constraint.
    #[error("argument '{parameter}' violates constraint '{constraint}': {message}")]
    ConstraintViolation {
        parameter: String,
        constraint: String,
        message: String,
    },

    /// The handler returned an error, panicked, or its controller could not be
    /// provided.
    #[error("handler for '{label}' failed: {reason}")]
    HandlerFailure { label: String, reason: String },
}

impl DispatchError {
    pub fn rejection(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FilterRejection {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn handler_failure(label: impl Into<String>, reason: impl ToString) -> Self {
        Self::HandlerFailure {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            Self::Routing { .. } => DispatchErrorKind::Routing,
            Self::FilterRejection { .. } => DispatchErrorKind::FilterRejection,
            Self::MissingArgument { .. } => DispatchErrorKind::MissingArgument,
            Self::AdaptationFailure { .. } => DispatchErrorKind::AdaptationFailure,
            Self::ConstraintViolation { .. } => DispatchErrorKind::ConstraintViolation,
            Self::HandlerFailure { .. } => DispatchErrorKind::HandlerFailure,
        }
    }

    /// Internal failures are logged at `error` and answered with
    /// [`INTERNAL_ERROR_MESSAGE`]; everything else was caused by the user.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Routing { .. } | Self::HandlerFailure { .. })
    }

    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Routing { .. } | Self::HandlerFailure { .. } => INTERNAL_ERROR_MESSAGE.to_string(),
            Self::FilterRejection { reason, .. } => reason.clone(),
            Self::MissingArgument { parameter } => {
                format!("Missing required argument `{parameter}`.")
            }
            Self::AdaptationFailure {
                parameter,
                raw,
                expected,
            } => format!("`{raw}` is not a valid {expected} for argument `{parameter}`."),
            Self::ConstraintViolation { message, .. } => message.clone(),
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Routing { .. } | Self::HandlerFailure { .. } => "Internal Error",
            Self::FilterRejection { .. } => "Request Rejected",
            Self::MissingArgument { .. } => "Missing Argument",
            Self::AdaptationFailure { .. } => "Invalid Argument",
            Self::ConstraintViolation { .. } => "Constraint Violated",
        }
    }

    /// Renders the error reply sent to the user.
    pub fn to_reply(&self) -> Reply {
        Reply::Error(ErrorContent::new(self.title(), self.user_message()))
    }
}

// =============================================================================
// Definition Errors
// =============================================================================

/// Errors raised while building the interaction registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("interaction label must not be empty")]
    EmptyLabel,

    #[error("duplicate interaction label '{0}'")]
    DuplicateLabel(String),

    #[error("'{label}': no handler bound")]
    MissingHandler { label: String },

    #[error("'{label}': duplicate parameter name '{parameter}'")]
    DuplicateParameter { label: String, parameter: String },

    #[error("'{label}': parameter '{parameter}' is concat but has type {ty}; concat requires String")]
    ConcatRequiresString {
        label: String,
        parameter: String,
        ty: String,
    },

    #[error("'{label}': concat parameter '{parameter}' must be the last parameter")]
    ConcatNotLast { label: String, parameter: String },

    #[error("'{label}': required parameter '{parameter}' follows an optional parameter")]
    RequiredAfterOptional { label: String, parameter: String },

    #[error(
        "'{label}': optional parameter '{parameter}' of type {ty} needs a default value (the type has no zero value)"
    )]
    MissingDefault {
        label: String,
        parameter: String,
        ty: String,
    },

    #[error("'{label}': no type adapter registered for parameter '{parameter}' of type {ty}")]
    MissingAdapter {
        label: String,
        parameter: String,
        ty: String,
    },

    #[error("'{label}': handler takes ({expected}) but parameters declare ({declared})")]
    SignatureMismatch {
        label: String,
        expected: String,
        declared: String,
    },
}

// =============================================================================
// Argument / Provide / Parse Errors
// =============================================================================

/// Errors while handing type-erased values to a typed handler.
///
/// These indicate a registry/handler mismatch and surface as a
/// [`DispatchError::HandlerFailure`].
#[derive(Debug, Clone, Error)]
pub enum ArgumentError {
    #[error("argument type mismatch: expected '{expected}'")]
    TypeMismatch { expected: &'static str },

    #[error("argument of type '{expected}' is unset")]
    Missing { expected: &'static str },

    #[error("controller type mismatch: expected '{expected}'")]
    InstanceMismatch { expected: &'static str },
}

/// Errors while constructing a controller instance.
#[derive(Debug, Clone, Error)]
pub enum ProvideError {
    #[error("no controller factory registered for '{0}'")]
    Unregistered(&'static str),

    #[error("failed to construct controller '{controller}': {reason}")]
    Construction {
        controller: &'static str,
        reason: String,
    },
}

impl ProvideError {
    pub fn construction(controller: &'static str, reason: impl ToString) -> Self {
        Self::Construction {
            controller,
            reason: reason.to_string(),
        }
    }
}

/// Errors while turning a command line into an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,

    #[error("command line has options but no label")]
    MissingLabel,

    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("invalid option '{0}': option names must not be empty")]
    InvalidOption(String),
}
