//! Runtime error types.

use herald_framework::{DefinitionError, ParseError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or driving a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The interaction registry could not be built.
    #[error("Invalid interaction definitions: {0}")]
    Definition(#[from] DefinitionError),

    #[error("No interactions registered")]
    NoInteractions,

    /// A command line could not be turned into an interaction.
    #[error("Invalid command line: {0}")]
    Parse(#[from] ParseError),

    /// The runtime has been shut down and accepts no more work.
    #[error("Runtime is shutting down")]
    ShuttingDown,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
