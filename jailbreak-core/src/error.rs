//! Crate-level error type and the failure taxonomy callers branch on.

use crate::chain::ChainError;
use crate::graph::GraphError;
use crate::id::{LevelId, MalformedId};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Prompt chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] jailbreak_api::Error),

    #[error("{0}")]
    MalformedId(#[from] MalformedId),

    #[error("Level {0} is locked")]
    LevelLocked(LevelId),

    #[error("Invalid edit: {0}")]
    Invalid(String),
}

/// Coarse failure categories, one per user-facing treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No levels available. Blocks game start.
    GraphEmpty,
    /// An admin edit named a chain position that does not exist.
    PredecessorNotFound,
    /// Wrong password. Only ever reported through an attempt outcome.
    ValidationFailed,
    /// Network or backend failure.
    TransportError,
    /// Local storage could not be read or written.
    StorageUnavailable,
    /// A referenced level or component does not exist.
    NotFound,
    /// The request would break a graph or chain invariant.
    Invalid,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Graph(GraphError::Empty) => ErrorKind::GraphEmpty,
            Error::Graph(GraphError::LevelNotFound(_)) => ErrorKind::NotFound,
            Error::Graph(_) => ErrorKind::Invalid,
            Error::Chain(ChainError::PredecessorNotFound { .. }) => ErrorKind::PredecessorNotFound,
            Error::Chain(ChainError::ComponentNotFound(_) | ChainError::NotInChain { .. }) => {
                ErrorKind::NotFound
            }
            Error::Chain(_) => ErrorKind::Invalid,
            Error::Storage(_) => ErrorKind::StorageUnavailable,
            Error::Transport(_) => ErrorKind::TransportError,
            Error::MalformedId(_) | Error::LevelLocked(_) | Error::Invalid(_) => ErrorKind::Invalid,
        }
    }

    /// Everything except an empty graph can be retried or worked around.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::GraphEmpty
    }
}
