//! Errors raised by domain invariants, independent of persistence or
//! transport. Grounded on the shape of `crate::db::DbError`: one typed enum
//! per layer rather than a string.

use thiserror::Error;

use iib_events::BuildState;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown state {0:?}, valid states are {1}")]
    UnknownState(String, String),

    #[error("cannot transition request from terminal state {from} to {to}")]
    TerminalTransition { from: BuildState, to: BuildState },

    #[error("unknown request type {0:?}")]
    UnknownRequestType(String),

    #[error("unrecognized parameter(s): {0}")]
    UnrecognizedParameters(String),

    #[error("{0}")]
    Validation(String),

    #[error("the batch must be a positive integer")]
    InvalidBatch,

    #[error("overwrite_from_index_token was provided without overwrite_from_index")]
    TokenWithoutOverwrite,

    #[error("overwrite_from_index requires a privileged user or a token")]
    OverwriteRequiresPrivilege,
}
