use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A precondition failed before anything was mutated.
    #[error("{0}")]
    Validation(String),

    #[error("cannot start a new change while change {change_id} is in progress")]
    ConcurrentChange { change_id: u64 },

    /// The topology moved on after a plan was computed against it.
    #[error("topology changed from version {expected} to {actual} while planning")]
    StaleTopology { expected: u64, actual: u64 },

    #[error("operation failed: {0}")]
    Execution(String),

    #[error("request timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("leadership lost")]
    LeadershipLost,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    #[error(transparent)]
    Config(#[from] envconfig::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::InvalidRequest,
            Error::ConcurrentChange { .. } | Error::StaleTopology { .. } => {
                ErrorCode::ConcurrentModification
            }
            Error::NotFound(_) | Error::InvalidState(_) => ErrorCode::OperationNotAllowed,
            Error::Execution(_)
            | Error::TransportTimeout(_)
            | Error::Unavailable(_)
            | Error::LeadershipLost
            | Error::Serialization(_)
            | Error::Etcd(_)
            | Error::Config(_) => ErrorCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error classes surfaced to management clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidRequest,
    OperationNotAllowed,
    ConcurrentModification,
    InternalError,
}

/// Error payload carried back over the management transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<ErrorResponse> for Error {
    fn from(response: ErrorResponse) -> Self {
        match response.code {
            ErrorCode::InvalidRequest => Error::Validation(response.message),
            ErrorCode::OperationNotAllowed => Error::InvalidState(response.message),
            // The change id does not survive the round trip; callers re-query the topology.
            ErrorCode::ConcurrentModification => Error::ConcurrentChange { change_id: 0 },
            ErrorCode::InternalError => Error::Execution(response.message),
        }
    }
}
