//! Errors reported to miners.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an RPC call failed, as seen by the miner.
///
/// Each variant maps to a fixed protocol code; several share code -1 and
/// differ only in message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    #[error("Invalid params")]
    InvalidParams,

    #[error("Invalid login")]
    InvalidLogin,

    #[error("You are blacklisted")]
    Blacklisted,

    #[error("Work not ready")]
    WorkNotReady,

    #[error("Not subscribed")]
    NotSubscribed,

    #[error("Malformed PoW result")]
    MalformedPow,

    #[error("Duplicate share")]
    DuplicateShare,

    #[error("Invalid share")]
    InvalidShare,

    /// The share was good, but the address crossed its invalid-share budget.
    #[error("High rate of invalid shares")]
    HighInvalidRate,

    #[error("Method not found")]
    MethodNotFound,
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidParams
            | RpcError::InvalidLogin
            | RpcError::Blacklisted
            | RpcError::MalformedPow
            | RpcError::HighInvalidRate => -1,
            RpcError::WorkNotReady => 0,
            RpcError::DuplicateShare => 22,
            RpcError::InvalidShare => 23,
            RpcError::NotSubscribed => 25,
            RpcError::MethodNotFound => -3,
        }
    }

    /// Whether the transport should drop the connection after replying.
    pub fn closes_connection(&self) -> bool {
        matches!(self, RpcError::Blacklisted | RpcError::InvalidShare)
    }
}

/// Wire form of an error: `{"code": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: i32,
    pub message: String,
}

impl From<RpcError> for ErrorReply {
    fn from(err: RpcError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
