//! Tagged error sum shared across the storage, room, tool, and transport layers.
//!
//! Domain code never panics on expected failure paths; every fallible
//! operation returns a `RoomError` and the transport boundary maps it to a
//! JSON-RPC error code (`to_jsonrpc_code`) or an HTTP status
//! (`to_http_status`) as appropriate for the surface that's calling.

use rocket::http::Status;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum RoomError {
    // --- validation ---
    #[error("invalid agent name")]
    InvalidAgentName,
    #[error("invalid file path")]
    InvalidFilePath,
    #[error("invalid params: {field}")]
    InvalidParams { field: String },

    // --- domain ---
    #[error("room not initialized")]
    NotInitialized,
    #[error("task not found: {id}")]
    TaskNotFound { id: String },
    #[error("task already claimed by {by}")]
    TaskAlreadyClaimed { by: String },
    #[error("file locked by {by}")]
    FileLocked { by: String },
    #[error("not the lock owner")]
    NotOwner,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // --- access ---
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    PermissionDenied,
    #[error("token expired")]
    TokenExpired,
    #[error("rate limited, retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },

    // --- transport ---
    #[error("method not found: {name}")]
    MethodNotFound { name: String },
    #[error("unsupported protocol version: {version}")]
    UnsupportedProtocolVersion { version: String },
    #[error("invalid origin: {origin}")]
    InvalidOrigin { origin: String },

    // --- infrastructure ---
    #[error("conflict, retry exhausted")]
    Conflict,
    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
    #[error("operation timed out")]
    Timeout,
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl RoomError {
    /// JSON-RPC 2.0 error code per spec.md §7.
    pub fn to_jsonrpc_code(&self) -> i64 {
        match self {
            RoomError::InvalidParams { .. } => -32602,
            RoomError::MethodNotFound { .. } => -32601,
            RoomError::UnsupportedProtocolVersion { .. } | RoomError::InvalidOrigin { .. } => {
                -32600
            }
            RoomError::Unauthorized
            | RoomError::PermissionDenied
            | RoomError::TokenExpired
            | RoomError::RateLimited { .. } => -32600,
            _ => -32603,
        }
    }

    pub fn to_http_status(&self) -> Status {
        match self {
            RoomError::Unauthorized | RoomError::TokenExpired => Status::Unauthorized,
            RoomError::PermissionDenied => Status::Forbidden,
            RoomError::TaskNotFound { .. } => Status::NotFound,
            RoomError::TaskAlreadyClaimed { .. }
            | RoomError::FileLocked { .. }
            | RoomError::Conflict => Status::Conflict,
            RoomError::InvalidAgentName
            | RoomError::InvalidFilePath
            | RoomError::InvalidParams { .. }
            | RoomError::InvalidTransition { .. }
            | RoomError::NotOwner => Status::BadRequest,
            RoomError::RateLimited { .. } => Status::TooManyRequests,
            RoomError::UnsupportedProtocolVersion { .. } | RoomError::InvalidOrigin { .. } => {
                Status::BadRequest
            }
            RoomError::MethodNotFound { .. } => Status::NotFound,
            RoomError::NotInitialized
            | RoomError::BackendUnavailable { .. }
            | RoomError::Timeout
            | RoomError::Internal { .. } => Status::InternalServerError,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, RoomError::Conflict | RoomError::BackendUnavailable { .. })
    }
}

pub type RoomResult<T> = Result<T, RoomError>;
