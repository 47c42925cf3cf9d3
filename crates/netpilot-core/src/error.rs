// ── Manager error types ──
//
// Every fallible Manager operation reports one of these kinds. Success is
// `Ok(())`; asynchronous fan-out operations deliver their terminal result
// through a `ResultCallback` instead of the return value.

use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::store::StoreError;

/// Terminal callback for a multi-branch asynchronous operation.
pub type ResultCallback = Box<dyn FnOnce(Result<(), ManagerError>)>;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Already exists: {message}")]
    AlreadyExists { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Not supported: {message}")]
    NotSupported { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    // ── Asynchronous completion ──────────────────────────────────────
    /// Sentinel: the operation is in flight and will report later.
    #[error("Operation initiated")]
    OperationInitiated,

    #[error("Operation timed out")]
    OperationTimeout,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::OperationInitiated => ErrorKind::OperationInitiated,
            Self::OperationTimeout => ErrorKind::OperationTimeout,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// `false` only for the in-flight sentinel.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::OperationInitiated)
    }
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Flat classification of a result, including success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Success,
    InvalidArguments,
    AlreadyExists,
    NotFound,
    NotSupported,
    InternalError,
    PermissionDenied,
    OperationInitiated,
    OperationTimeout,
}

impl ErrorKind {
    pub fn of(result: &Result<(), ManagerError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => e.kind(),
        }
    }
}
