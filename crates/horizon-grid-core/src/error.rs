//! Error types for Horizon Grid core.

use thiserror::Error;

use crate::async_runtime::AsyncRuntimeError;

/// Any failure raised by the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] AsyncRuntimeError),
}

/// Failures reported by [`Signal`](crate::Signal).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The connection id is unknown or was already disconnected.
    #[error("Invalid or disconnected connection ID")]
    InvalidConnection,
}

pub type Result<T> = std::result::Result<T, CoreError>;
