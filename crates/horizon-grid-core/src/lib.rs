//! Core systems for Horizon Grid.
//!
//! This crate provides the foundational components the grid model layer is
//! built on:
//!
//! - **Signal/Slot System**: Type-safe change notification
//! - **Async Runtime**: Tokio integration and cooperative cancellation
//! - **Logging**: `tracing` targets and performance spans
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_grid_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//!
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```

pub mod async_runtime;
mod error;
pub mod logging;
pub mod signal;

pub use async_runtime::{
    AsyncCancellationToken, AsyncRuntime, AsyncRuntimeConfig, AsyncRuntimeError, RuntimeType,
};
pub use error::{CoreError, Result, SignalError};
pub use logging::PerfSpan;
pub use signal::{ConnectionId, Signal};
