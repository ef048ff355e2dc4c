//! Async runtime integration for Horizon Grid.
//!
//! Grid models derive new data sources asynchronously. This module decides
//! which Tokio runtime those derivations run on, and provides the token used
//! to cancel them.
//!
//! A caller already inside a Tokio runtime keeps using it. Otherwise a
//! process-wide runtime is created on first use, or ahead of time through
//! [`AsyncRuntime::init_global`].
//!
//! ```no_run
//! use horizon_grid_core::async_runtime::AsyncRuntime;
//!
//! let handle = AsyncRuntime::current_or_global().unwrap();
//! handle.spawn(async { /* derive a data source */ });
//! ```
//!
//! [`RuntimeType::SingleThreaded`] runs a current-thread scheduler on its own
//! driver thread. Tasks then execute one at a time in spawn order, which is
//! the execution model grid models assume.

use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{oneshot, watch};

use crate::logging::targets;

static GLOBAL: OnceLock<AsyncRuntime> = OnceLock::new();

/// Scheduler used by an [`AsyncRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeType {
    /// Tokio's work-stealing scheduler.
    #[default]
    MultiThreaded,
    /// A current-thread scheduler on a dedicated driver thread.
    SingleThreaded,
}

/// How to build an [`AsyncRuntime`].
#[derive(Debug, Clone)]
pub struct AsyncRuntimeConfig {
    pub runtime_type: RuntimeType,
    /// Worker count for [`RuntimeType::MultiThreaded`]; `None` uses one per core.
    pub worker_threads: Option<usize>,
    /// Prefix for the names of every thread the runtime owns.
    pub thread_name: String,
}

impl Default for AsyncRuntimeConfig {
    fn default() -> Self {
        Self::multi_threaded()
    }
}

impl AsyncRuntimeConfig {
    pub fn multi_threaded() -> Self {
        Self::of(RuntimeType::MultiThreaded)
    }

    pub fn single_threaded() -> Self {
        Self::of(RuntimeType::SingleThreaded)
    }

    fn of(runtime_type: RuntimeType) -> Self {
        Self {
            runtime_type,
            worker_threads: None,
            thread_name: "horizon-grid".into(),
        }
    }

    /// Ignored by single-threaded runtimes.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Shared flag that cancelable work observes.
///
/// Clones observe the same flag. Work can poll
/// [`is_cancelled`](Self::is_cancelled) or await [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct AsyncCancellationToken {
    flag: Arc<watch::Sender<bool>>,
}

impl AsyncCancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(watch::Sender::new(false)),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Marks the token canceled. Returns `false` if it already was.
    pub fn cancel(&self) -> bool {
        !self.flag.send_replace(true)
    }

    /// Resolves once the token is canceled.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for AsyncCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread driving a single-threaded runtime until told to stop.
struct Driver {
    stop: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// An owned Tokio runtime plus the handle used to spawn onto it.
pub struct AsyncRuntime {
    handle: Handle,
    runtime_type: RuntimeType,
    // Multi-threaded runtimes are owned here; single-threaded ones by the driver.
    _runtime: Option<Runtime>,
    driver: Option<Driver>,
}

impl AsyncRuntime {
    /// The process-wide runtime, created with defaults on first use.
    pub fn try_global() -> Result<&'static AsyncRuntime, AsyncRuntimeError> {
        if let Some(runtime) = GLOBAL.get() {
            return Ok(runtime);
        }
        let created = AsyncRuntime::new(AsyncRuntimeConfig::default())?;
        // Losing a race here drops `created` and keeps the winner.
        let _ = GLOBAL.set(created);
        GLOBAL.get().ok_or(AsyncRuntimeError::NotInitialized)
    }

    /// Creates the process-wide runtime from `config`.
    ///
    /// Fails with [`AsyncRuntimeError::AlreadyInitialized`] once any global
    /// runtime exists, including one created lazily by [`try_global`](Self::try_global).
    pub fn init_global(
        config: AsyncRuntimeConfig,
    ) -> Result<&'static AsyncRuntime, AsyncRuntimeError> {
        if GLOBAL.set(AsyncRuntime::new(config)?).is_err() {
            return Err(AsyncRuntimeError::AlreadyInitialized);
        }
        tracing::debug!(target: targets::RUNTIME, "global runtime initialized");
        GLOBAL.get().ok_or(AsyncRuntimeError::NotInitialized)
    }

    /// The ambient runtime's handle when called from inside one, else the
    /// global runtime's.
    pub fn current_or_global() -> Result<Handle, AsyncRuntimeError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(handle);
        }
        tracing::debug!(target: targets::RUNTIME, "no ambient runtime, using global runtime");
        Ok(Self::try_global()?.handle.clone())
    }

    pub fn new(config: AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        match config.runtime_type {
            RuntimeType::MultiThreaded => Self::spawn_pool(&config),
            RuntimeType::SingleThreaded => Self::spawn_driver(&config),
        }
    }

    fn spawn_pool(config: &AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name(config.thread_name.as_str()).enable_time();
        if let Some(workers) = config.worker_threads {
            builder.worker_threads(workers);
        }
        let runtime = builder.build().map_err(AsyncRuntimeError::creation)?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime_type: RuntimeType::MultiThreaded,
            _runtime: Some(runtime),
            driver: None,
        })
    }

    fn spawn_driver(config: &AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop, stopped) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(format!("{}-driver", config.thread_name))
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(AsyncRuntimeError::creation(err)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                // Runs until `stop` fires or is dropped.
                let _ = runtime.block_on(stopped);
            })
            .map_err(AsyncRuntimeError::creation)?;

        let handle = ready_rx
            .recv()
            .map_err(|_| AsyncRuntimeError::CreationFailed("driver thread exited".into()))??;

        Ok(Self {
            handle,
            runtime_type: RuntimeType::SingleThreaded,
            _runtime: None,
            driver: Some(Driver { stop, thread }),
        })
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Stops the runtime, waiting for a single-threaded driver to exit.
    pub fn shutdown(mut self) {
        if let Some(Driver { stop, thread }) = self.driver.take() {
            let _ = stop.send(());
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for AsyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRuntime")
            .field("runtime_type", &self.runtime_type)
            .finish_non_exhaustive()
    }
}

/// Failures creating or reaching the async runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsyncRuntimeError {
    #[error("Async runtime already initialized")]
    AlreadyInitialized,
    /// The global runtime could not be read back after initialization.
    #[error("Async runtime is not initialized")]
    NotInitialized,
    #[error("Failed to create async runtime: {0}")]
    CreationFailed(String),
}

impl AsyncRuntimeError {
    fn creation(err: impl std::fmt::Display) -> Self {
        Self::CreationFailed(err.to_string())
    }
}
