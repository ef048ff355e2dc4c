//! Cancelable, disposing wrapper around one asynchronous build.
//!
//! The wrapped future always runs to completion; cancellation only decides
//! what happens to its output. A value produced after cancellation is handed
//! to the disposal callback instead of the settle callback, and the settle
//! callback sees [`GridError::TransitionCanceled`]. Each outcome is delivered
//! exactly once, including when the build panics.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use horizon_grid_core::AsyncCancellationToken;
use horizon_grid_core::logging::targets;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::error::{GridError, Result};

type Disposer<T> = Box<dyn FnOnce(T) + Send>;

struct Shared<T> {
    token: AsyncCancellationToken,
    /// Set once the outcome has been handed to the settle callback.
    settled: Mutex<bool>,
    dispose: Mutex<Option<Disposer<T>>>,
}

/// Handle to one in-flight build.
pub struct CancelableTransition<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> CancelableTransition<T> {
    /// Spawns `future` on `handle`.
    ///
    /// `on_settled` receives the result, or `Err(TransitionCanceled)` if
    /// [`cancel`](Self::cancel) ran first; in that case a successful value
    /// goes to `dispose`.
    pub fn spawn<F, D, S>(handle: &Handle, future: F, dispose: D, on_settled: S) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
        D: FnOnce(T) + Send + 'static,
        S: FnOnce(Result<T>) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            token: AsyncCancellationToken::new(),
            settled: Mutex::new(false),
            dispose: Mutex::new(Some(Box::new(dispose) as Disposer<T>)),
        });
        let task_shared = shared.clone();
        handle.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(target: targets::TRANSITION, %message, "transition build panicked");
                    Err(GridError::TransitionPanicked(message))
                }
            };
            let canceled = {
                let mut settled = task_shared.settled.lock();
                *settled = true;
                task_shared.token.is_cancelled()
            };
            if !canceled {
                task_shared.dispose.lock().take();
                on_settled(result);
                return;
            }
            if let Ok(value) = result {
                let dispose = task_shared.dispose.lock().take();
                if let Some(dispose) = dispose {
                    tracing::debug!(target: targets::TRANSITION, "disposing canceled transition result");
                    dispose(value);
                }
            }
            on_settled(Err(GridError::TransitionCanceled));
        });
        Self { shared }
    }

    /// Cancels the transition. Idempotent.
    ///
    /// Returns `true` if this call canceled it, `false` if it was already
    /// canceled or had already settled.
    pub fn cancel(&self) -> bool {
        let settled = self.shared.settled.lock();
        if *settled {
            return false;
        }
        self.shared.token.cancel()
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Whether the wrapped future has completed.
    pub fn is_settled(&self) -> bool {
        *self.shared.settled.lock()
    }

    /// Token that is cancelled together with this transition.
    pub fn cancellation_token(&self) -> &AsyncCancellationToken {
        &self.shared.token
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "build panicked".to_string()
    }
}

impl<T> std::fmt::Debug for CancelableTransition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelableTransition")
            .field("canceled", &self.shared.token.is_cancelled())
            .field("settled", &*self.shared.settled.lock())
            .finish()
    }
}
