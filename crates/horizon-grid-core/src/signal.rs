//! Multi-listener notification channel.
//!
//! Grid models publish their change events through a [`Signal`]. Listeners
//! are plain closures keyed by a [`ConnectionId`]; a listener is removed by
//! handing its id back to [`Signal::disconnect`].
//!
//! Listeners are invoked after the listener table lock has been released, so
//! a listener may connect or disconnect listeners on the signal that is
//! invoking it. Listeners added during an emission are not invoked by that
//! emission.
//!
//! ```
//! use horizon_grid_core::Signal;
//!
//! let size_changed = Signal::<usize>::new();
//! let id = size_changed.connect(|rows| println!("{rows} rows"));
//! size_changed.emit(12);
//! assert!(size_changed.disconnect(id));
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::SignalError;
use crate::logging::targets;

new_key_type! {
    /// Identifies one listener on one [`Signal`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// An event source with any number of listeners.
///
/// `Args` is the payload handed to every listener by reference. Listeners run
/// on the emitting thread, in no particular order.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Adds a listener and returns the id that removes it again.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Removes a listener. Returns `false` if `id` was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Like [`disconnect`](Self::disconnect), but an unknown id is an error.
    pub fn try_disconnect(&self, id: ConnectionId) -> Result<(), SignalError> {
        if self.disconnect(id) {
            Ok(())
        } else {
            Err(SignalError::InvalidConnection)
        }
    }

    /// Removes every listener.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Number of listeners currently connected.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Invokes every listener with `args`.
    ///
    /// The listener set is captured before the first listener runs.
    pub fn emit(&self, args: Args) {
        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        if slots.is_empty() {
            return;
        }
        tracing::trace!(target: targets::SIGNAL, listeners = slots.len(), "emit");
        for slot in slots {
            slot(&args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(signal: &Signal<i32>) -> (ConnectionId, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = signal.connect(move |&value| sink.lock().push(value));
        (id, seen)
    }

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::new();
        let (_, first) = recorder(&signal);
        let (_, second) = recorder(&signal);

        signal.emit(7);
        signal.emit(8);

        assert_eq!(*first.lock(), vec![7, 8]);
        assert_eq!(*second.lock(), vec![7, 8]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::new();
        let (id, seen) = recorder(&signal);

        signal.emit(1);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert_eq!(signal.try_disconnect(id), Err(SignalError::InvalidConnection));
        signal.emit(2);

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_signal_slot_disconnects_itself() {
        let signal = Arc::new(Signal::<()>::new());
        let own_id: Arc<Mutex<Option<ConnectionId>>> = Arc::default();
        let calls = Arc::new(Mutex::new(0));

        let weak = Arc::downgrade(&signal);
        let id_cell = own_id.clone();
        let counter = calls.clone();
        let id = signal.connect(move |_| {
            *counter.lock() += 1;
            if let (Some(signal), Some(id)) = (weak.upgrade(), *id_cell.lock()) {
                signal.disconnect(id);
            }
        });
        *own_id.lock() = Some(id);

        signal.emit(());
        signal.emit(());

        assert_eq!(*calls.lock(), 1);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_signal_connect_during_emit() {
        let signal = Arc::new(Signal::<i32>::new());
        let late = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&signal);
        let sink = late.clone();
        signal.connect(move |&value| {
            if value == 1 {
                if let Some(signal) = weak.upgrade() {
                    let sink = sink.clone();
                    signal.connect(move |&value| sink.lock().push(value));
                }
            }
        });

        signal.emit(1);
        signal.emit(2);

        assert_eq!(*late.lock(), vec![2]);
    }

    #[test]
    fn test_signal_disconnect_all() {
        let signal = Signal::new();
        for _ in 0..3 {
            recorder(&signal);
        }
        assert_eq!(signal.connection_count(), 3);

        signal.disconnect_all();
        assert_eq!(signal.connection_count(), 0);
    }
}
