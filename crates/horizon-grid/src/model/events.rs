//! Grid model event contract.
//!
//! Every grid model, the proxy included, publishes a single
//! [`GridModelEvent`] stream through [`GridEvents`]. Listeners either receive
//! every event or filter on a [`GridModelEventKind`].

use std::fmt;
use std::sync::Arc;

use horizon_grid_core::{ConnectionId, Signal};
use parking_lot::Mutex;

use super::value::Columns;
use crate::error::GridError;
use crate::source::TableSource;

/// An event published by a grid model.
#[derive(Debug, Clone)]
pub enum GridModelEvent {
    /// Cell data changed.
    Updated,
    /// The formatter was replaced.
    FormatterUpdated,
    /// The column set changed; carries the new columns.
    ColumnsChanged(Columns),
    /// The model now reads from a different table.
    TableChanged(Arc<dyn TableSource>),
    /// An asynchronous request failed.
    RequestFailed(Arc<GridError>),
    /// Pending (uncommitted) rows changed.
    PendingDataUpdated,
    /// Applied filters changed.
    FiltersChanged,
    /// Applied sorts changed.
    SortsChanged,
    /// The model accepted a new viewport.
    ViewportUpdated { top: usize, bottom: usize },
    /// The model lost its connection to the data source.
    Disconnect,
    /// The model reconnected to the data source.
    Reconnect,
}

impl GridModelEvent {
    /// The kind of this event.
    pub fn kind(&self) -> GridModelEventKind {
        match self {
            Self::Updated => GridModelEventKind::Updated,
            Self::FormatterUpdated => GridModelEventKind::FormatterUpdated,
            Self::ColumnsChanged(_) => GridModelEventKind::ColumnsChanged,
            Self::TableChanged(_) => GridModelEventKind::TableChanged,
            Self::RequestFailed(_) => GridModelEventKind::RequestFailed,
            Self::PendingDataUpdated => GridModelEventKind::PendingDataUpdated,
            Self::FiltersChanged => GridModelEventKind::FiltersChanged,
            Self::SortsChanged => GridModelEventKind::SortsChanged,
            Self::ViewportUpdated { .. } => GridModelEventKind::ViewportUpdated,
            Self::Disconnect => GridModelEventKind::Disconnect,
            Self::Reconnect => GridModelEventKind::Reconnect,
        }
    }
}

/// Discriminant of [`GridModelEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridModelEventKind {
    Updated,
    FormatterUpdated,
    ColumnsChanged,
    TableChanged,
    RequestFailed,
    PendingDataUpdated,
    FiltersChanged,
    SortsChanged,
    ViewportUpdated,
    Disconnect,
    Reconnect,
}

impl GridModelEventKind {
    /// Every event kind.
    pub const ALL: [GridModelEventKind; 11] = [
        Self::Updated,
        Self::FormatterUpdated,
        Self::ColumnsChanged,
        Self::TableChanged,
        Self::RequestFailed,
        Self::PendingDataUpdated,
        Self::FiltersChanged,
        Self::SortsChanged,
        Self::ViewportUpdated,
        Self::Disconnect,
        Self::Reconnect,
    ];
}

type ListenerHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Event dispatcher owned by each grid model.
///
/// Wraps a [`Signal`] and optionally reports listener count changes to a hook,
/// which lets a wrapping model subscribe to an inner model only while someone
/// is listening to it.
pub struct GridEvents {
    signal: Signal<GridModelEvent>,
    listener_hook: Mutex<Option<ListenerHook>>,
}

impl Default for GridEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GridEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridEvents")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl GridEvents {
    /// Creates an event dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            listener_hook: Mutex::new(None),
        }
    }

    /// Installs the hook called with the new listener count after every
    /// connect or disconnect.
    pub fn set_listener_hook<F>(&self, hook: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        *self.listener_hook.lock() = Some(Arc::new(hook));
    }

    /// Removes the listener hook.
    pub fn clear_listener_hook(&self) {
        self.listener_hook.lock().take();
    }

    /// Connects a listener to every event.
    pub fn connect<F>(&self, listener: F) -> ConnectionId
    where
        F: Fn(&GridModelEvent) + Send + Sync + 'static,
    {
        let id = self.signal.connect(listener);
        self.notify_hook();
        id
    }

    /// Connects a listener to events of one kind.
    pub fn connect_kind<F>(&self, kind: GridModelEventKind, listener: F) -> ConnectionId
    where
        F: Fn(&GridModelEvent) + Send + Sync + 'static,
    {
        self.connect(move |event| {
            if event.kind() == kind {
                listener(event);
            }
        })
    }

    /// Disconnects a listener. Returns `false` if the id was unknown.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.signal.disconnect(id);
        if removed {
            self.notify_hook();
        }
        removed
    }

    /// Disconnects every listener.
    pub fn disconnect_all(&self) {
        if self.signal.connection_count() > 0 {
            self.signal.disconnect_all();
            self.notify_hook();
        }
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.signal.connection_count()
    }

    /// Dispatches an event to every listener.
    pub fn emit(&self, event: GridModelEvent) {
        self.signal.emit(event);
    }

    fn notify_hook(&self) {
        let hook = self.listener_hook.lock().clone();
        if let Some(hook) = hook {
            hook(self.signal.connection_count());
        }
    }
}
