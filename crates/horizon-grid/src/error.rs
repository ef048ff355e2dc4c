//! Error types for grid models.

use std::path::PathBuf;

use horizon_grid_core::AsyncRuntimeError;

/// Result type alias for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors that can occur in the grid model layer.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// An optional-capability operation was invoked on a model lacking it.
    #[error("Function {operation} does not exist on {model}")]
    CapabilityUnavailable {
        operation: &'static str,
        model: &'static str,
    },

    /// An edit was requested on a model that is not editable.
    #[error("Model is not editable")]
    NotEditable,

    /// A delete was requested on ranges that cannot be deleted.
    #[error("Model does not support deleting the requested ranges")]
    NotDeletable,

    /// A transformation was configured while it is not available.
    #[error("{0}")]
    ConfigurationRejected(&'static str),

    /// The operation is meaningless for the current model shape.
    #[error("TreeTable has no '{operation}' property")]
    UnsupportedShape { operation: &'static str },

    /// An in-flight model build was superseded.
    #[error("Transition was canceled")]
    TransitionCanceled,

    /// The build behind a transition panicked.
    #[error("Transition failed: {0}")]
    TransitionPanicked(String),

    /// A data source operation failed.
    #[error("Data source error: {0}")]
    Source(String),

    /// The model or source has been closed.
    #[error("'{0}' has been closed")]
    Closed(String),

    /// A column name or index did not resolve.
    #[error("Invalid column '{0}'")]
    InvalidColumn(String),

    /// A value could not be parsed for its column.
    #[error("Invalid value '{value}' for column '{column}'")]
    InvalidValue { column: String, value: String },

    /// The async runtime could not be obtained.
    #[error("Async runtime error: {0}")]
    Runtime(#[from] AsyncRuntimeError),

    /// TOML settings could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML settings could not be written.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON settings could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Settings file I/O error.
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GridError {
    /// Create a capability error for `operation` on the model type `model`.
    pub fn capability(operation: &'static str, model: &'static str) -> Self {
        Self::CapabilityUnavailable { operation, model }
    }

    /// Create a data source error.
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error only records that a transition was superseded.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::TransitionCanceled)
    }
}
