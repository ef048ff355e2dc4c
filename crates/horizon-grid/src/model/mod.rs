//! Grid models.
//!
//! A grid model exposes a rectangular, formatted view of a data source to a
//! grid view. Three backing models cover the three source shapes, and
//! [`GridModelProxy`] wraps one of them behind a stable handle while rollup,
//! partition and select-distinct transformations swap it out.
//!
//! # Core Types
//!
//! - `GridModel`: Rows, columns, cell values, sorting, filtering, events
//! - `GridModelEvent`: Change notifications dispatched through `GridEvents`
//! - Capability traits: `ExpandableGridModel`, `EditableGridModel`,
//!   `DeletableGridModel`, `PartitionedGridModelProvider`,
//!   `TableBackedGridModel`
//!
//! # Model Implementations
//!
//! - `TableGridModel`: Flat table, optionally editable through an input table
//! - `TreeGridModel`: Hierarchical table with expandable rows
//! - `PartitionedGridModel`: Partitioned table awaiting a partition choice
//! - `GridModelProxy`: Swappable wrapper over any of the above
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────┐  transition  ┌──────────────┐     ┌─────────────┐
//! │ GridModel-   │─────────────>│ ModelFactory │────>│ active      │
//! │ Proxy        │              └──────────────┘     │ GridModel   │
//! │              │<──────────── event relay ─────────│             │
//! └──────────────┘                                   └─────────────┘
//! ```
//!
//! Capabilities are discovered with the `as_*` accessors on [`GridModel`] or
//! the predicates in this module:
//!
//! ```no_run
//! use horizon_grid::model::{GridModel, is_expandable_grid_model};
//!
//! fn expand_first(model: &dyn GridModel) -> horizon_grid::Result<()> {
//!     if is_expandable_grid_model(Some(model)) {
//!         if let Some(tree) = model.as_expandable() {
//!             tree.set_row_expanded(0, true, false)?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod capability;
mod custom_column;
mod events;
mod factory;
mod formatter;
mod mapping;
mod partitioned_model;
mod proxy_model;
mod table_model;
mod traits;
pub mod transition;
mod tree_model;
mod value;

pub use capability::{
    is_deletable_grid_model, is_editable_grid_model, is_expandable_grid_model,
    is_partitioned_grid_model_provider, is_table_backed_grid_model,
};
pub use events::{GridEvents, GridModelEvent, GridModelEventKind};
pub use factory::{ModelFactory, default_factory, make_model};
pub use formatter::Formatter;
pub use partitioned_model::PartitionedGridModel;
pub use proxy_model::{GridModelProxy, GridModelProxyBuilder};
pub use table_model::TableGridModel;
pub use traits::{
    DeletableGridModel, EditableGridModel, ExpandableGridModel, GridModel, ModelHandle,
    PartitionedGridModelProvider, TableBackedGridModel,
};
pub use transition::CancelableTransition;
pub use tree_model::TreeGridModel;
pub use value::{
    CellAlignment, CellColor, CellEdit, Column, ColumnStatistics, ColumnType, Columns,
    ExportOptions, FilterCondition, FilterOperator, GridRange, SortDescriptor, SortDirection,
    Value, Viewport, column_index, compare_values, sum_values,
};
