//! Horizon Grid - swappable grid models for tabular data.
//!
//! A grid view talks to one [`GridModel`](model::GridModel). Behind it, a
//! [`GridModelProxy`](model::GridModelProxy) keeps a backing model that fits
//! the current shape of the data: a flat table, a rolled-up tree, or a
//! partition of a partitioned table. Changing the rollup, partition or
//! select-distinct configuration builds a new backing model asynchronously
//! and swaps it in, reconciling the viewport and event listeners.
//!
//! # Example
//!
//! ```no_run
//! use horizon_grid::config::RollupConfig;
//! use horizon_grid::model::{Column, ColumnType, GridModel, GridModelEvent, GridModelProxy};
//! use horizon_grid::source::memory::MemoryTable;
//!
//! #[tokio::main]
//! async fn main() -> horizon_grid::Result<()> {
//!     let table = MemoryTable::new(
//!         "trades",
//!         vec![
//!             Column::new("Sym", ColumnType::String),
//!             Column::new("Qty", ColumnType::Int),
//!         ],
//!         vec![vec!["AAPL".into(), 100i64.into()]],
//!     )?;
//!
//!     let proxy = GridModelProxy::new(table.into_handle())?;
//!     proxy.events().connect(|event| {
//!         if let GridModelEvent::ColumnsChanged(columns) = event {
//!             println!("now showing {} columns", columns.len());
//!         }
//!     });
//!     proxy.set_rollup_config(Some(RollupConfig::group_by(["Sym"])))?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`model`]: grid model traits, backing models and the proxy
//! - [`source`]: data source contracts and in-memory sources
//! - [`config`]: transformation configuration and persisted settings

pub mod config;
mod error;
pub mod model;
pub mod source;

pub use error::{GridError, Result};
pub use model::{GridModel, GridModelProxy, GridModelProxyBuilder};

/// Logging targets and runtime helpers shared with the core crate.
pub use horizon_grid_core::{AsyncRuntime, logging};
