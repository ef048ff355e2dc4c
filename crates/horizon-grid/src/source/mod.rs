//! Data source contracts consumed by the backing models.
//!
//! A source is an opaque handle to tabular data. Its shape decides which
//! backing model the factory builds:
//!
//! - [`TableSource`]: a flat table, which can derive rollups, distinct value
//!   tables and filtered copies
//! - [`TreeSource`]: a hierarchical table with expansion state
//! - [`PartitionedSource`]: a table split into partitions by key columns
//!
//! [`InputTable`] is an optional write path associated with a flat table.
//! In-memory implementations live in [`memory`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RollupConfig;
use crate::error::Result;
use crate::model::{Column, Columns, FilterCondition, SortDescriptor, Value};

pub mod memory;

/// A flat table.
#[async_trait]
pub trait TableSource: Send + Sync + fmt::Debug {
    /// Display name of the table.
    fn name(&self) -> &str;

    /// Column definitions. Implementations return the same `Arc` until the
    /// column set changes.
    fn columns(&self) -> Columns;

    /// Number of rows.
    fn size(&self) -> usize;

    /// Value at `row`, `column`; `Null` when out of range.
    fn value(&self, row: usize, column: usize) -> Value;

    /// Columns the table is partitioned by.
    fn partition_columns(&self) -> Vec<Column> {
        self.columns()
            .iter()
            .filter(|c| c.is_partition_column)
            .cloned()
            .collect()
    }

    /// Whether [`rollup`](Self::rollup) is supported.
    fn is_rollup_available(&self) -> bool {
        true
    }

    /// Whether [`select_distinct`](Self::select_distinct) is supported.
    fn is_select_distinct_available(&self) -> bool {
        true
    }

    /// Derives a hierarchical rollup of this table.
    async fn rollup(&self, config: &RollupConfig) -> Result<SourceHandle>;

    /// Derives a table of the distinct value combinations of `columns`.
    async fn select_distinct(&self, columns: &[String]) -> Result<Arc<dyn TableSource>>;

    /// Derives a new table holding the rows matching every filter.
    ///
    /// An empty filter list yields an independent copy.
    async fn filtered(&self, filters: &[FilterCondition]) -> Result<Arc<dyn TableSource>>;

    /// Releases the table.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A hierarchical table. Row indexes address the currently visible rows.
pub trait TreeSource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn columns(&self) -> Columns;

    /// Number of visible rows.
    fn size(&self) -> usize;

    fn value(&self, row: usize, column: usize) -> Value;

    /// Nesting depth of a visible row; top level rows have depth 0.
    fn depth(&self, row: usize) -> usize;

    fn is_expandable(&self, row: usize) -> bool;

    fn is_expanded(&self, row: usize) -> bool;

    /// Expands or collapses a row, optionally applying the same state to all
    /// of its descendants.
    fn set_expanded(&self, row: usize, expanded: bool, descendants: bool);

    fn expand_all(&self);

    fn collapse_all(&self);

    /// Sorts the children of every node.
    fn set_sort(&self, sort: &[SortDescriptor]) -> Result<()>;

    /// Hides every row whose subtree has no matching row.
    fn set_filter(&self, filter: &[FilterCondition]) -> Result<()>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A table split into partitions by key columns.
#[async_trait]
pub trait PartitionedSource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Columns of each constituent partition.
    fn columns(&self) -> Columns;

    /// The partition key columns.
    fn key_columns(&self) -> Vec<Column>;

    /// Derives the table of distinct partition keys.
    async fn keys_table(&self) -> Result<Arc<dyn TableSource>>;

    /// Derives a table holding every partition.
    async fn merged_table(&self) -> Result<Arc<dyn TableSource>>;

    /// Derives the partition with the given key values.
    async fn table(&self, keys: &[Value]) -> Result<Arc<dyn TableSource>>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Write path for a keyed table.
#[async_trait]
pub trait InputTable: Send + Sync + fmt::Debug {
    /// Names of the key columns.
    fn key_columns(&self) -> Vec<String>;

    /// Inserts rows, replacing existing rows with the same key.
    async fn add_rows(&self, rows: Vec<Vec<Value>>) -> Result<()>;

    /// Deletes the rows with the given keys.
    async fn delete_rows(&self, keys: Vec<Vec<Value>>) -> Result<()>;
}

/// A raw data source of any shape.
#[derive(Debug, Clone)]
pub enum SourceHandle {
    Table(Arc<dyn TableSource>),
    Tree(Arc<dyn TreeSource>),
    Partitioned(Arc<dyn PartitionedSource>),
}

impl SourceHandle {
    /// Whether the source is hierarchical.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::Tree(_))
    }

    /// Whether the source is partitioned.
    pub fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Table(t) => t.name(),
            Self::Tree(t) => t.name(),
            Self::Partitioned(p) => p.name(),
        }
    }

    pub fn columns(&self) -> Columns {
        match self {
            Self::Table(t) => t.columns(),
            Self::Tree(t) => t.columns(),
            Self::Partitioned(p) => p.columns(),
        }
    }

    pub fn close(&self) {
        match self {
            Self::Table(t) => t.close(),
            Self::Tree(t) => t.close(),
            Self::Partitioned(p) => p.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Table(t) => t.is_closed(),
            Self::Tree(t) => t.is_closed(),
            Self::Partitioned(p) => p.is_closed(),
        }
    }
}

impl From<Arc<dyn TableSource>> for SourceHandle {
    fn from(table: Arc<dyn TableSource>) -> Self {
        Self::Table(table)
    }
}

impl From<Arc<dyn TreeSource>> for SourceHandle {
    fn from(tree: Arc<dyn TreeSource>) -> Self {
        Self::Tree(tree)
    }
}

impl From<Arc<dyn PartitionedSource>> for SourceHandle {
    fn from(partitioned: Arc<dyn PartitionedSource>) -> Self {
        Self::Partitioned(partitioned)
    }
}
