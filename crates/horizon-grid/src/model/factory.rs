//! Backing model selection.

use std::sync::Arc;

use super::formatter::Formatter;
use super::partitioned_model::PartitionedGridModel;
use super::table_model::TableGridModel;
use super::traits::ModelHandle;
use super::tree_model::TreeGridModel;
use crate::source::{InputTable, SourceHandle};

/// Builds a backing model for a source.
pub type ModelFactory =
    Arc<dyn Fn(SourceHandle, Arc<Formatter>, Option<Arc<dyn InputTable>>) -> ModelHandle + Send + Sync>;

/// Builds the backing model matching the source's shape.
///
/// Hierarchical sources get a [`TreeGridModel`], partitioned sources a
/// [`PartitionedGridModel`], flat tables a [`TableGridModel`]. The input
/// table is only used by flat tables.
pub fn make_model(
    source: SourceHandle,
    formatter: Arc<Formatter>,
    input_table: Option<Arc<dyn InputTable>>,
) -> ModelHandle {
    match source {
        SourceHandle::Tree(tree) => Arc::new(TreeGridModel::new(tree, formatter)),
        SourceHandle::Partitioned(partitioned) => {
            Arc::new(PartitionedGridModel::new(partitioned, formatter))
        }
        SourceHandle::Table(table) => Arc::new(TableGridModel::new(table, formatter, input_table)),
    }
}

/// The factory used when none is configured.
pub fn default_factory() -> ModelFactory {
    Arc::new(make_model)
}
