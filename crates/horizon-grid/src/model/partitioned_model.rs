//! Grid model over a partitioned table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use horizon_grid_core::logging::targets;
use parking_lot::RwLock;

use super::events::{GridEvents, GridModelEvent};
use super::formatter::Formatter;
use super::traits::{GridModel, PartitionedGridModelProvider};
use super::value::{Column, Columns, FilterCondition, SortDescriptor, Value};
use crate::error::{GridError, Result};
use crate::source::{PartitionedSource, SourceHandle};

/// Placeholder model for a partitioned table.
///
/// Shows no rows until a partition is chosen; its purpose is to hand out the
/// partition derivations a wrapping proxy switches to.
pub struct PartitionedGridModel {
    source: Arc<dyn PartitionedSource>,
    formatter: RwLock<Arc<Formatter>>,
    events: GridEvents,
    closed: AtomicBool,
}

impl PartitionedGridModel {
    pub fn new(source: Arc<dyn PartitionedSource>, formatter: Arc<Formatter>) -> Self {
        Self {
            source,
            formatter: RwLock::new(formatter),
            events: GridEvents::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The partitioned source this model reads from.
    pub fn source(&self) -> &Arc<dyn PartitionedSource> {
        &self.source
    }

    fn no_rows(operation: &'static str) -> GridError {
        GridError::capability(operation, "PartitionedGridModel")
    }
}

#[async_trait]
impl GridModel for PartitionedGridModel {
    fn type_name(&self) -> &'static str {
        "PartitionedGridModel"
    }

    fn row_count(&self) -> usize {
        0
    }

    fn columns(&self) -> Columns {
        self.source.columns()
    }

    fn formatter(&self) -> Arc<Formatter> {
        self.formatter.read().clone()
    }

    fn set_formatter(&self, formatter: Arc<Formatter>) {
        *self.formatter.write() = formatter;
        self.events.emit(GridModelEvent::FormatterUpdated);
    }

    fn value_for_cell(&self, _column: usize, _row: usize) -> Value {
        Value::Null
    }

    fn sort(&self) -> Vec<SortDescriptor> {
        Vec::new()
    }

    fn set_sort(&self, _sort: Vec<SortDescriptor>) -> Result<()> {
        Err(Self::no_rows("set_sort"))
    }

    fn filter(&self) -> Vec<FilterCondition> {
        Vec::new()
    }

    fn set_filter(&self, _filter: Vec<FilterCondition>) -> Result<()> {
        Err(Self::no_rows("set_filter"))
    }

    fn custom_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_custom_columns(&self, _custom_columns: Vec<String>) -> Result<()> {
        Err(Self::no_rows("set_custom_columns"))
    }

    fn set_viewport(&self, top: usize, bottom: usize, _columns: Option<Columns>) {
        self.events.emit(GridModelEvent::ViewportUpdated { top, bottom });
    }

    fn is_filter_required(&self) -> bool {
        true
    }

    fn events(&self) -> &GridEvents {
        &self.events
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.source.close();
            tracing::trace!(target: targets::MODEL, source = %self.source.name(), "closed partitioned model");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn as_partition_provider(&self) -> Option<&dyn PartitionedGridModelProvider> {
        Some(self)
    }
}

#[async_trait]
impl PartitionedGridModelProvider for PartitionedGridModel {
    fn is_partition_required(&self) -> bool {
        true
    }

    fn partition_columns(&self) -> Vec<Column> {
        self.source.key_columns()
    }

    async fn partition_keys_table(&self) -> Result<SourceHandle> {
        Ok(SourceHandle::Table(self.source.keys_table().await?))
    }

    async fn partition_merged_table(&self) -> Result<SourceHandle> {
        Ok(SourceHandle::Table(self.source.merged_table().await?))
    }

    async fn partition_table(&self, keys: &[Value]) -> Result<SourceHandle> {
        Ok(SourceHandle::Table(self.source.table(keys).await?))
    }
}
