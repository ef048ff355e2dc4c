use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use horizon_grid_core::logging::targets;

use super::table::MemoryTable;
use crate::error::{GridError, Result};
use crate::model::{Column, Columns, FilterCondition, Value};
use crate::source::{PartitionedSource, TableSource};

/// A [`MemoryTable`] viewed as partitions keyed by some of its columns.
#[derive(Debug)]
pub struct MemoryPartitionedTable {
    name: String,
    base: MemoryTable,
    key_columns: Vec<String>,
    closed: AtomicBool,
}

impl MemoryPartitionedTable {
    /// Partitions `base` by `key_columns`.
    pub fn new<I, S>(name: impl Into<String>, base: MemoryTable, key_columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_columns: Vec<String> = key_columns.into_iter().map(Into::into).collect();
        if key_columns.is_empty() {
            return Err(GridError::source_failed("a partitioned table needs key columns"));
        }
        for key in &key_columns {
            base.column_index(key)?;
        }
        Ok(Self {
            name: name.into(),
            base,
            key_columns,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(GridError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PartitionedSource for MemoryPartitionedTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Columns {
        self.base.columns()
    }

    fn key_columns(&self) -> Vec<Column> {
        let columns = self.base.columns();
        self.key_columns
            .iter()
            .filter_map(|key| columns.iter().find(|c| &c.name == key).cloned())
            .collect()
    }

    async fn keys_table(&self) -> Result<Arc<dyn TableSource>> {
        self.check_open()?;
        self.base.select_distinct(&self.key_columns).await
    }

    async fn merged_table(&self) -> Result<Arc<dyn TableSource>> {
        self.check_open()?;
        self.base.filtered(&[]).await
    }

    async fn table(&self, keys: &[Value]) -> Result<Arc<dyn TableSource>> {
        self.check_open()?;
        if keys.len() != self.key_columns.len() {
            return Err(GridError::source_failed(format!(
                "expected {} partition key values, got {}",
                self.key_columns.len(),
                keys.len()
            )));
        }
        let filters: Vec<FilterCondition> = self
            .key_columns
            .iter()
            .zip(keys)
            .map(|(column, key)| FilterCondition::eq(column.clone(), key.clone()))
            .collect();
        self.base.filtered(&filters).await
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.base.close();
            tracing::trace!(target: targets::SOURCE, table = %self.name, "closed partitioned table");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
