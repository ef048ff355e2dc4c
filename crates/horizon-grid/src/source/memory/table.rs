//! In-memory flat table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use horizon_grid_core::logging::targets;
use parking_lot::RwLock;

use super::tree::MemoryTreeTable;
use crate::config::RollupConfig;
use crate::error::{GridError, Result};
use crate::model::{Column, Columns, FilterCondition, Value, column_index};
use crate::source::{SourceHandle, TableSource};

/// A flat table held in memory.
///
/// Derived tables (distinct values, filtered copies, rollups) are new
/// independent sources; closing one never affects this table.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    columns: Columns,
    rows: RwLock<Vec<Vec<Value>>>,
    closed: AtomicBool,
}

impl MemoryTable {
    /// Creates a table, checking every row has one value per column.
    pub fn new(
        name: impl Into<String>,
        columns: impl Into<Columns>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let columns = columns.into();
        check_widths(&columns, &rows)?;
        Ok(Self {
            name: name.into(),
            columns,
            rows: RwLock::new(rows),
            closed: AtomicBool::new(false),
        })
    }

    /// Wraps the table in a [`SourceHandle`].
    pub fn into_handle(self) -> SourceHandle {
        SourceHandle::Table(Arc::new(self))
    }

    /// Copy of every row.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.rows.read().clone()
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        column_index(&self.columns, name).ok_or_else(|| GridError::InvalidColumn(name.to_string()))
    }

    /// Inserts rows, replacing rows whose key columns match.
    pub fn upsert(&self, key_indexes: &[usize], new_rows: Vec<Vec<Value>>) -> Result<()> {
        self.check_open()?;
        check_widths(&self.columns, &new_rows)?;
        let mut rows = self.rows.write();
        for row in new_rows {
            let existing = rows
                .iter()
                .position(|r| key_indexes.iter().all(|&k| r[k] == row[k]));
            match existing {
                Some(index) => rows[index] = row,
                None => rows.push(row),
            }
        }
        Ok(())
    }

    /// Deletes rows by key; returns how many rows were removed.
    pub fn delete_keys(&self, key_indexes: &[usize], keys: &[Vec<Value>]) -> Result<usize> {
        self.check_open()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| {
            !keys.iter().any(|key| {
                key.len() == key_indexes.len()
                    && key_indexes.iter().zip(key).all(|(&k, v)| &row[k] == v)
            })
        });
        Ok(before - rows.len())
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(GridError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<usize>> {
        names.iter().map(|name| self.column_index(name)).collect()
    }
}

fn check_widths(columns: &[Column], rows: &[Vec<Value>]) -> Result<()> {
    match rows.iter().position(|row| row.len() != columns.len()) {
        Some(index) => Err(GridError::source_failed(format!(
            "row {index} has {} values, expected {}",
            rows[index].len(),
            columns.len()
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl TableSource for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Columns {
        self.columns.clone()
    }

    fn size(&self) -> usize {
        self.rows.read().len()
    }

    fn value(&self, row: usize, column: usize) -> Value {
        self.rows
            .read()
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default()
    }

    async fn rollup(&self, config: &RollupConfig) -> Result<SourceHandle> {
        self.check_open()?;
        let tree = MemoryTreeTable::rollup(
            format!("{} (rollup)", self.name),
            &self.columns,
            &self.rows.read(),
            config,
        )?;
        tracing::debug!(
            target: targets::SOURCE,
            table = %self.name,
            group_by = ?config.group_by,
            "rolled up table"
        );
        Ok(SourceHandle::Tree(Arc::new(tree)))
    }

    async fn select_distinct(&self, columns: &[String]) -> Result<Arc<dyn TableSource>> {
        self.check_open()?;
        if columns.is_empty() {
            return Err(GridError::source_failed("select distinct requires at least one column"));
        }
        let indexes = self.resolve(columns)?;
        let mut distinct: Vec<Vec<Value>> = Vec::new();
        for row in self.rows.read().iter() {
            let key: Vec<Value> = indexes.iter().map(|&i| row[i].clone()).collect();
            if !distinct.contains(&key) {
                distinct.push(key);
            }
        }
        let out_columns: Vec<Column> = indexes.iter().map(|&i| self.columns[i].clone()).collect();
        let table = MemoryTable::new(format!("{} (distinct)", self.name), out_columns, distinct)?;
        Ok(Arc::new(table))
    }

    async fn filtered(&self, filters: &[FilterCondition]) -> Result<Arc<dyn TableSource>> {
        self.check_open()?;
        let resolved: Vec<(usize, &FilterCondition)> = filters
            .iter()
            .map(|f| Ok((self.column_index(&f.column)?, f)))
            .collect::<Result<_>>()?;
        let rows: Vec<Vec<Value>> = self
            .rows
            .read()
            .iter()
            .filter(|row| resolved.iter().all(|(i, f)| f.matches(&row[*i])))
            .cloned()
            .collect();
        let table = MemoryTable::new(self.name.clone(), self.columns.clone(), rows)?;
        Ok(Arc::new(table))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(target: targets::SOURCE, table = %self.name, "closed table");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
