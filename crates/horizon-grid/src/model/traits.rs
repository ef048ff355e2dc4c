//! The grid model contract.
//!
//! [`GridModel`] is the base contract every model implements. Optional
//! capabilities are separate traits; a model advertises one by returning
//! `Some(self)` from the matching `as_*` accessor.

use std::sync::Arc;

use async_trait::async_trait;

use super::events::GridEvents;
use super::formatter::Formatter;
use super::value::{
    CellAlignment, CellColor, CellEdit, Column, ColumnStatistics, ColumnType, Columns, ExportOptions,
    FilterCondition, GridRange, SortDescriptor, Value,
};
use crate::error::Result;
use crate::source::{SourceHandle, TableSource};

/// Shared handle to a grid model.
pub type ModelHandle = Arc<dyn GridModel>;

/// The base grid model contract.
///
/// Cell accessors take `(column, row)` and return neutral values for
/// out-of-range cells.
#[async_trait]
pub trait GridModel: Send + Sync {
    /// Short type name used in diagnostics.
    fn type_name(&self) -> &'static str;

    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// The current columns. The same `Arc` is returned until the column set changes.
    fn columns(&self) -> Columns;

    fn formatter(&self) -> Arc<Formatter>;

    fn set_formatter(&self, formatter: Arc<Formatter>);

    fn value_for_cell(&self, column: usize, row: usize) -> Value;

    fn text_for_cell(&self, column: usize, row: usize) -> String {
        let columns = self.columns();
        match columns.get(column) {
            Some(c) => self.display_string(&self.value_for_cell(column, row), c.column_type),
            None => String::new(),
        }
    }

    fn color_for_cell(&self, column: usize, row: usize) -> CellColor {
        CellColor::for_value(&self.value_for_cell(column, row))
    }

    fn text_align_for_cell(&self, column: usize, _row: usize) -> CellAlignment {
        self.columns()
            .get(column)
            .map(|c| CellAlignment::for_type(c.column_type))
            .unwrap_or_default()
    }

    /// Formats a value with this model's formatter.
    fn display_string(&self, value: &Value, column_type: ColumnType) -> String {
        self.formatter().format(value, column_type)
    }

    fn sort(&self) -> Vec<SortDescriptor>;

    fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()>;

    fn filter(&self) -> Vec<FilterCondition>;

    fn set_filter(&self, filter: Vec<FilterCondition>) -> Result<()>;

    fn custom_columns(&self) -> Vec<String>;

    fn set_custom_columns(&self, custom_columns: Vec<String>) -> Result<()>;

    /// Requests the rows `top..=bottom` (and optionally a column subset).
    fn set_viewport(&self, top: usize, bottom: usize, columns: Option<Columns>);

    /// Values of every cell in `ranges`, one inner vector per row.
    async fn snapshot(&self, ranges: &[GridRange]) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        for range in ranges {
            for row in range.rows() {
                rows.push(
                    range
                        .columns()
                        .map(|column| self.value_for_cell(column, row))
                        .collect(),
                );
            }
        }
        Ok(rows)
    }

    /// Tab-separated text of every cell in `ranges`, one line per row.
    async fn text_snapshot(&self, ranges: &[GridRange], include_headers: bool) -> Result<String> {
        let columns = self.columns();
        let mut lines = Vec::new();
        for range in ranges {
            if include_headers {
                let header: Vec<&str> = range
                    .columns()
                    .map(|c| columns.get(c).map_or("", |c| c.name.as_str()))
                    .collect();
                lines.push(header.join("\t"));
            }
            for row in range.rows() {
                let cells: Vec<String> = range
                    .columns()
                    .map(|column| self.text_for_cell(column, row))
                    .collect();
                lines.push(cells.join("\t"));
            }
        }
        Ok(lines.join("\n"))
    }

    fn is_filter_required(&self) -> bool {
        false
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn is_rollup_available(&self) -> bool {
        false
    }

    fn is_select_distinct_available(&self) -> bool {
        false
    }

    fn events(&self) -> &GridEvents;

    /// Releases the model and the source it owns. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn as_expandable(&self) -> Option<&dyn ExpandableGridModel> {
        None
    }

    fn as_editable(&self) -> Option<&dyn EditableGridModel> {
        None
    }

    fn as_deletable(&self) -> Option<&dyn DeletableGridModel> {
        None
    }

    fn as_partition_provider(&self) -> Option<&dyn PartitionedGridModelProvider> {
        None
    }

    fn as_table_backed(&self) -> Option<&dyn TableBackedGridModel> {
        None
    }
}

/// Hierarchical expand/collapse.
pub trait ExpandableGridModel: Send + Sync {
    fn is_row_expandable(&self, row: usize) -> bool;

    fn is_row_expanded(&self, row: usize) -> bool;

    fn set_row_expanded(&self, row: usize, expanded: bool, expand_descendants: bool) -> Result<()>;

    fn is_expand_all_available(&self) -> bool;

    fn expand_all(&self) -> Result<()>;

    fn collapse_all(&self) -> Result<()>;

    fn depth_for_row(&self, row: usize) -> usize;
}

/// Cell editing with staged new rows.
#[async_trait]
pub trait EditableGridModel: Send + Sync {
    fn is_editable(&self) -> bool;

    /// Whether every cell in `range` may be edited.
    fn is_editable_range(&self, range: &GridRange) -> bool;

    /// Whether `text` parses as a value for the column.
    fn is_valid_for_cell(&self, column: usize, row: usize, text: &str) -> bool;

    /// Text shown in the cell editor.
    fn edit_value_for_cell(&self, column: usize, row: usize) -> String;

    async fn set_value_for_cell(&self, column: usize, row: usize, text: &str) -> Result<()>;

    /// Writes `text` to every cell of every range.
    async fn set_value_for_ranges(&self, ranges: &[GridRange], text: &str) -> Result<()>;

    async fn set_values(&self, edits: Vec<CellEdit>) -> Result<()>;

    /// Commits staged new rows.
    async fn commit_pending(&self) -> Result<()>;

    fn pending_row_count(&self) -> usize;
}

/// Row deletion.
#[async_trait]
pub trait DeletableGridModel: Send + Sync {
    fn is_deletable_ranges(&self, ranges: &[GridRange]) -> bool;

    /// Deletes every row touched by `ranges`.
    async fn delete(&self, ranges: &[GridRange]) -> Result<()>;
}

/// Access to partitioned views of the model's data.
#[async_trait]
pub trait PartitionedGridModelProvider: Send + Sync {
    /// Whether a partition must be chosen before data is shown.
    fn is_partition_required(&self) -> bool;

    fn partition_columns(&self) -> Vec<Column>;

    async fn partition_keys_table(&self) -> Result<SourceHandle>;

    async fn partition_merged_table(&self) -> Result<SourceHandle>;

    async fn partition_table(&self, keys: &[Value]) -> Result<SourceHandle>;
}

/// A model that reads from one flat table.
#[async_trait]
pub trait TableBackedGridModel: Send + Sync {
    /// The table currently read from; `None` only while a wrapping model has
    /// no flat table to offer.
    fn table(&self) -> Option<Arc<dyn TableSource>>;

    fn is_export_available(&self) -> bool;

    /// Exports the model's rows as CSV.
    async fn export(&self, options: &ExportOptions) -> Result<String>;

    async fn column_statistics(&self, column: usize) -> Result<ColumnStatistics>;

    /// Distinct values of `columns` over the rows the model currently shows.
    async fn values_table(&self, columns: &[String]) -> Result<Arc<dyn TableSource>>;
}
