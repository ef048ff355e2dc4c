//! Grid model over a flat table.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use horizon_grid_core::logging::targets;
use parking_lot::{Mutex, RwLock};

use super::custom_column::CustomColumn;
use super::events::{GridEvents, GridModelEvent};
use super::formatter::Formatter;
use super::mapping::RowMapping;
use super::traits::{
    DeletableGridModel, EditableGridModel, GridModel, PartitionedGridModelProvider,
    TableBackedGridModel,
};
use super::value::{
    CellEdit, Column, ColumnStatistics, Columns, ExportOptions, FilterCondition, GridRange,
    SortDescriptor, SortDirection, Value, Viewport, column_index, compare_values, sum_values,
};
use crate::error::{GridError, Result};
use crate::source::{InputTable, SourceHandle, TableSource};

#[derive(Debug)]
struct TableView {
    sort: Vec<SortDescriptor>,
    filter: Vec<FilterCondition>,
    custom_columns: Vec<String>,
    custom: Vec<CustomColumn>,
    columns: Columns,
    mapping: RowMapping,
    viewport: Option<Viewport>,
}

/// Grid model over a [`TableSource`].
///
/// Sorting, filtering and custom columns are applied through a row mapping
/// over the source rows. With an [`InputTable`] the model is also editable
/// and deletable: edits to existing rows are written through immediately,
/// edits past the last row are staged as pending rows until
/// [`commit_pending`](EditableGridModel::commit_pending).
pub struct TableGridModel {
    table: Arc<dyn TableSource>,
    input_table: Option<Arc<dyn InputTable>>,
    formatter: RwLock<Arc<Formatter>>,
    view: RwLock<TableView>,
    /// Staged new rows keyed by offset past the last source row.
    pending: Mutex<BTreeMap<usize, Vec<Value>>>,
    events: GridEvents,
    closed: AtomicBool,
}

impl TableGridModel {
    /// Creates a model showing every row of `table`.
    pub fn new(
        table: Arc<dyn TableSource>,
        formatter: Arc<Formatter>,
        input_table: Option<Arc<dyn InputTable>>,
    ) -> Self {
        let view = TableView {
            sort: Vec::new(),
            filter: Vec::new(),
            custom_columns: Vec::new(),
            custom: Vec::new(),
            columns: table.columns(),
            mapping: RowMapping::identity(table.size()),
            viewport: None,
        };
        Self {
            table,
            input_table,
            formatter: RwLock::new(formatter),
            view: RwLock::new(view),
            pending: Mutex::new(BTreeMap::new()),
            events: GridEvents::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The last viewport requested.
    pub fn viewport(&self) -> Option<Viewport> {
        self.view.read().viewport.clone()
    }

    /// Re-reads the source after it changed outside this model.
    pub fn refresh(&self) {
        self.rebuild_mapping(&mut self.view.write());
        self.events.emit(GridModelEvent::Updated);
    }

    fn base_width(&self) -> usize {
        self.table.columns().len()
    }

    fn cell(&self, view: &TableView, source_row: usize, column: usize) -> Value {
        let width = self.base_width();
        if column < width {
            self.table.value(source_row, column)
        } else {
            view.custom
                .get(column - width)
                .map(|custom| custom.evaluate(|c| self.table.value(source_row, c)))
                .unwrap_or_default()
        }
    }

    fn rebuild_mapping(&self, view: &mut TableView) {
        let resolve = |name: &str| column_index(&view.columns, name);
        let filters: Vec<(usize, &FilterCondition)> = view
            .filter
            .iter()
            .filter_map(|f| resolve(&f.column).map(|i| (i, f)))
            .collect();
        let sorts: Vec<(usize, SortDirection)> = view
            .sort
            .iter()
            .filter_map(|s| resolve(&s.column).map(|i| (i, s.direction)))
            .collect();

        let view_ref: &TableView = view;
        let include = |row: usize| {
            filters
                .iter()
                .all(|(column, f)| f.matches(&self.cell(view_ref, row, *column)))
        };
        let compare = |a: usize, b: usize| {
            for &(column, direction) in &sorts {
                let ordering = compare_values(
                    &self.cell(view_ref, a, column),
                    &self.cell(view_ref, b, column),
                );
                let ordering = match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != CmpOrdering::Equal {
                    return ordering;
                }
            }
            CmpOrdering::Equal
        };

        let mut mapping = RowMapping::default();
        mapping.rebuild(self.table.size(), include, (!sorts.is_empty()).then_some(compare));
        view.mapping = mapping;
    }

    fn check_columns<'a>(
        columns: &[Column],
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        for name in names {
            if column_index(columns, name).is_none() {
                return Err(GridError::InvalidColumn(name.clone()));
            }
        }
        Ok(())
    }

    fn key_indexes(&self) -> Vec<usize> {
        let columns = self.table.columns();
        self.input_table
            .as_ref()
            .map(|input| {
                input
                    .key_columns()
                    .iter()
                    .filter_map(|key| column_index(&columns, key))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn visible_source_rows(&self) -> Vec<usize> {
        let view = self.view.read();
        (0..view.mapping.len())
            .filter_map(|row| view.mapping.map_to_source(row))
            .collect()
    }

    fn source_row_values(&self, source_row: usize) -> Vec<Value> {
        (0..self.base_width())
            .map(|column| self.table.value(source_row, column))
            .collect()
    }

    fn partition_filters(&self, keys: &[Value]) -> Result<Vec<FilterCondition>> {
        let columns = self.table.partition_columns();
        if keys.len() != columns.len() {
            return Err(GridError::source_failed(format!(
                "expected {} partition key values, got {}",
                columns.len(),
                keys.len()
            )));
        }
        Ok(columns
            .iter()
            .zip(keys)
            .map(|(column, key)| FilterCondition::eq(column.name.clone(), key.clone()))
            .collect())
    }

    fn parse_edit(&self, edit: &CellEdit) -> Result<Value> {
        let columns = self.table.columns();
        let column = columns.get(edit.column).ok_or(GridError::NotEditable)?;
        Value::parse(&edit.text, column.column_type).ok_or_else(|| GridError::InvalidValue {
            column: column.name.clone(),
            value: edit.text.clone(),
        })
    }
}

#[async_trait]
impl GridModel for TableGridModel {
    fn type_name(&self) -> &'static str {
        "TableGridModel"
    }

    fn row_count(&self) -> usize {
        let extent = self
            .pending
            .lock()
            .last_key_value()
            .map_or(0, |(offset, _)| offset + 1);
        self.view.read().mapping.len() + extent
    }

    fn columns(&self) -> Columns {
        self.view.read().columns.clone()
    }

    fn formatter(&self) -> Arc<Formatter> {
        self.formatter.read().clone()
    }

    fn set_formatter(&self, formatter: Arc<Formatter>) {
        *self.formatter.write() = formatter;
        self.events.emit(GridModelEvent::FormatterUpdated);
    }

    fn value_for_cell(&self, column: usize, row: usize) -> Value {
        let view = self.view.read();
        let visible = view.mapping.len();
        if row < visible {
            return view
                .mapping
                .map_to_source(row)
                .map(|source| self.cell(&view, source, column))
                .unwrap_or_default();
        }
        self.pending
            .lock()
            .get(&(row - visible))
            .and_then(|values| values.get(column).cloned())
            .unwrap_or_default()
    }

    fn sort(&self) -> Vec<SortDescriptor> {
        self.view.read().sort.clone()
    }

    fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        {
            let mut view = self.view.write();
            Self::check_columns(&view.columns, sort.iter().map(|s| &s.column))?;
            if view.sort == sort {
                return Ok(());
            }
            view.sort = sort;
            self.rebuild_mapping(&mut view);
        }
        self.events.emit(GridModelEvent::SortsChanged);
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn filter(&self) -> Vec<FilterCondition> {
        self.view.read().filter.clone()
    }

    fn set_filter(&self, filter: Vec<FilterCondition>) -> Result<()> {
        {
            let mut view = self.view.write();
            Self::check_columns(&view.columns, filter.iter().map(|f| &f.column))?;
            if view.filter == filter {
                return Ok(());
            }
            view.filter = filter;
            self.rebuild_mapping(&mut view);
        }
        self.events.emit(GridModelEvent::FiltersChanged);
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn custom_columns(&self) -> Vec<String> {
        self.view.read().custom_columns.clone()
    }

    fn set_custom_columns(&self, custom_columns: Vec<String>) -> Result<()> {
        let base = self.table.columns();
        let mut custom: Vec<CustomColumn> = Vec::with_capacity(custom_columns.len());
        for definition in &custom_columns {
            let parsed = CustomColumn::parse(definition, &base)?;
            if custom.iter().any(|c| c.column().name == parsed.column().name) {
                return Err(GridError::InvalidColumn(definition.clone()));
            }
            custom.push(parsed);
        }
        let columns: Columns = if custom.is_empty() {
            base
        } else {
            base.iter()
                .cloned()
                .chain(custom.iter().map(|c| c.column().clone()))
                .collect::<Vec<_>>()
                .into()
        };

        {
            let mut view = self.view.write();
            if view.custom_columns == custom_columns {
                return Ok(());
            }
            Self::check_columns(&columns, view.sort.iter().map(|s| &s.column))?;
            Self::check_columns(&columns, view.filter.iter().map(|f| &f.column))?;
            view.custom_columns = custom_columns;
            view.custom = custom;
            view.columns = columns.clone();
            self.rebuild_mapping(&mut view);
        }
        self.events.emit(GridModelEvent::ColumnsChanged(columns));
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn set_viewport(&self, top: usize, bottom: usize, columns: Option<Columns>) {
        self.view.write().viewport = Some(Viewport { top, bottom, columns });
        self.events.emit(GridModelEvent::ViewportUpdated { top, bottom });
    }

    fn is_rollup_available(&self) -> bool {
        self.table.is_rollup_available()
    }

    fn is_select_distinct_available(&self) -> bool {
        self.table.is_select_distinct_available()
    }

    fn events(&self) -> &GridEvents {
        &self.events
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.table.close();
            tracing::trace!(target: targets::MODEL, table = %self.table.name(), "closed table model");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn as_editable(&self) -> Option<&dyn EditableGridModel> {
        self.input_table.is_some().then_some(self as &dyn EditableGridModel)
    }

    fn as_deletable(&self) -> Option<&dyn DeletableGridModel> {
        self.input_table.is_some().then_some(self as &dyn DeletableGridModel)
    }

    fn as_partition_provider(&self) -> Option<&dyn PartitionedGridModelProvider> {
        Some(self)
    }

    fn as_table_backed(&self) -> Option<&dyn TableBackedGridModel> {
        Some(self)
    }
}

#[async_trait]
impl EditableGridModel for TableGridModel {
    fn is_editable(&self) -> bool {
        self.input_table.is_some()
    }

    fn is_editable_range(&self, range: &GridRange) -> bool {
        if !self.is_editable() || range.end_column >= self.base_width() {
            return false;
        }
        let visible = self.view.read().mapping.len();
        if range.end_row > self.row_count() {
            return false;
        }
        if range.start_row >= visible {
            return true;
        }
        let keys = self.key_indexes();
        !range.columns().any(|column| keys.contains(&column))
    }

    fn is_valid_for_cell(&self, column: usize, _row: usize, text: &str) -> bool {
        self.table
            .columns()
            .get(column)
            .is_some_and(|c| Value::parse(text, c.column_type).is_some())
    }

    fn edit_value_for_cell(&self, column: usize, row: usize) -> String {
        self.value_for_cell(column, row).to_string()
    }

    async fn set_value_for_cell(&self, column: usize, row: usize, text: &str) -> Result<()> {
        self.set_values(vec![CellEdit::new(column, row, text)]).await
    }

    async fn set_value_for_ranges(&self, ranges: &[GridRange], text: &str) -> Result<()> {
        let edits = ranges
            .iter()
            .flat_map(|range| range.cells())
            .map(|(column, row)| CellEdit::new(column, row, text))
            .collect();
        self.set_values(edits).await
    }

    async fn set_values(&self, edits: Vec<CellEdit>) -> Result<()> {
        let Some(input) = self.input_table.clone() else {
            return Err(GridError::NotEditable);
        };
        let mut parsed = Vec::with_capacity(edits.len());
        for edit in &edits {
            if !self.is_editable_range(&GridRange::cell(edit.column, edit.row)) {
                return Err(GridError::NotEditable);
            }
            parsed.push((edit.column, edit.row, self.parse_edit(edit)?));
        }

        let width = self.base_width();
        let mut updated: BTreeMap<usize, Vec<Value>> = BTreeMap::new();
        let mut staged = false;
        {
            let view = self.view.read();
            let visible = view.mapping.len();
            let mut pending = self.pending.lock();
            for (column, row, value) in parsed {
                if row < visible {
                    let Some(source) = view.mapping.map_to_source(row) else {
                        continue;
                    };
                    updated
                        .entry(source)
                        .or_insert_with(|| self.source_row_values(source))[column] = value;
                } else {
                    pending
                        .entry(row - visible)
                        .or_insert_with(|| vec![Value::Null; width])[column] = value;
                    staged = true;
                }
            }
        }

        if staged {
            self.events.emit(GridModelEvent::PendingDataUpdated);
        }
        if !updated.is_empty() {
            input.add_rows(updated.into_values().collect()).await?;
            self.refresh();
        }
        Ok(())
    }

    async fn commit_pending(&self) -> Result<()> {
        let Some(input) = self.input_table.clone() else {
            return Err(GridError::NotEditable);
        };
        let rows: Vec<Vec<Value>> = self.pending.lock().values().cloned().collect();
        if rows.is_empty() {
            return Ok(());
        }
        let columns = self.table.columns();
        for row in &rows {
            if let Some(&key) = self.key_indexes().iter().find(|&&k| row[k].is_null()) {
                return Err(GridError::InvalidValue {
                    column: columns[key].name.clone(),
                    value: String::new(),
                });
            }
        }

        let count = rows.len();
        input.add_rows(rows).await?;
        self.pending.lock().clear();
        tracing::debug!(target: targets::MODEL, rows = count, "committed pending rows");
        self.events.emit(GridModelEvent::PendingDataUpdated);
        self.refresh();
        Ok(())
    }

    fn pending_row_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl DeletableGridModel for TableGridModel {
    fn is_deletable_ranges(&self, ranges: &[GridRange]) -> bool {
        let row_count = self.row_count();
        self.input_table.is_some() && ranges.iter().all(|r| r.end_row < row_count)
    }

    async fn delete(&self, ranges: &[GridRange]) -> Result<()> {
        let Some(input) = self.input_table.clone() else {
            return Err(GridError::NotDeletable);
        };
        if !self.is_deletable_ranges(ranges) {
            return Err(GridError::NotDeletable);
        }
        let rows: BTreeSet<usize> = ranges.iter().flat_map(|r| r.rows()).collect();
        let keys_idx = self.key_indexes();
        let mut keys = Vec::new();
        let mut removed_pending = false;
        {
            let view = self.view.read();
            let visible = view.mapping.len();
            let mut pending = self.pending.lock();
            for row in rows {
                if row < visible {
                    if let Some(source) = view.mapping.map_to_source(row) {
                        keys.push(keys_idx.iter().map(|&k| self.table.value(source, k)).collect());
                    }
                } else {
                    removed_pending |= pending.remove(&(row - visible)).is_some();
                }
            }
        }

        if removed_pending {
            self.events.emit(GridModelEvent::PendingDataUpdated);
        }
        if !keys.is_empty() {
            input.delete_rows(keys).await?;
            self.refresh();
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionedGridModelProvider for TableGridModel {
    fn is_partition_required(&self) -> bool {
        !self.table.partition_columns().is_empty()
    }

    fn partition_columns(&self) -> Vec<Column> {
        self.table.partition_columns()
    }

    async fn partition_keys_table(&self) -> Result<SourceHandle> {
        let names: Vec<String> = self
            .table
            .partition_columns()
            .into_iter()
            .map(|c| c.name)
            .collect();
        Ok(SourceHandle::Table(self.table.select_distinct(&names).await?))
    }

    async fn partition_merged_table(&self) -> Result<SourceHandle> {
        Ok(SourceHandle::Table(self.table.filtered(&[]).await?))
    }

    async fn partition_table(&self, keys: &[Value]) -> Result<SourceHandle> {
        let filters = self.partition_filters(keys)?;
        Ok(SourceHandle::Table(self.table.filtered(&filters).await?))
    }
}

#[async_trait]
impl TableBackedGridModel for TableGridModel {
    fn table(&self) -> Option<Arc<dyn TableSource>> {
        Some(self.table.clone())
    }

    fn is_export_available(&self) -> bool {
        true
    }

    async fn export(&self, options: &ExportOptions) -> Result<String> {
        let columns = self.columns();
        let selected: Vec<usize> = match &options.columns {
            Some(names) => names
                .iter()
                .map(|name| {
                    column_index(&columns, name).ok_or_else(|| GridError::InvalidColumn(name.clone()))
                })
                .collect::<Result<_>>()?,
            None => (0..columns.len()).collect(),
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        if options.include_headers {
            writer.write_record(selected.iter().map(|&i| columns[i].name.as_str()))?;
        }
        let rows = self.visible_source_rows();
        {
            let view = self.view.read();
            for source in rows {
                writer.write_record(
                    selected
                        .iter()
                        .map(|&column| self.cell(&view, source, column).to_string()),
                )?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| GridError::source_failed(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| GridError::source_failed(e.to_string()))
    }

    async fn column_statistics(&self, column: usize) -> Result<ColumnStatistics> {
        let columns = self.columns();
        let info = columns
            .get(column)
            .ok_or_else(|| GridError::InvalidColumn(column.to_string()))?;
        let rows = self.visible_source_rows();
        let values: Vec<Value> = {
            let view = self.view.read();
            rows.iter().map(|&row| self.cell(&view, row, column)).collect()
        };

        let mut distinct: Vec<&Value> = Vec::new();
        let mut min: Option<&Value> = None;
        let mut max: Option<&Value> = None;
        let mut null_count = 0;
        for value in &values {
            if value.is_null() {
                null_count += 1;
                continue;
            }
            if !distinct.contains(&value) {
                distinct.push(value);
            }
            if min.is_none_or(|m| compare_values(value, m).is_lt()) {
                min = Some(value);
            }
            if max.is_none_or(|m| compare_values(value, m).is_gt()) {
                max = Some(value);
            }
        }
        let sum = info.column_type.is_numeric().then(|| sum_values(&values));

        Ok(ColumnStatistics {
            column: info.name.clone(),
            count: values.len(),
            null_count,
            distinct_count: distinct.len(),
            min: min.cloned().unwrap_or_default(),
            max: max.cloned().unwrap_or_default(),
            sum,
        })
    }

    async fn values_table(&self, columns: &[String]) -> Result<Arc<dyn TableSource>> {
        let base = self.table.columns();
        let filters: Vec<FilterCondition> = self
            .filter()
            .into_iter()
            .filter(|f| column_index(&base, &f.column).is_some())
            .collect();
        let filtered = self.table.filtered(&filters).await?;
        let values = filtered.select_distinct(columns).await;
        filtered.close();
        values
    }
}
