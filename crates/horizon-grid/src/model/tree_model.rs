//! Grid model over a hierarchical table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use horizon_grid_core::logging::targets;
use parking_lot::RwLock;

use super::events::{GridEvents, GridModelEvent};
use super::formatter::Formatter;
use super::traits::{ExpandableGridModel, GridModel};
use super::value::{CellAlignment, Columns, FilterCondition, SortDescriptor, Value, Viewport};
use crate::error::{GridError, Result};
use crate::source::TreeSource;

#[derive(Debug, Default)]
struct TreeView {
    sort: Vec<SortDescriptor>,
    filter: Vec<FilterCondition>,
    viewport: Option<Viewport>,
}

/// Grid model over a [`TreeSource`], such as a rollup.
///
/// Sorts and filters are applied by the source. Custom columns are not
/// supported on hierarchical data.
pub struct TreeGridModel {
    tree: Arc<dyn TreeSource>,
    formatter: RwLock<Arc<Formatter>>,
    view: RwLock<TreeView>,
    events: GridEvents,
    closed: AtomicBool,
}

impl TreeGridModel {
    pub fn new(tree: Arc<dyn TreeSource>, formatter: Arc<Formatter>) -> Self {
        Self {
            tree,
            formatter: RwLock::new(formatter),
            view: RwLock::new(TreeView::default()),
            events: GridEvents::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The tree this model reads from.
    pub fn tree(&self) -> &Arc<dyn TreeSource> {
        &self.tree
    }

    /// The last viewport requested.
    pub fn viewport(&self) -> Option<Viewport> {
        self.view.read().viewport.clone()
    }
}

#[async_trait]
impl GridModel for TreeGridModel {
    fn type_name(&self) -> &'static str {
        "TreeGridModel"
    }

    fn row_count(&self) -> usize {
        self.tree.size()
    }

    fn columns(&self) -> Columns {
        self.tree.columns()
    }

    fn formatter(&self) -> Arc<Formatter> {
        self.formatter.read().clone()
    }

    fn set_formatter(&self, formatter: Arc<Formatter>) {
        *self.formatter.write() = formatter;
        self.events.emit(GridModelEvent::FormatterUpdated);
    }

    fn value_for_cell(&self, column: usize, row: usize) -> Value {
        self.tree.value(row, column)
    }

    fn text_align_for_cell(&self, column: usize, row: usize) -> CellAlignment {
        // Group labels read as headings.
        if column == 0 && self.tree.is_expandable(row) {
            return CellAlignment::Left;
        }
        self.columns()
            .get(column)
            .map(|c| CellAlignment::for_type(c.column_type))
            .unwrap_or_default()
    }

    fn sort(&self) -> Vec<SortDescriptor> {
        self.view.read().sort.clone()
    }

    fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        {
            let mut view = self.view.write();
            if view.sort == sort {
                return Ok(());
            }
            self.tree.set_sort(&sort)?;
            view.sort = sort;
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
            if view.filter == filter {
                return Ok(());
            }
            self.tree.set_filter(&filter)?;
            view.filter = filter;
        }
        self.events.emit(GridModelEvent::FiltersChanged);
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn custom_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_custom_columns(&self, custom_columns: Vec<String>) -> Result<()> {
        if custom_columns.is_empty() {
            Ok(())
        } else {
            Err(GridError::UnsupportedShape {
                operation: "custom_columns",
            })
        }
    }

    fn set_viewport(&self, top: usize, bottom: usize, columns: Option<Columns>) {
        self.view.write().viewport = Some(Viewport { top, bottom, columns });
        self.events.emit(GridModelEvent::ViewportUpdated { top, bottom });
    }

    fn events(&self) -> &GridEvents {
        &self.events
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.tree.close();
            tracing::trace!(target: targets::MODEL, tree = %self.tree.name(), "closed tree model");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn as_expandable(&self) -> Option<&dyn ExpandableGridModel> {
        Some(self)
    }
}

impl ExpandableGridModel for TreeGridModel {
    fn is_row_expandable(&self, row: usize) -> bool {
        self.tree.is_expandable(row)
    }

    fn is_row_expanded(&self, row: usize) -> bool {
        self.tree.is_expanded(row)
    }

    fn set_row_expanded(&self, row: usize, expanded: bool, expand_descendants: bool) -> Result<()> {
        if row >= self.tree.size() {
            return Err(GridError::source_failed(format!("row {row} is out of range")));
        }
        self.tree.set_expanded(row, expanded, expand_descendants);
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn is_expand_all_available(&self) -> bool {
        true
    }

    fn expand_all(&self) -> Result<()> {
        self.tree.expand_all();
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn collapse_all(&self) -> Result<()> {
        self.tree.collapse_all();
        self.events.emit(GridModelEvent::Updated);
        Ok(())
    }

    fn depth_for_row(&self, row: usize) -> usize {
        self.tree.depth(row)
    }
}
