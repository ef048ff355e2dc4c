//! In-memory hierarchical table.
//!
//! Nodes live in an arena. Children are pushed before their parent, so every
//! child id is smaller than its parent's id; the filter pass relies on that to
//! evaluate subtrees in a single ascending sweep.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};

use horizon_grid_core::logging::targets;
use parking_lot::RwLock;

use crate::config::{AggregationOperation, RollupConfig};
use crate::error::{GridError, Result};
use crate::model::{
    Column, ColumnType, Columns, FilterCondition, SortDescriptor, SortDirection, Value,
    column_index, compare_values, sum_values,
};
use crate::source::TreeSource;

/// A node supplied to [`MemoryTreeTable::from_nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTreeNode {
    pub values: Vec<Value>,
    pub children: Vec<MemoryTreeNode>,
}

impl MemoryTreeNode {
    /// A node with no children.
    pub fn leaf(values: Vec<Value>) -> Self {
        Self {
            values,
            children: Vec::new(),
        }
    }

    /// A node with children.
    pub fn branch(values: Vec<Value>, children: Vec<MemoryTreeNode>) -> Self {
        Self { values, children }
    }
}

#[derive(Debug)]
struct Node {
    values: Vec<Value>,
    depth: usize,
    children: Vec<usize>,
    expanded: bool,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    sort: Vec<(usize, SortDirection)>,
    filter: Vec<(usize, FilterCondition)>,
    visible: Vec<usize>,
}

impl TreeState {
    fn rebuild_visible(&mut self) {
        let mut passes = vec![true; self.nodes.len()];
        if !self.filter.is_empty() {
            for id in 0..self.nodes.len() {
                let node = &self.nodes[id];
                let own = self
                    .filter
                    .iter()
                    .all(|(column, f)| f.matches(node.values.get(*column).unwrap_or(&Value::Null)));
                passes[id] = own || node.children.iter().any(|&child| passes[child]);
            }
        }

        let mut visible = Vec::new();
        let mut stack: Vec<usize> = self.ordered(&self.roots, &passes);
        stack.reverse();
        while let Some(id) = stack.pop() {
            visible.push(id);
            let node = &self.nodes[id];
            if node.expanded {
                let mut children = self.ordered(&node.children, &passes);
                children.reverse();
                stack.extend(children);
            }
        }
        self.visible = visible;
    }

    fn ordered(&self, ids: &[usize], passes: &[bool]) -> Vec<usize> {
        let mut ids: Vec<usize> = ids.iter().copied().filter(|&id| passes[id]).collect();
        if !self.sort.is_empty() {
            ids.sort_by(|&a, &b| self.compare_nodes(a, b));
        }
        ids
    }

    fn compare_nodes(&self, a: usize, b: usize) -> CmpOrdering {
        let (a, b) = (&self.nodes[a].values, &self.nodes[b].values);
        for &(column, direction) in &self.sort {
            let null = Value::Null;
            let ordering = compare_values(a.get(column).unwrap_or(&null), b.get(column).unwrap_or(&null));
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != CmpOrdering::Equal {
                return ordering;
            }
        }
        CmpOrdering::Equal
    }

    fn set_subtree_expanded(&mut self, id: usize, expanded: bool) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id];
            node.expanded = expanded;
            stack.extend(node.children.iter().copied());
        }
    }

    fn push_nodes(&mut self, specs: Vec<MemoryTreeNode>, depth: usize, width: usize) -> Result<Vec<usize>> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.values.len() != width {
                return Err(GridError::source_failed(format!(
                    "tree node has {} values, expected {width}",
                    spec.values.len()
                )));
            }
            let children = self.push_nodes(spec.children, depth + 1, width)?;
            self.nodes.push(Node {
                values: spec.values,
                depth,
                children,
                expanded: false,
            });
            ids.push(self.nodes.len() - 1);
        }
        Ok(ids)
    }
}

/// A hierarchical table held in memory.
///
/// Built either directly from nodes or as the rollup of a flat table.
/// All rows start collapsed.
#[derive(Debug)]
pub struct MemoryTreeTable {
    name: String,
    columns: Columns,
    state: RwLock<TreeState>,
    closed: AtomicBool,
}

impl MemoryTreeTable {
    /// Creates a tree from explicit nodes.
    pub fn from_nodes(
        name: impl Into<String>,
        columns: impl Into<Columns>,
        roots: Vec<MemoryTreeNode>,
    ) -> Result<Self> {
        let columns = columns.into();
        let mut state = TreeState::default();
        state.roots = state.push_nodes(roots, 0, columns.len())?;
        state.rebuild_visible();
        Ok(Self {
            name: name.into(),
            columns,
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
        })
    }

    /// Groups `rows` of a table with `columns` by the rollup's group-by
    /// columns, one tree level per column.
    pub fn rollup(
        name: impl Into<String>,
        columns: &[Column],
        rows: &[Vec<Value>],
        config: &RollupConfig,
    ) -> Result<Self> {
        if config.group_by.is_empty() {
            return Err(GridError::source_failed("rollup requires at least one group-by column"));
        }
        let plan = RollupPlan::new(columns, config)?;
        let mut state = TreeState::default();
        let all: Vec<usize> = (0..rows.len()).collect();
        state.roots = plan.build_level(&mut state, rows, &all, 0);
        state.rebuild_visible();
        Ok(Self {
            name: name.into(),
            columns: plan.columns.into(),
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
        })
    }

    fn resolve(&self, name: &str) -> Result<usize> {
        column_index(&self.columns, name).ok_or_else(|| GridError::InvalidColumn(name.to_string()))
    }

    fn node_at<T>(&self, row: usize, f: impl FnOnce(&Node) -> T) -> Option<T> {
        let state = self.state.read();
        state.visible.get(row).map(|&id| f(&state.nodes[id]))
    }
}

impl TreeSource for MemoryTreeTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Columns {
        self.columns.clone()
    }

    fn size(&self) -> usize {
        self.state.read().visible.len()
    }

    fn value(&self, row: usize, column: usize) -> Value {
        self.node_at(row, |node| node.values.get(column).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn depth(&self, row: usize) -> usize {
        self.node_at(row, |node| node.depth).unwrap_or(0)
    }

    fn is_expandable(&self, row: usize) -> bool {
        self.node_at(row, |node| !node.children.is_empty()).unwrap_or(false)
    }

    fn is_expanded(&self, row: usize) -> bool {
        self.node_at(row, |node| node.expanded).unwrap_or(false)
    }

    fn set_expanded(&self, row: usize, expanded: bool, descendants: bool) {
        let mut state = self.state.write();
        let Some(&id) = state.visible.get(row) else {
            return;
        };
        if descendants {
            state.set_subtree_expanded(id, expanded);
        } else {
            state.nodes[id].expanded = expanded;
        }
        state.rebuild_visible();
    }

    fn expand_all(&self) {
        let mut state = self.state.write();
        for node in state.nodes.iter_mut() {
            node.expanded = !node.children.is_empty();
        }
        state.rebuild_visible();
    }

    fn collapse_all(&self) {
        let mut state = self.state.write();
        for node in state.nodes.iter_mut() {
            node.expanded = false;
        }
        state.rebuild_visible();
    }

    fn set_sort(&self, sort: &[SortDescriptor]) -> Result<()> {
        let resolved = sort
            .iter()
            .map(|s| Ok((self.resolve(&s.column)?, s.direction)))
            .collect::<Result<Vec<_>>>()?;
        let mut state = self.state.write();
        state.sort = resolved;
        state.rebuild_visible();
        Ok(())
    }

    fn set_filter(&self, filter: &[FilterCondition]) -> Result<()> {
        let resolved = filter
            .iter()
            .map(|f| Ok((self.resolve(&f.column)?, f.clone())))
            .collect::<Result<Vec<_>>>()?;
        let mut state = self.state.write();
        state.filter = resolved;
        state.rebuild_visible();
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(target: targets::SOURCE, table = %self.name, "closed tree table");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct AggregateColumn {
    operation: AggregationOperation,
    source: Option<usize>,
}

/// Resolved rollup: group-by source indexes and one output column per aggregate.
struct RollupPlan {
    group_by: Vec<usize>,
    aggregates: Vec<AggregateColumn>,
    columns: Vec<Column>,
    include_constituents: bool,
}

impl RollupPlan {
    fn new(source: &[Column], config: &RollupConfig) -> Result<Self> {
        let lookup = |name: &str| {
            column_index(source, name).ok_or_else(|| GridError::InvalidColumn(name.to_string()))
        };
        let group_by = config
            .group_by
            .iter()
            .map(|name| lookup(name.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<Column> = group_by
            .iter()
            .map(|&i| Column {
                is_partition_column: false,
                ..source[i].clone()
            })
            .collect();
        let mut aggregates = Vec::new();

        for aggregation in &config.aggregations {
            let operation = aggregation.operation;
            if operation == AggregationOperation::Count {
                let name = unique_name(&columns, "Count", operation);
                columns.push(Column::new(name, ColumnType::Int));
                aggregates.push(AggregateColumn { operation, source: None });
                continue;
            }
            for column_name in &aggregation.columns {
                let index = lookup(column_name.as_str())?;
                let source_column = &source[index];
                if operation == AggregationOperation::Sum && !source_column.column_type.is_numeric() {
                    return Err(GridError::InvalidColumn(format!(
                        "{column_name} is not numeric"
                    )));
                }
                let name = unique_name(&columns, column_name, operation);
                columns.push(Column::new(name, source_column.column_type));
                aggregates.push(AggregateColumn { operation, source: Some(index) });
            }
        }

        Ok(Self {
            group_by,
            aggregates,
            columns,
            include_constituents: config.include_constituents,
        })
    }

    fn build_level(&self, state: &mut TreeState, rows: &[Vec<Value>], members: &[usize], level: usize) -> Vec<usize> {
        let key_column = self.group_by[level];
        let mut groups: Vec<(Value, Vec<usize>)> = Vec::new();
        for &row in members {
            let key = &rows[row][key_column];
            match groups.iter_mut().find(|(k, _)| k == key) {
                Some((_, group)) => group.push(row),
                None => groups.push((key.clone(), vec![row])),
            }
        }

        let mut ids = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            let children = if level + 1 < self.group_by.len() {
                self.build_level(state, rows, &group, level + 1)
            } else if self.include_constituents {
                group
                    .iter()
                    .map(|&row| {
                        state.nodes.push(Node {
                            values: self.constituent_values(&rows[row]),
                            depth: self.group_by.len(),
                            children: Vec::new(),
                            expanded: false,
                        });
                        state.nodes.len() - 1
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let mut values = vec![Value::Null; self.columns.len()];
            for (i, &source) in self.group_by.iter().enumerate().take(level + 1) {
                values[i] = rows[group[0]][source].clone();
            }
            for (i, aggregate) in self.aggregates.iter().enumerate() {
                values[self.group_by.len() + i] = aggregate_values(aggregate, rows, &group);
            }
            state.nodes.push(Node {
                values,
                depth: level,
                children,
                expanded: false,
            });
            ids.push(state.nodes.len() - 1);
        }
        ids
    }

    fn constituent_values(&self, row: &[Value]) -> Vec<Value> {
        let mut values: Vec<Value> = self.group_by.iter().map(|&i| row[i].clone()).collect();
        values.extend(self.aggregates.iter().map(|a| match a.source {
            Some(source) => row[source].clone(),
            None => Value::Null,
        }));
        values
    }
}

fn unique_name(columns: &[Column], base: &str, operation: AggregationOperation) -> String {
    if column_index(columns, base).is_none() {
        base.to_string()
    } else {
        format!("{base}_{}", operation.label())
    }
}

fn aggregate_values(aggregate: &AggregateColumn, rows: &[Vec<Value>], group: &[usize]) -> Value {
    let Some(source) = aggregate.source else {
        return Value::Int(group.len() as i64);
    };
    let mut values = group.iter().map(|&row| &rows[row][source]).filter(|v| !v.is_null());
    match aggregate.operation {
        AggregationOperation::Count => Value::Int(group.len() as i64),
        AggregationOperation::First => values.next().cloned().unwrap_or_default(),
        AggregationOperation::Last => values.last().cloned().unwrap_or_default(),
        AggregationOperation::Min => values
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or_default(),
        AggregationOperation::Max => values
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or_default(),
        AggregationOperation::Sum => sum_values(values),
    }
}
