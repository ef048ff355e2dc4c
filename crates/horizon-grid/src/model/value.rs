//! Cell values, columns and the small value types grid models exchange.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit integer value.
    Int(i64),
    /// Double precision value.
    Double(f64),
    /// Text value.
    String(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string slice if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if the value is a negative number.
    pub fn is_negative(&self) -> bool {
        self.as_f64().is_some_and(|v| v < 0.0)
    }

    /// Parses `text` into a value of the given column type.
    ///
    /// An empty string parses to [`Value::Null`]. Returns `None` if the text
    /// is not valid for the type.
    pub fn parse(text: &str, column_type: ColumnType) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Some(Self::Null);
        }
        match column_type {
            ColumnType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
            ColumnType::Int => text.replace(',', "").parse().ok().map(Self::Int),
            ColumnType::Double => text.replace(',', "").parse().ok().map(Self::Double),
            ColumnType::String => Some(Self::String(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Compares two values for sorting.
///
/// Nulls sort first; numbers compare across int/double; mismatched kinds
/// compare equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Int(ia), Value::Int(ib)) => ia.cmp(ib),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(fa), Some(fb)) => fa.partial_cmp(&fb).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

/// Sums the non-null values.
///
/// All-int input stays [`Value::Int`] unless the total overflows `i64`, in
/// which case the sum is computed in floating point like any mixed input.
pub fn sum_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    let values: Vec<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    let int_total = values.iter().try_fold(0i64, |total, value| match value {
        Value::Int(i) => total.checked_add(*i),
        _ => None,
    });
    match int_total {
        Some(total) => Value::Int(total),
        None => Value::Double(values.iter().filter_map(|v| v.as_f64()).sum()),
    }
}

/// The declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Double,
    String,
}

impl ColumnType {
    /// Returns `true` for numeric column types.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Double)
    }
}

/// Column definition of a grid model or data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a source.
    pub name: String,
    /// Declared value type.
    pub column_type: ColumnType,
    /// Optional description shown in column tooltips.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the column partitions its table.
    #[serde(default)]
    pub is_partition_column: bool,
}

impl Column {
    /// Creates a column with the given name and type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            description: None,
            is_partition_column: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the column as a partition column.
    pub fn partition(mut self) -> Self {
        self.is_partition_column = true;
        self
    }
}

/// Shared, immutable column list. Identity (`Arc::ptr_eq`) means "same columns".
pub type Columns = Arc<[Column]>;

/// Finds the index of the column named `name`.
pub fn column_index(columns: &[Column], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name == name)
}

/// The visible row range (and optional column subset) requested by a view.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub top: usize,
    pub bottom: usize,
    pub columns: Option<Columns>,
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        self.top == other.top
            && self.bottom == other.bottom
            && match (&self.columns, &other.columns) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a[..] == b[..],
                _ => false,
            }
    }
}

/// An inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridRange {
    pub start_column: usize,
    pub start_row: usize,
    pub end_column: usize,
    pub end_row: usize,
}

impl GridRange {
    /// Creates a range, normalizing reversed corners.
    pub fn new(start_column: usize, start_row: usize, end_column: usize, end_row: usize) -> Self {
        Self {
            start_column: start_column.min(end_column),
            start_row: start_row.min(end_row),
            end_column: start_column.max(end_column),
            end_row: start_row.max(end_row),
        }
    }

    /// A range covering a single cell.
    pub fn cell(column: usize, row: usize) -> Self {
        Self::new(column, row, column, row)
    }

    /// Iterates the rows of the range.
    pub fn rows(&self) -> std::ops::RangeInclusive<usize> {
        self.start_row..=self.end_row
    }

    /// Iterates the columns of the range.
    pub fn columns(&self) -> std::ops::RangeInclusive<usize> {
        self.start_column..=self.end_column
    }

    /// Iterates every `(column, row)` cell of the range, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows()
            .flat_map(move |row| self.columns().map(move |column| (column, row)))
    }
}

/// Sort direction of a [`SortDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort key applied to a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescriptor {
    /// Ascending sort on `column`.
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on `column`.
    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Comparison applied by a [`FilterCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Contains,
    IsNull,
    IsNotNull,
}

/// A single column predicate. Conditions in a filter list are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    /// Creates a condition.
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }

    /// Evaluates the condition against a cell value.
    pub fn matches(&self, cell: &Value) -> bool {
        let ordering = || compare_values(cell, &self.value);
        match self.operator {
            FilterOperator::Eq => cell == &self.value || (cell.as_f64().is_some() && ordering().is_eq()),
            FilterOperator::NotEq => !(cell == &self.value || (cell.as_f64().is_some() && ordering().is_eq())),
            FilterOperator::Lt => !cell.is_null() && ordering().is_lt(),
            FilterOperator::LtEq => !cell.is_null() && ordering().is_le(),
            FilterOperator::Gt => !cell.is_null() && ordering().is_gt(),
            FilterOperator::GtEq => !cell.is_null() && ordering().is_ge(),
            FilterOperator::Contains => match (cell, &self.value) {
                (Value::String(haystack), Value::String(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            FilterOperator::IsNull => cell.is_null(),
            FilterOperator::IsNotNull => !cell.is_null(),
        }
    }
}

/// Horizontal alignment of cell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl CellAlignment {
    /// Default alignment for a column type.
    pub fn for_type(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int | ColumnType::Double => Self::Right,
            ColumnType::Bool => Self::Center,
            ColumnType::String => Self::Left,
        }
    }
}

/// Semantic text color of a cell; the theme maps it to a concrete color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellColor {
    #[default]
    Default,
    Negative,
    Null,
}

impl CellColor {
    /// Semantic color for a value.
    pub fn for_value(value: &Value) -> Self {
        if value.is_null() {
            Self::Null
        } else if value.is_negative() {
            Self::Negative
        } else {
            Self::Default
        }
    }
}

/// One text edit of a single cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub column: usize,
    pub row: usize,
    pub text: String,
}

impl CellEdit {
    pub fn new(column: usize, row: usize, text: impl Into<String>) -> Self {
        Self {
            column,
            row,
            text: text.into(),
        }
    }
}

/// Summary statistics of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStatistics {
    pub column: String,
    pub count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub min: Value,
    pub max: Value,
    /// Only present for numeric columns.
    pub sum: Option<Value>,
}

/// Options for [`TableBackedGridModel::export`](super::TableBackedGridModel::export).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_headers: bool,
    /// Column names to export; all columns when `None`.
    pub columns: Option<Vec<String>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_headers: true,
            columns: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_values() {
        let ints = [Value::Int(2), Value::Null, Value::Int(5)];
        assert_eq!(sum_values(&ints), Value::Int(7));
        assert_eq!(sum_values(std::iter::empty()), Value::Int(0));

        let mixed = [Value::Int(1), Value::Double(0.5)];
        assert_eq!(sum_values(&mixed), Value::Double(1.5));

        let overflowing = [Value::Int(i64::MAX), Value::Int(1)];
        assert_eq!(sum_values(&overflowing), Value::Double(i64::MAX as f64 + 1.0));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&Value::Int(1), &Value::Double(1.5)), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &Value::Int(0)), Ordering::Less);
        assert_eq!(
            compare_values(&Value::from("b"), &Value::from("a")),
            Ordering::Greater
        );
        assert_eq!(compare_values(&Value::from("a"), &Value::Int(1)), Ordering::Equal);
    }

    #[test]
    fn test_parse_by_type() {
        assert_eq!(Value::parse("1,234", ColumnType::Int), Some(Value::Int(1234)));
        assert_eq!(Value::parse("x", ColumnType::Int), None);
        assert_eq!(Value::parse("TRUE", ColumnType::Bool), Some(Value::Bool(true)));
        assert_eq!(Value::parse("  ", ColumnType::Double), Some(Value::Null));
    }

    #[test]
    fn test_filter_matches() {
        let gt = FilterCondition::new("A", FilterOperator::Gt, 3i64);
        assert!(gt.matches(&Value::Int(4)));
        assert!(!gt.matches(&Value::Null));
        assert!(FilterCondition::eq("A", 2i64).matches(&Value::Double(2.0)));
        let contains = FilterCondition::new("B", FilterOperator::Contains, "OO");
        assert!(contains.matches(&Value::from("foobar")));
    }

    #[test]
    fn test_grid_range_cells() {
        let range = GridRange::new(1, 2, 0, 1);
        let cells: Vec<_> = range.cells().collect();
        assert_eq!(cells, vec![(0, 1), (1, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_viewport_equality_by_content() {
        let columns: Columns = Arc::from(vec![Column::new("A", ColumnType::Int)]);
        let a = Viewport { top: 0, bottom: 10, columns: Some(columns.clone()) };
        let b = Viewport { top: 0, bottom: 10, columns: Some(Arc::from(columns.to_vec())) };
        assert_eq!(a, b);
    }
}
