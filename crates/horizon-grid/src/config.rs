//! Transformation configuration and persisted grid settings.
//!
//! Every transformation a proxy can apply is a plain serde value, so a
//! proxy's state can be dehydrated into [`TransformState`] and restored later.
//! [`GridSettings`] bundles that state with a [`Formatter`] and loads from
//! TOML or JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::model::{Formatter, Value};

/// Aggregation applied to rolled-up groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationOperation {
    Count,
    Sum,
    Min,
    Max,
    First,
    Last,
}

impl AggregationOperation {
    /// Short label used to disambiguate output column names.
    pub fn label(self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Sum => "Sum",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::First => "First",
            Self::Last => "Last",
        }
    }
}

/// One aggregation over a set of columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregation {
    pub operation: AggregationOperation,
    /// Source columns. Ignored for [`AggregationOperation::Count`].
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Aggregation {
    pub fn new<I, S>(operation: AggregationOperation, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Rollup (hierarchical group-by) of a flat table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Grouping columns, outermost level first.
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    /// Show the source rows beneath the innermost groups.
    #[serde(default)]
    pub include_constituents: bool,
}

impl RollupConfig {
    /// Groups by `columns` with no aggregations.
    pub fn group_by<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_by: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds an aggregation.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Includes constituent rows.
    pub fn with_constituents(mut self, include: bool) -> Self {
        self.include_constituents = include;
        self
    }
}

/// Which view of a partitioned source to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    /// The distinct partition keys.
    Keys,
    /// Every partition merged into one table.
    Merged,
    /// The single partition selected by [`PartitionConfig::partitions`].
    #[default]
    Partition,
}

/// Partition selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Key values, one per partition column.
    #[serde(default)]
    pub partitions: Vec<Value>,
    #[serde(default)]
    pub mode: PartitionMode,
}

impl PartitionConfig {
    /// Selects the partition with the given key values.
    pub fn partition<I, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            partitions: keys.into_iter().map(Into::into).collect(),
            mode: PartitionMode::Partition,
        }
    }

    /// Shows the partition keys.
    pub fn keys() -> Self {
        Self {
            partitions: Vec::new(),
            mode: PartitionMode::Keys,
        }
    }

    /// Shows all partitions merged.
    pub fn merged() -> Self {
        Self {
            partitions: Vec::new(),
            mode: PartitionMode::Merged,
        }
    }
}

/// Dehydrated transformation state of a proxy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformState {
    pub rollup: Option<RollupConfig>,
    pub partition: Option<PartitionConfig>,
    pub select_distinct: Vec<String>,
}

impl TransformState {
    /// Checks that rollup and select-distinct are not both set.
    pub fn validate(&self) -> Result<()> {
        if self.rollup.is_some() && !self.select_distinct.is_empty() {
            return Err(GridError::ConfigurationRejected(
                "Rollup and select distinct are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Persisted grid settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub formatter: Formatter,
    pub transforms: TransformState,
}

impl GridSettings {
    /// Parses settings from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.transforms.validate()?;
        Ok(settings)
    }

    /// Parses settings from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.transforms.validate()?;
        Ok(settings)
    }

    /// Serializes settings to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Serializes settings to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads settings from a file, choosing the format by extension.
    ///
    /// `.toml` files are parsed as TOML; everything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| GridError::io(path, e))?;
        if is_toml(path) {
            Self::from_toml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    /// Saves settings to a file, choosing the format by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = if is_toml(path) {
            self.to_toml_string()?
        } else {
            self.to_json_string()?
        };
        fs::write(path, text).map_err(|e| GridError::io(path, e))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
