//! Capability predicates.
//!
//! Total checks for whether a (possibly absent) model offers an optional
//! capability, for callers that branch on a model's shape without knowing its
//! concrete type.

use super::traits::GridModel;

/// Whether the model supports hierarchical expand/collapse.
pub fn is_expandable_grid_model(model: Option<&dyn GridModel>) -> bool {
    model.is_some_and(|m| m.as_expandable().is_some())
}

/// Whether the model supports cell editing.
pub fn is_editable_grid_model(model: Option<&dyn GridModel>) -> bool {
    model.is_some_and(|m| m.as_editable().is_some())
}

/// Whether the model supports row deletion.
pub fn is_deletable_grid_model(model: Option<&dyn GridModel>) -> bool {
    model.is_some_and(|m| m.as_deletable().is_some())
}

/// Whether the model provides partition derivations.
pub fn is_partitioned_grid_model_provider(model: Option<&dyn GridModel>) -> bool {
    model.is_some_and(|m| m.as_partition_provider().is_some())
}

/// Whether the model reads from a single flat table.
pub fn is_table_backed_grid_model(model: Option<&dyn GridModel>) -> bool {
    model.is_some_and(|m| m.as_table_backed().is_some())
}
