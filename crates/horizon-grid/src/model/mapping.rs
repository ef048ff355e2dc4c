//! Row mapping between a model's visible rows and its source rows.

use std::cmp::Ordering;

/// Maps visible row indexes to source row indexes after filtering and sorting.
#[derive(Debug, Default, Clone)]
pub(crate) struct RowMapping {
    /// Visible row index to source row index.
    proxy_to_source: Vec<usize>,
}

impl RowMapping {
    /// Identity mapping over `source_count` rows.
    pub(crate) fn identity(source_count: usize) -> Self {
        Self {
            proxy_to_source: (0..source_count).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.proxy_to_source.len()
    }

    pub(crate) fn map_to_source(&self, row: usize) -> Option<usize> {
        self.proxy_to_source.get(row).copied()
    }

    /// Rebuilds the mapping: keeps rows accepted by `include`, then stable
    /// sorts them with `compare` if given.
    pub(crate) fn rebuild<F, C>(&mut self, source_count: usize, include: F, compare: Option<C>)
    where
        F: Fn(usize) -> bool,
        C: Fn(usize, usize) -> Ordering,
    {
        let mut visible: Vec<usize> = (0..source_count).filter(|&row| include(row)).collect();
        if let Some(compare) = compare {
            visible.sort_by(|&a, &b| compare(a, b));
        }
        self.proxy_to_source = visible;
    }
}
