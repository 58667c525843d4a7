use std::collections::HashMap;

use crate::error::{Result, RowStoreError};
use crate::grid::Grid;

/// Header name -> 1-based column position, derived from row 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderIndex {
    /// Headers in column order
    columns: Vec<(String, u32)>,
    positions: HashMap<String, u32>,
    duplicate: Option<(String, u32, u32)>,
}

impl HeaderIndex {
    /// Scan row 1 from column 1 to the sheet's max column, skipping empty
    /// cells. Must be re-derived after any row insert/delete.
    pub fn resolve<G: Grid + ?Sized>(grid: &G) -> Self {
        let mut index = HeaderIndex::default();

        for col in 1..=grid.max_column() {
            let value = grid.cell(1, col);
            if value.is_blank() {
                continue;
            }
            let name = value.canonical_string();
            if let Some(previous) = index.positions.insert(name.clone(), col) {
                if index.duplicate.is_none() {
                    index.duplicate = Some((name.clone(), previous, col));
                }
            }
            index.columns.push((name, col));
        }

        index
    }

    /// Resolve and require a non-empty, duplicate-free header row
    pub fn resolve_strict<G: Grid + ?Sized>(grid: &G) -> Result<Self> {
        let index = Self::resolve(grid);
        if index.is_empty() {
            return Err(RowStoreError::NoHeaders);
        }
        index.ensure_unique()?;
        Ok(index)
    }

    pub fn ensure_unique(&self) -> Result<()> {
        match &self.duplicate {
            Some((name, first, second)) => Err(RowStoreError::DuplicateHeader {
                name: name.clone(),
                first: *first,
                second: *second,
            }),
            None => Ok(()),
        }
    }

    /// Column for `name`; with duplicates the right-most column wins
    pub fn column(&self, name: &str) -> Option<u32> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Header names in column order
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    /// (name, column) pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.columns.iter().map(|(name, col)| (name.as_str(), *col))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
