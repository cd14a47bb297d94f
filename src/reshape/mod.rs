// src/reshape/mod.rs
//! Wide ↔ long reshaping.
//!
//! A `WideTable<K>` has one row per id `K` and one column per label. For a
//! workbook the id is the period and the labels are compound metadata
//! strings; anything `Clone + Ord` works as an id.

pub mod repivot;

pub use repivot::{filter_measures, merge_versions, repivot, FactRow, MeasureRow, Repivoted};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct WideTable<K> {
    pub ids: Vec<K>,
    pub columns: Vec<String>,
    /// `cells[row][col]`; rows may be shorter than `columns`.
    pub cells: Vec<Vec<Option<f64>>>,
}

/// One (id, column, value) triple produced by `unpivot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Melted<K> {
    pub id: K,
    pub column: String,
    pub value: Option<f64>,
}

impl<K: Clone> WideTable<K> {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            ids: Vec::new(),
            columns,
            cells: Vec::new(),
        }
    }

    pub fn push_row(&mut self, id: K, cells: Vec<Option<f64>>) {
        self.ids.push(id);
        self.cells.push(cells);
    }

    /// Melt: exactly one output per (row, column), row-major, ids preserved
    /// verbatim. Empty cells are emitted with `value: None`.
    pub fn unpivot(&self) -> Vec<Melted<K>> {
        let mut out = Vec::with_capacity(self.ids.len() * self.columns.len());
        for (id, row) in self.ids.iter().zip(&self.cells) {
            for (j, column) in self.columns.iter().enumerate() {
                out.push(Melted {
                    id: id.clone(),
                    column: column.clone(),
                    value: row.get(j).copied().flatten(),
                });
            }
        }
        out
    }
}

impl<K: Clone + Ord + Debug> WideTable<K> {
    /// Inverse of `unpivot`. Ids and columns keep first-seen order; a second
    /// value for the same (id, column) is a `DuplicateKey`.
    pub fn pivot(melted: &[Melted<K>]) -> Result<Self, PipelineError> {
        let mut row_of: BTreeMap<K, usize> = BTreeMap::new();
        let mut col_of: HashMap<String, usize> = HashMap::new();
        let mut table = WideTable::new(Vec::new());
        let mut filled: Vec<Vec<bool>> = Vec::new();

        for m in melted {
            let j = match col_of.get(&m.column) {
                Some(j) => *j,
                None => {
                    table.columns.push(m.column.clone());
                    col_of.insert(m.column.clone(), table.columns.len() - 1);
                    table.columns.len() - 1
                }
            };
            let i = match row_of.get(&m.id) {
                Some(i) => *i,
                None => {
                    table.push_row(m.id.clone(), Vec::new());
                    filled.push(Vec::new());
                    row_of.insert(m.id.clone(), table.ids.len() - 1);
                    table.ids.len() - 1
                }
            };

            let row = &mut table.cells[i];
            let seen = &mut filled[i];
            if row.len() <= j {
                row.resize(j + 1, None);
                seen.resize(j + 1, false);
            }
            if seen[j] {
                return Err(PipelineError::DuplicateKey {
                    key: format!("{:?}", m.id),
                    measure: m.column.clone(),
                });
            }
            seen[j] = true;
            row[j] = m.value;
        }

        let width = table.columns.len();
        for row in &mut table.cells {
            row.resize(width, None);
        }
        Ok(table)
    }
}
