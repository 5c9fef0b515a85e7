//! Core domain types: the table being augmented and per-row projections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ColgenError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one generation run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An ordered table of string cells with named columns.
///
/// Row identity is the row's position. Every row has exactly
/// `columns.len()` cells; missing values are stored as `""`. Rows only enter
/// through [`Dataset::push_row`], which keeps that width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with `""`; long rows are rejected.
    pub fn push_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        if row.len() > self.columns.len() {
            return Err(ColgenError::Dataset(format!(
                "row {} has {} cells but the table has {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Return the index of `name`, appending it (filled with `""`) if absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }

    /// Read a cell.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Overwrite a cell.
    pub fn set_cell(&mut self, row: usize, column: usize, value: String) -> Result<()> {
        let cell = self
            .rows
            .get_mut(row)
            .and_then(|r| r.get_mut(column))
            .ok_or_else(|| {
                ColgenError::Dataset(format!("cell ({row}, {column}) is out of bounds"))
            })?;
        *cell = value;
        Ok(())
    }

    /// Iterate rows as cell slices.
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Resolve column names to indices, failing on the first unknown name.
    pub fn resolve_columns(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    ColgenError::Dataset(format!(
                        "unknown column '{name}' (available: {})",
                        self.columns.join(", ")
                    ))
                })
            })
            .collect()
    }

    /// Project one row onto the given column indices.
    pub fn row_view(&self, row: usize, columns: &[usize]) -> Option<RowView> {
        let cells = self.rows.get(row)?;
        let fields = columns
            .iter()
            .filter_map(|&c| Some((self.columns.get(c)?.clone(), cells.get(c)?.clone())))
            .collect();
        Some(RowView { index: row, fields })
    }
}

// ---------------------------------------------------------------------------
// RowView
// ---------------------------------------------------------------------------

/// Immutable projection of one row's reference columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    /// Row index in the source dataset.
    pub index: usize,
    /// `(column, value)` pairs in selection order.
    pub fields: Vec<(String, String)>,
}

impl RowView {
    /// The `column: value` block fed to the template as reference content.
    pub fn reference_text(&self) -> String {
        self.fields
            .iter()
            .map(|(col, val)| format!("{col}: {val}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
