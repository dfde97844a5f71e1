//! Columnar table representation.
//!
//! A [`Table`] is a rectangular, column-typed collection of [`Cell`]s. Tables
//! are values: every operation that changes shape produces a new table, and
//! the cache layer clones on ingress and egress so no caller can mutate
//! stored data in place.

use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::value::{Cell, DType};

/// A named, typed column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: DType,
    cells: Vec<Cell>,
}

impl Column {
    /// Creates a column, validating every cell against `dtype`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedTable`] if any cell does not fit.
    pub fn new(
        name: impl Into<String>,
        dtype: DType,
        cells: Vec<Cell>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if let Some(pos) = cells.iter().position(|c| !c.fits(dtype)) {
            return Err(EngineError::MalformedTable {
                message: format!("cell {pos} of column '{name}' does not fit dtype {dtype}"),
            });
        }
        Ok(Self { name, dtype, cells })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn cell(&self, row: usize) -> Option<&Cell> {
        self.cells.get(row)
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }

    #[must_use]
    pub fn non_null_count(&self) -> usize {
        self.len() - self.null_count()
    }

    /// Estimated heap cost: name plus every cell.
    #[must_use]
    pub fn memory_bytes(&self) -> u64 {
        self.name.len() as u64 + self.cells.iter().map(Cell::memory_bytes).sum::<u64>()
    }
}

/// A rectangular, column-typed table.
///
/// Invariants: all columns share one length; column names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table from columns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedTable`] on ragged columns or duplicate
    /// column names.
    pub fn new(columns: Vec<Column>) -> Result<Self, EngineError> {
        if let Some(first) = columns.first() {
            let rows = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
                return Err(EngineError::MalformedTable {
                    message: format!(
                        "column '{}' has {} rows, expected {rows}",
                        bad.name(),
                        bad.len()
                    ),
                });
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == col.name()) {
                return Err(EngineError::MalformedTable {
                    message: format!("duplicate column name '{}'", col.name()),
                });
            }
        }
        Ok(Self { columns })
    }

    /// A table with no columns and no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self { columns: Vec::new() }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    #[must_use]
    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.col_count())
    }

    /// A table with zero rows or zero columns holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.col_count() == 0
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Dtype tag of a column, if present.
    #[must_use]
    pub fn dtype_of(&self, name: &str) -> Option<DType> {
        self.column(name).map(Column::dtype)
    }

    /// Column-name to dtype-tag pairs in column order.
    #[must_use]
    pub fn dtypes(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().tag().to_string()))
            .collect()
    }

    /// Deep memory footprint of the table in bytes.
    #[must_use]
    pub fn deep_memory_bytes(&self) -> u64 {
        self.columns.iter().map(Column::memory_bytes).sum()
    }

    /// Rows `lo..hi` (clamped) across all columns.
    #[must_use]
    pub fn slice(&self, lo: usize, hi: usize) -> Self {
        let rows = self.row_count();
        let lo = lo.min(rows);
        let hi = hi.clamp(lo, rows);
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                cells: c.cells[lo..hi].to_vec(),
            })
            .collect();
        Self { columns }
    }

    /// The rows whose indices appear in `indices`, in `indices` order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] on an out-of-bounds index.
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self, EngineError> {
        let rows = self.row_count();
        if let Some(bad) = indices.iter().find(|&&i| i >= rows) {
            return Err(EngineError::Internal {
                message: format!("row index {bad} out of bounds ({rows} rows)"),
            });
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                cells: indices.iter().map(|&i| c.cells[i].clone()).collect(),
            })
            .collect();
        Ok(Self { columns })
    }

    /// Projection onto `names`, in `names` order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingColumn`] for an unknown name.
    pub fn select_columns(&self, names: &[String]) -> Result<Self, EngineError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| EngineError::MissingColumn {
                    name: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    /// One JSON object per row, keys in column order.
    #[must_use]
    pub fn to_records(&self) -> Vec<JsonValue> {
        (0..self.row_count())
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for col in &self.columns {
                    obj.insert(col.name().to_string(), col.cells[row].to_json());
                }
                JsonValue::Object(obj)
            })
            .collect()
    }

    /// Cells of one row in column order.
    #[must_use]
    pub fn row(&self, row: usize) -> Vec<&Cell> {
        self.columns.iter().filter_map(|c| c.cell(row)).collect()
    }
}

/// Incremental table construction for fixtures and engine output.
///
/// Panics on malformed input are confined to `build`, which surfaces the
/// normal [`EngineError`] instead.
#[derive(Debug, Default)]
pub struct TableBuilder {
    columns: Vec<Column>,
    error: Option<EngineError>,
}

impl TableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn column(mut self, name: &str, dtype: DType, cells: Vec<Cell>) -> Self {
        if self.error.is_none() {
            match Column::new(name, dtype, cells) {
                Ok(col) => self.columns.push(col),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    #[must_use]
    pub fn int(self, name: &str, values: Vec<i64>) -> Self {
        let cells = values.into_iter().map(Cell::Int).collect();
        self.column(name, DType::Int64, cells)
    }

    #[must_use]
    pub fn float(self, name: &str, values: Vec<f64>) -> Self {
        let cells = values.into_iter().map(Cell::Float).collect();
        self.column(name, DType::Float64, cells)
    }

    #[must_use]
    pub fn str(self, name: &str, values: Vec<&str>) -> Self {
        let cells = values.into_iter().map(|s| Cell::Str(s.to_string())).collect();
        self.column(name, DType::Str, cells)
    }

    #[must_use]
    pub fn bool(self, name: &str, values: Vec<bool>) -> Self {
        let cells = values.into_iter().map(Cell::Bool).collect();
        self.column(name, DType::Bool, cells)
    }

    /// # Errors
    ///
    /// Returns the first construction error observed.
    pub fn build(self) -> Result<Table, EngineError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Table::new(self.columns)
    }
}
