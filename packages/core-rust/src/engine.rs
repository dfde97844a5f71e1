//! Tabular engine capability trait and the in-memory columnar implementation.
//!
//! The rest of the system depends only on [`TableEngine`]; the concrete
//! [`ColumnarEngine`] is the single in-process implementation, wrapped in
//! `Arc<dyn TableEngine>` for sharing across async boundaries.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value as JsonValue;

use crate::conditions::{cell_matches, FilterCondition};
use crate::error::EngineError;
use crate::table::{Column, Table};
use crate::value::{Cell, DType};

/// Column selector for `describe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeInclude {
    /// Every column.
    All,
    /// Numeric columns only (the default when no selector is given).
    Number,
    /// String columns only.
    Object,
    /// Columns whose dtype tag appears in the list.
    Tags(Vec<String>),
}

impl DescribeInclude {
    /// Parses the JSON form: `"all" | "number" | "object"` or a list of
    /// dtype tags.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedExpression`] for anything else.
    pub fn from_json(value: &JsonValue) -> Result<Self, EngineError> {
        match value {
            JsonValue::String(s) => match s.as_str() {
                "all" => Ok(Self::All),
                "number" => Ok(Self::Number),
                "object" => Ok(Self::Object),
                tag => DType::from_tag(tag).map(|_| Self::Tags(vec![tag.to_string()])).ok_or_else(
                    || EngineError::MalformedExpression {
                        message: format!("unknown include selector '{tag}'"),
                    },
                ),
            },
            JsonValue::Array(items) => {
                let mut tags = Vec::with_capacity(items.len());
                for item in items {
                    let tag = item.as_str().ok_or_else(|| EngineError::MalformedExpression {
                        message: "include list entries must be dtype tag strings".to_string(),
                    })?;
                    if DType::from_tag(tag).is_none() {
                        return Err(EngineError::MalformedExpression {
                            message: format!("unknown dtype tag '{tag}' in include list"),
                        });
                    }
                    tags.push(tag.to_string());
                }
                Ok(Self::Tags(tags))
            }
            other => Err(EngineError::MalformedExpression {
                message: format!("include selector must be a string or list, got {other}"),
            }),
        }
    }

    fn selects(&self, dtype: DType) -> bool {
        match self {
            Self::All => true,
            Self::Number => dtype.is_numeric(),
            Self::Object => dtype == DType::Str,
            Self::Tags(tags) => tags.iter().any(|t| t == dtype.tag()),
        }
    }
}

/// Capability set the cache core requires from a tabular engine.
///
/// All operations are synchronous and CPU-bound; implementations must be
/// cheap enough to call while holding the registry mutex for the shape and
/// memory accessors.
pub trait TableEngine: Send + Sync + 'static {
    fn row_count(&self, t: &Table) -> usize;

    fn col_count(&self, t: &Table) -> usize;

    fn column_names(&self, t: &Table) -> Vec<String>;

    /// Dtype tag of one column.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingColumn`] for an unknown column.
    fn dtype(&self, t: &Table, column: &str) -> Result<String, EngineError>;

    /// Deep memory footprint in bytes.
    fn deep_memory_bytes(&self, t: &Table) -> u64;

    fn is_empty(&self, t: &Table) -> bool;

    /// Deep copy for ownership transfer on store/retrieve.
    fn copy(&self, t: &Table) -> Table;

    /// First `n` rows (all rows when `n` exceeds the row count).
    fn head(&self, t: &Table, n: usize) -> Table;

    /// Last `n` rows, symmetric with [`TableEngine::head`].
    fn tail(&self, t: &Table, n: usize) -> Table;

    /// Uniform random sample of rows.
    ///
    /// At most one of `n` and `frac` may be given; with neither, the sample
    /// size defaults to `min(10, row_count)`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedExpression`] for conflicting or
    /// oversized sample parameters.
    fn sample(
        &self,
        t: &Table,
        n: Option<usize>,
        frac: Option<f64>,
        seed: Option<u64>,
    ) -> Result<Table, EngineError>;

    /// Per-column summary statistics as a table whose first column names the
    /// statistic.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedExpression`] when the selector matches
    /// no columns.
    fn describe(&self, t: &Table, include: Option<&DescribeInclude>)
        -> Result<Table, EngineError>;

    /// Distinct values of one column with counts (or frequencies when
    /// `normalize`), ordered by count descending then first appearance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingColumn`] for an unknown column.
    fn value_counts(
        &self,
        t: &Table,
        column: &str,
        normalize: bool,
        drop_null: bool,
    ) -> Result<Table, EngineError>;

    /// Rows matching every condition (logical AND).
    ///
    /// # Errors
    ///
    /// Propagates grammar and comparison errors from the condition set.
    fn filter_by_conditions(
        &self,
        t: &Table,
        conditions: &[FilterCondition],
    ) -> Result<Table, EngineError>;

    /// Projection onto the named columns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingColumn`] for an unknown column.
    fn select_columns(&self, t: &Table, columns: &[String]) -> Result<Table, EngineError>;

    /// Rows `lo..hi`, clamped to the table bounds.
    fn slice(&self, t: &Table, lo: usize, hi: usize) -> Table;

    /// One JSON object per row, keys in column order.
    fn to_records(&self, t: &Table) -> Vec<JsonValue>;
}

/// In-memory columnar implementation of [`TableEngine`].
///
/// Stateless; all data lives in the [`Table`] values it operates on.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnarEngine;

impl ColumnarEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TableEngine for ColumnarEngine {
    fn row_count(&self, t: &Table) -> usize {
        t.row_count()
    }

    fn col_count(&self, t: &Table) -> usize {
        t.col_count()
    }

    fn column_names(&self, t: &Table) -> Vec<String> {
        t.column_names().into_iter().map(str::to_string).collect()
    }

    fn dtype(&self, t: &Table, column: &str) -> Result<String, EngineError> {
        t.dtype_of(column)
            .map(|d| d.tag().to_string())
            .ok_or_else(|| EngineError::MissingColumn {
                name: column.to_string(),
            })
    }

    fn deep_memory_bytes(&self, t: &Table) -> u64 {
        t.deep_memory_bytes()
    }

    fn is_empty(&self, t: &Table) -> bool {
        t.is_empty()
    }

    fn copy(&self, t: &Table) -> Table {
        t.clone()
    }

    fn head(&self, t: &Table, n: usize) -> Table {
        t.slice(0, n)
    }

    fn tail(&self, t: &Table, n: usize) -> Table {
        let rows = t.row_count();
        t.slice(rows.saturating_sub(n), rows)
    }

    fn sample(
        &self,
        t: &Table,
        n: Option<usize>,
        frac: Option<f64>,
        seed: Option<u64>,
    ) -> Result<Table, EngineError> {
        let rows = t.row_count();
        let amount = match (n, frac) {
            (Some(_), Some(_)) => {
                return Err(EngineError::MalformedExpression {
                    message: "cannot specify both 'n' and 'frac'".to_string(),
                })
            }
            (Some(n), None) => n,
            (None, Some(frac)) => {
                if !(frac > 0.0 && frac <= 1.0) {
                    return Err(EngineError::MalformedExpression {
                        message: format!("'frac' must be in (0, 1], got {frac}"),
                    });
                }
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                #[allow(clippy::cast_sign_loss)]
                let amount = (frac * rows as f64).round() as usize;
                amount
            }
            (None, None) => rows.min(10),
        };
        if amount > rows {
            return Err(EngineError::MalformedExpression {
                message: format!("cannot sample {amount} rows from a table of {rows}"),
            });
        }
        let indices = match seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                rand::seq::index::sample(&mut rng, rows, amount)
            }
            None => {
                let mut rng = rand::rng();
                rand::seq::index::sample(&mut rng, rows, amount)
            }
        }
        .into_vec();
        t.take_rows(&indices)
    }

    fn describe(
        &self,
        t: &Table,
        include: Option<&DescribeInclude>,
    ) -> Result<Table, EngineError> {
        let selector = include.cloned().unwrap_or(DescribeInclude::Number);
        let targets: Vec<&Column> = t
            .columns()
            .iter()
            .filter(|c| selector.selects(c.dtype()))
            .collect();
        if targets.is_empty() {
            return Err(EngineError::MalformedExpression {
                message: "include selector matches no columns".to_string(),
            });
        }

        let numeric_only = targets.iter().all(|c| c.dtype().is_numeric());
        let stats: &[&str] = if numeric_only {
            &["count", "mean", "std", "min", "25%", "50%", "75%", "max"]
        } else {
            &[
                "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%",
                "max",
            ]
        };

        let mut columns = vec![Column::new(
            "statistic",
            DType::Str,
            stats.iter().map(|s| Cell::Str((*s).to_string())).collect(),
        )?];
        for col in targets {
            columns.push(describe_column(col, stats)?);
        }
        Table::new(columns)
    }

    fn value_counts(
        &self,
        t: &Table,
        column: &str,
        normalize: bool,
        drop_null: bool,
    ) -> Result<Table, EngineError> {
        let col = t.column(column).ok_or_else(|| EngineError::MissingColumn {
            name: column.to_string(),
        })?;

        let mut groups: Vec<(Cell, u64)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for cell in col.cells() {
            if cell.is_null() && drop_null {
                continue;
            }
            let key = format!("{cell:?}");
            match index.get(&key) {
                Some(&i) => groups[i].1 += 1,
                None => {
                    index.insert(key, groups.len());
                    groups.push((cell.clone(), 1));
                }
            }
        }
        // Stable sort keeps first-appearance order among equal counts.
        groups.sort_by(|a, b| b.1.cmp(&a.1));

        let total: u64 = groups.iter().map(|(_, c)| *c).sum();
        let values = Column::new(
            "Value",
            col.dtype(),
            groups.iter().map(|(cell, _)| cell.clone()).collect(),
        )?;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
        let counts = if normalize {
            Column::new(
                "Frequency",
                DType::Float64,
                groups
                    .iter()
                    .map(|(_, c)| Cell::Float(*c as f64 / total as f64))
                    .collect(),
            )?
        } else {
            Column::new(
                "Count",
                DType::Int64,
                groups.iter().map(|(_, c)| Cell::Int(*c as i64)).collect(),
            )?
        };
        Table::new(vec![values, counts])
    }

    fn filter_by_conditions(
        &self,
        t: &Table,
        conditions: &[FilterCondition],
    ) -> Result<Table, EngineError> {
        let mut keep: Vec<bool> = vec![true; t.row_count()];
        for cond in conditions {
            let col = t.column(&cond.column).ok_or_else(|| EngineError::MissingColumn {
                name: cond.column.clone(),
            })?;
            let dtype = col.dtype();
            for (row, cell) in col.cells().iter().enumerate() {
                if keep[row] {
                    keep[row] = cell_matches(cell, cond, dtype)?;
                }
            }
        }
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        t.take_rows(&indices)
    }

    fn select_columns(&self, t: &Table, columns: &[String]) -> Result<Table, EngineError> {
        t.select_columns(columns)
    }

    fn slice(&self, t: &Table, lo: usize, hi: usize) -> Table {
        t.slice(lo, hi)
    }

    fn to_records(&self, t: &Table) -> Vec<JsonValue> {
        t.to_records()
    }
}

/// Summary column for one input column, aligned with the `stats` rows.
fn describe_column(col: &Column, stats: &[&str]) -> Result<Column, EngineError> {
    if col.dtype().is_numeric() {
        let mut values: Vec<f64> = col.cells().iter().filter_map(Cell::as_f64).collect();
        values.sort_by(f64::total_cmp);
        let summary = NumericSummary::from_sorted(&values);
        let cells = stats
            .iter()
            .map(|stat| summary.stat_cell(stat))
            .collect::<Vec<_>>();
        Column::new(col.name(), DType::Float64, cells)
    } else {
        let non_null: Vec<String> = col
            .cells()
            .iter()
            .filter(|c| !c.is_null())
            .map(Cell::display_string)
            .collect();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for v in &non_null {
            let entry = counts.entry(v.as_str()).or_insert(0);
            if *entry == 0 {
                order.push(v.as_str());
            }
            *entry += 1;
        }
        // First-seen value wins ties for "top".
        let top = order
            .iter()
            .copied()
            .fold(None::<&str>, |best, v| match best {
                Some(b) if counts[b] >= counts[v] => Some(b),
                _ => Some(v),
            })
            .map(str::to_string);
        let cells = stats
            .iter()
            .map(|stat| match *stat {
                "count" => Cell::Str(non_null.len().to_string()),
                "unique" => Cell::Str(counts.len().to_string()),
                "top" => top.clone().map_or(Cell::Null, Cell::Str),
                "freq" => top
                    .as_deref()
                    .map_or(Cell::Null, |t| Cell::Str(counts[t].to_string())),
                _ => Cell::Null,
            })
            .collect::<Vec<_>>();
        Column::new(col.name(), DType::Str, cells)
    }
}

/// Numeric describe statistics over a sorted, non-null value set.
struct NumericSummary {
    count: usize,
    mean: Option<f64>,
    std: Option<f64>,
    min: Option<f64>,
    q25: Option<f64>,
    q50: Option<f64>,
    q75: Option<f64>,
    max: Option<f64>,
}

impl NumericSummary {
    #[allow(clippy::cast_precision_loss)]
    fn from_sorted(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                count,
                mean: None,
                std: None,
                min: None,
                q25: None,
                q50: None,
                q75: None,
                max: None,
            };
        }
        let mean = values.iter().sum::<f64>() / count as f64;
        // Sample standard deviation (ddof = 1); undefined for a single value.
        let std = (count > 1).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        });
        Self {
            count,
            mean: Some(mean),
            std,
            min: values.first().copied(),
            q25: Some(percentile(values, 0.25)),
            q50: Some(percentile(values, 0.50)),
            q75: Some(percentile(values, 0.75)),
            max: values.last().copied(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn stat_cell(&self, stat: &str) -> Cell {
        let value = match stat {
            "count" => Some(self.count as f64),
            "mean" => self.mean,
            "std" => self.std,
            "min" => self.min,
            "25%" => self.q25,
            "50%" => self.q50,
            "75%" => self.q75,
            "max" => self.max,
            _ => None,
        };
        value.map_or(Cell::Null, Cell::Float)
    }
}

/// Linear-interpolation percentile over sorted values.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
