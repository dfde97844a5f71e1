//! Size-bounded dataset summaries and budgeted textual rendering.
//!
//! The summarizer produces two artifacts: a structured [`DatasetSummary`]
//! within a byte budget, and a textual rendering of a dataset in one of three
//! formats (`table`, `csv`, `json`). Renderings apply progressive truncation
//! until the UTF-8 byte length fits the budget.

use std::sync::Arc;

use comfy_table::presets;
use framecache_core::{Cell, Column, DType, EngineError, Table, TableEngine};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::FrameError;

/// Fixed seed so uniform summary samples are reproducible.
const SAMPLE_SEED: u64 = 42;

/// Default number of sample rows in a summary.
const DEFAULT_SAMPLE_SIZE: usize = 10;

/// At most this many categorical columns get a value-count summary.
const CATEGORICAL_COLUMN_LIMIT: usize = 5;

/// Top-K cutoff for categorical value counts.
const CATEGORICAL_TOP_K: usize = 10;

/// Output format for [`DatasetSummarizer::format_for_display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormat {
    Table,
    Csv,
    Json,
}

impl DisplayFormat {
    /// Unknown format names fall back to `Table`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "csv" => Self::Csv,
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Per-column analysis record.
///
/// Type-specific fields are populated by dtype. A column whose statistics
/// fail keeps its base fields, with the failure recorded under `error`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnAnalysis {
    pub dtype: String,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub uniqueness_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_common: Option<Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured summary of one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    /// Injected by the manager before the summary leaves the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df_id: Option<String>,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub dtypes: Map<String, JsonValue>,
    pub memory_usage_mb: f64,
    pub null_counts: Map<String, JsonValue>,
    /// Approximate serialized size: UTF-8 length of the full table rendering.
    pub size_bytes: usize,
    pub column_analysis: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_summary: Option<Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorical_summary: Option<Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<String>,
    /// How the sample rows were selected: `stratified`, `uniform`, or `head`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_method: Option<String>,
}

/// Summarizer over a tabular engine.
pub struct DatasetSummarizer {
    engine: Arc<dyn TableEngine>,
}

impl DatasetSummarizer {
    #[must_use]
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    /// Builds a structured summary within `max_size_bytes`.
    ///
    /// Column-level failures are isolated into the per-column `error` field;
    /// the summary itself always succeeds for a well-formed table.
    #[allow(clippy::cast_precision_loss)]
    pub async fn summarize(
        &self,
        table: &Table,
        max_size_bytes: usize,
        include_sample: bool,
        sample_size: Option<usize>,
    ) -> Result<DatasetSummary, FrameError> {
        let sample_size = sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE);
        let full_rendering = render_plain(table, false);

        let mut dtypes = Map::new();
        let mut null_counts = Map::new();
        for col in table.columns() {
            dtypes.insert(col.name().to_string(), json!(col.dtype().tag()));
            null_counts.insert(col.name().to_string(), json!(col.null_count()));
        }

        let mut column_analysis = Map::new();
        for col in table.columns() {
            let analysis = self.analyze_column(table, col);
            column_analysis.insert(
                col.name().to_string(),
                serde_json::to_value(analysis).unwrap_or(JsonValue::Null),
            );
        }

        let mut summary = DatasetSummary {
            df_id: None,
            shape: table.shape(),
            columns: table.column_names().iter().map(|s| (*s).to_string()).collect(),
            dtypes,
            memory_usage_mb: table.deep_memory_bytes() as f64 / (1024.0 * 1024.0),
            null_counts,
            size_bytes: full_rendering.len(),
            column_analysis,
            numeric_summary: self.numeric_summary(table),
            categorical_summary: self.categorical_summary(table),
            sample_data: None,
            sampling_method: None,
        };

        if include_sample && sample_size > 0 {
            let (sample, method) = self.representative_sample(table, sample_size);
            // A quarter of the caller's budget is reserved for the sample.
            let sample_budget = max_size_bytes / 4;
            let rendered = self
                .format_for_display(&sample, sample_budget, DisplayFormat::Table)
                .await?;
            summary.sample_data = if rendered.len() <= sample_budget {
                Some(rendered)
            } else {
                Some("Sample too large to display".to_string())
            };
            summary.sampling_method = Some(method.to_string());
        }

        Ok(summary)
    }

    /// Renders `table` in `format`, truncating progressively until the UTF-8
    /// byte length fits `max_size_bytes`.
    pub async fn format_for_display(
        &self,
        table: &Table,
        max_size_bytes: usize,
        format: DisplayFormat,
    ) -> Result<String, FrameError> {
        if table.is_empty() {
            return Ok("Empty DataFrame".to_string());
        }
        let rendered = match format {
            DisplayFormat::Table => format_as_table(table, max_size_bytes),
            DisplayFormat::Csv => format_as_csv(table, max_size_bytes),
            DisplayFormat::Json => format_as_json(table, max_size_bytes),
        };
        Ok(rendered)
    }

    /// `describe()`-style map for numeric columns, or `None` without any.
    fn numeric_summary(&self, table: &Table) -> Option<Map<String, JsonValue>> {
        let described = self.engine.describe(table, None).ok()?;
        let stats = described.column("statistic")?;
        let mut summary = Map::new();
        for col in described.columns().iter().skip(1) {
            let mut per_stat = Map::new();
            for (stat, cell) in stats.cells().iter().zip(col.cells()) {
                per_stat.insert(stat.display_string(), cell.to_json());
            }
            summary.insert(col.name().to_string(), JsonValue::Object(per_stat));
        }
        Some(summary)
    }

    /// Top-K value counts for up to the first five string columns.
    fn categorical_summary(&self, table: &Table) -> Option<Map<String, JsonValue>> {
        let categorical: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| c.dtype() == DType::Str)
            .take(CATEGORICAL_COLUMN_LIMIT)
            .collect();
        if categorical.is_empty() {
            return None;
        }
        let mut summary = Map::new();
        for col in categorical {
            match self.engine.value_counts(table, col.name(), false, true) {
                Ok(counts) => {
                    let top = counts.slice(0, CATEGORICAL_TOP_K);
                    let mut per_value = Map::new();
                    if let (Some(values), Some(cnt)) = (top.column("Value"), top.column("Count")) {
                        for (value, count) in values.cells().iter().zip(cnt.cells()) {
                            per_value.insert(value.display_string(), count.to_json());
                        }
                    }
                    summary.insert(col.name().to_string(), JsonValue::Object(per_value));
                }
                Err(e) => {
                    tracing::warn!(column = col.name(), error = %e, "categorical summary failed");
                    summary.insert(
                        col.name().to_string(),
                        json!({ "error": e.to_string() }),
                    );
                }
            }
        }
        Some(summary)
    }

    /// Picks sample rows: stratified over the first string column when the
    /// table is large enough, otherwise a seeded uniform sample, with head as
    /// the last resort.
    fn representative_sample(&self, table: &Table, sample_size: usize) -> (Table, &'static str) {
        if table.row_count() <= sample_size {
            return (table.clone(), "head");
        }

        let first_categorical = table.columns().iter().find(|c| c.dtype() == DType::Str);
        if let Some(strat_col) = first_categorical {
            if table.row_count() > sample_size * 2 {
                if let Ok(sample) = stratified_sample(table, strat_col, sample_size) {
                    return (sample, "stratified");
                }
            }
        }

        match self
            .engine
            .sample(table, Some(sample_size), None, Some(SAMPLE_SEED))
        {
            Ok(sample) => (sample, "uniform"),
            Err(_) => (self.engine.head(table, sample_size), "head"),
        }
    }
}

/// Approximately proportional sample across the strata of `strat_col`.
fn stratified_sample(
    table: &Table,
    strat_col: &Column,
    sample_size: usize,
) -> Result<Table, FrameError> {
    // Group row indices by stratum, in first-appearance order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<usize>> =
        std::collections::HashMap::new();
    for (row, cell) in strat_col.cells().iter().enumerate() {
        let key = cell.display_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let quota = (sample_size / order.len().max(1)).max(1);
    let mut picked: Vec<usize> = Vec::new();
    for key in &order {
        let rows = &groups[key];
        picked.extend(rows.iter().take(quota.min(rows.len())));
    }
    picked.truncate(sample_size);
    Ok(table.take_rows(&picked)?)
}

/// Plain-text table rendering via comfy-table, with a dimension footer.
fn render_plain(table: &Table, with_index: bool) -> String {
    let mut rendered = comfy_table::Table::new();
    rendered.load_preset(presets::NOTHING);

    let mut header: Vec<String> = Vec::new();
    if with_index {
        header.push(String::new());
    }
    header.extend(table.column_names().iter().map(|s| (*s).to_string()));
    rendered.set_header(header);

    for row in 0..table.row_count() {
        let mut cells: Vec<String> = Vec::new();
        if with_index {
            cells.push(row.to_string());
        }
        cells.extend(table.row(row).iter().map(|c| c.display_string()));
        rendered.add_row(cells);
    }

    let (rows, cols) = table.shape();
    format!("{rendered}\n[{rows} rows x {cols} columns]")
}

/// Table format: row ladder, index toggle, then rightmost-column drops.
fn format_as_table(table: &Table, max_size_bytes: usize) -> String {
    let total_rows = table.row_count();
    let total_cols = table.col_count();
    let row_ladder = [usize::MAX, 50, 20, 10, 5];

    for max_rows in row_ladder {
        let truncated = if max_rows < total_rows {
            table.slice(0, max_rows)
        } else {
            table.clone()
        };
        let shown_rows = truncated.row_count();

        for with_index in [false, true] {
            let mut candidate = render_plain(&truncated, with_index);
            if shown_rows < total_rows {
                candidate.push_str(&format!("\n\n... ({} more rows)", total_rows - shown_rows));
            }
            if candidate.len() <= max_size_bytes {
                return candidate;
            }
        }

        // Drop rightmost columns.
        let names: Vec<String> = table
            .column_names()
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        for keep_cols in (1..=total_cols.min(10)).rev() {
            let Ok(projected) = truncated.select_columns(&names[..keep_cols]) else {
                continue;
            };
            let mut candidate = render_plain(&projected, false);
            if keep_cols < total_cols {
                candidate.push_str(&format!(
                    "\n\n... ({} more columns)",
                    total_cols - keep_cols
                ));
            }
            if shown_rows < total_rows {
                candidate.push_str(&format!("\n... ({} more rows)", total_rows - shown_rows));
            }
            if candidate.len() <= max_size_bytes {
                return candidate;
            }
        }
    }

    format!(
        "DataFrame too large to display\nShape: ({total_rows}, {total_cols})\nColumns: {:?}",
        table.column_names()
    )
}

/// CSV format: row ladder with a comment-line annotation.
fn format_as_csv(table: &Table, max_size_bytes: usize) -> String {
    let total_rows = table.row_count();
    for max_rows in [usize::MAX, 100, 50, 20, 10, 5] {
        let truncated = if max_rows < total_rows {
            table.slice(0, max_rows)
        } else {
            table.clone()
        };
        let mut candidate = render_csv(&truncated);
        if truncated.row_count() < total_rows {
            candidate.push_str(&format!(
                "\n# ... ({} more rows)",
                total_rows - truncated.row_count()
            ));
        }
        if candidate.len() <= max_size_bytes {
            return candidate;
        }
    }
    format!(
        "# DataFrame too large for CSV\n# Shape: ({}, {})",
        total_rows,
        table.col_count()
    )
}

/// JSON format: array-of-records ladder, else an error JSON with the shape.
fn format_as_json(table: &Table, max_size_bytes: usize) -> String {
    let total_rows = table.row_count();
    for max_rows in [usize::MAX, 50, 20, 10, 5] {
        let truncated = if max_rows < total_rows {
            table.slice(0, max_rows)
        } else {
            table.clone()
        };
        let records = JsonValue::Array(truncated.to_records());
        if let Ok(candidate) = serde_json::to_string_pretty(&records) {
            if candidate.len() <= max_size_bytes {
                return candidate;
            }
        }
    }
    json!({
        "error": "DataFrame too large for JSON",
        "shape": [total_rows, table.col_count()],
    })
    .to_string()
}

fn render_csv(table: &Table) -> String {
    let mut out = String::new();
    let header: Vec<String> = table
        .column_names()
        .iter()
        .map(|name| csv_escape(name))
        .collect();
    out.push_str(&header.join(","));
    for row in 0..table.row_count() {
        out.push('\n');
        let cells: Vec<String> = table
            .row(row)
            .iter()
            .map(|cell| csv_escape(&cell.display_string()))
            .collect();
        out.push_str(&cells.join(","));
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl DatasetSummarizer {
    /// Analyzes one column: nullness, uniqueness, and dtype-specific
    /// statistics.
    ///
    /// Failures are isolated per column: the base fields stay populated and
    /// the failure is recorded on the column's `error` field.
    #[allow(clippy::cast_precision_loss)]
    fn analyze_column(&self, table: &Table, col: &Column) -> ColumnAnalysis {
        let denominator = table.row_count().max(1) as f64;
        let unique_count = count_unique(col);
        let mut analysis = ColumnAnalysis {
            dtype: col.dtype().tag().to_string(),
            null_count: col.null_count(),
            null_percentage: col.null_count() as f64 / denominator * 100.0,
            unique_count,
            uniqueness_percentage: unique_count as f64 / denominator * 100.0,
            ..ColumnAnalysis::default()
        };

        if let Err(e) = self.analyze_typed(table, col, &mut analysis) {
            tracing::warn!(column = col.name(), error = %e, "column analysis failed");
            analysis.error = Some(e.to_string());
        }
        analysis
    }

    /// Dtype-specific statistics for one column.
    ///
    /// # Errors
    ///
    /// Non-finite numeric values and engine failures abort the column's
    /// statistics.
    #[allow(clippy::cast_precision_loss)]
    fn analyze_typed(
        &self,
        table: &Table,
        col: &Column,
        analysis: &mut ColumnAnalysis,
    ) -> Result<(), EngineError> {
        match col.dtype() {
            DType::Int64 | DType::Float64 => {
                let values: Vec<f64> = col.cells().iter().filter_map(Cell::as_f64).collect();
                if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                    return Err(EngineError::Internal {
                        message: format!(
                            "column '{}' contains the non-finite value {bad}; \
                             statistics are undefined",
                            col.name()
                        ),
                    });
                }
                if !values.is_empty() {
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    analysis.min = values.iter().copied().reduce(f64::min);
                    analysis.max = values.iter().copied().reduce(f64::max);
                    analysis.mean = Some(mean);
                    analysis.std = (values.len() > 1).then(|| {
                        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                            / (values.len() - 1) as f64;
                        var.sqrt()
                    });
                }
            }
            DType::Timestamp => {
                let millis: Vec<i64> = col
                    .cells()
                    .iter()
                    .filter_map(|c| match c {
                        Cell::Timestamp(ms) => Some(*ms),
                        _ => None,
                    })
                    .collect();
                if let (Some(&min), Some(&max)) = (millis.iter().min(), millis.iter().max()) {
                    analysis.min_date = Some(framecache_core::format_timestamp(min));
                    analysis.max_date = Some(framecache_core::format_timestamp(max));
                    analysis.date_range_days = Some((max - min) / 86_400_000);
                }
            }
            DType::Str | DType::Bool => {
                let rendered: Vec<String> = col
                    .cells()
                    .iter()
                    .filter(|c| !c.is_null())
                    .map(Cell::display_string)
                    .collect();
                if !rendered.is_empty() {
                    let lengths: Vec<usize> = rendered.iter().map(String::len).collect();
                    analysis.avg_length =
                        Some(lengths.iter().sum::<usize>() as f64 / lengths.len() as f64);
                    analysis.max_length = lengths.iter().max().copied();

                    let counts = self.engine.value_counts(table, col.name(), false, true)?;
                    let top = counts.slice(0, 3);
                    let mut most_common = Map::new();
                    if let (Some(values), Some(cnt)) = (top.column("Value"), top.column("Count"))
                    {
                        for (value, count) in values.cells().iter().zip(cnt.cells()) {
                            most_common.insert(value.display_string(), count.to_json());
                        }
                    }
                    analysis.most_common = Some(most_common);
                }
            }
        }
        Ok(())
    }
}

fn count_unique(col: &Column) -> usize {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for cell in col.cells() {
        if !cell.is_null() {
            seen.insert(format!("{cell:?}"));
        }
    }
    seen.len()
}
