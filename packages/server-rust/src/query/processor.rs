//! Query dispatcher: routes `(operation, parameters)` to engine primitives.
//!
//! The dispatcher operates on a dataset copy obtained from the registry; it
//! never observes shared state. Every successful dispatch returns a full
//! [`QueryResult`]; there are no partial successes.

use std::sync::Arc;
use std::time::Instant;

use framecache_core::{
    parse_conditions, Cell, Column, DType, DescribeInclude, Table, TableEngine,
};
use serde_json::{json, Map, Value as JsonValue};

use super::params::{
    from_map, DescribeParams, FilterParams, InfoParams, RowWindowParams, SampleParams,
    SearchParams, ValueCountsParams,
};
use crate::error::FrameError;

/// The recognized operation names, in documentation order.
pub const OPERATIONS: &[&str] = &[
    "head",
    "tail",
    "sample",
    "describe",
    "info",
    "filter",
    "search",
    "value_counts",
];

/// Result of one query operation.
///
/// `provenance` carries shape deltas and operation-specific counts; it is
/// serialized as the `metadata` field of the wire response.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub data: Table,
    pub operation: &'static str,
    /// Parameters as supplied by the caller.
    pub parameters: Map<String, JsonValue>,
    pub provenance: Map<String, JsonValue>,
    /// Wall-clock time of the dispatcher body, excluding registry lookup.
    pub execution_time_ms: f64,
}

/// Routes operations against a tabular engine.
pub struct QueryProcessor {
    engine: Arc<dyn TableEngine>,
}

impl QueryProcessor {
    #[must_use]
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    /// Validates and executes one operation against `table`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown operations, bad parameters, or malformed
    /// conditions; `Engine` for engine-internal failures.
    pub async fn dispatch(
        &self,
        table: &Table,
        operation: &str,
        params: &Map<String, JsonValue>,
    ) -> Result<QueryResult, FrameError> {
        let start = Instant::now();
        let mut result = match operation {
            "head" => self.head(table, from_map(operation, params)?),
            "tail" => self.tail(table, from_map(operation, params)?),
            "sample" => self.sample(table, from_map(operation, params)?),
            "describe" => self.describe(table, from_map(operation, params)?),
            "info" => self.info(table, from_map(operation, params)?),
            "filter" => self.filter(table, from_map(operation, params)?),
            "search" => self.search(table, from_map(operation, params)?),
            "value_counts" => self.value_counts(table, from_map(operation, params)?),
            other => Err(FrameError::invalid(format!(
                "unknown query operation: {other}"
            ))),
        }?;
        result.execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            operation = result.operation,
            rows = result.data.row_count(),
            elapsed_ms = result.execution_time_ms,
            "executed query operation"
        );
        Ok(result)
    }

    fn head(&self, table: &Table, params: RowWindowParams) -> Result<QueryResult, FrameError> {
        params.validate()?;
        let data = self.engine.head(table, clamp(params.n));
        Ok(windowed_result("head", table, data, params.n))
    }

    fn tail(&self, table: &Table, params: RowWindowParams) -> Result<QueryResult, FrameError> {
        params.validate()?;
        let data = self.engine.tail(table, clamp(params.n));
        Ok(windowed_result("tail", table, data, params.n))
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample(&self, table: &Table, params: SampleParams) -> Result<QueryResult, FrameError> {
        params.validate()?;
        let data = self.engine.sample(
            table,
            params.n.map(clamp),
            params.frac,
            params.random_state,
        )?;
        let ratio = if table.row_count() > 0 {
            data.row_count() as f64 / table.row_count() as f64
        } else {
            0.0
        };
        let mut provenance = shapes(table, &data);
        provenance.insert("rows_returned".into(), json!(data.row_count()));
        provenance.insert("sampling_ratio".into(), json!(ratio));
        Ok(QueryResult {
            data,
            operation: "sample",
            parameters: object(json!({
                "n": params.n,
                "frac": params.frac,
                "random_state": params.random_state,
            })),
            provenance,
            execution_time_ms: 0.0,
        })
    }

    fn describe(&self, table: &Table, params: DescribeParams) -> Result<QueryResult, FrameError> {
        let include = params
            .include
            .as_ref()
            .map(DescribeInclude::from_json)
            .transpose()?;
        let data = self.engine.describe(table, include.as_ref())?;
        let columns_analyzed: Vec<String> = data
            .column_names()
            .into_iter()
            .filter(|name| *name != "statistic")
            .map(str::to_string)
            .collect();
        let statistics: Vec<String> = data
            .column("statistic")
            .map(|col| col.cells().iter().map(Cell::display_string).collect())
            .unwrap_or_default();
        let mut provenance = shapes(table, &data);
        provenance.insert("columns_analyzed".into(), json!(columns_analyzed));
        provenance.insert("statistics_computed".into(), json!(statistics));
        Ok(QueryResult {
            data,
            operation: "describe",
            parameters: object(json!({ "include": params.include })),
            provenance,
            execution_time_ms: 0.0,
        })
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    fn info(&self, table: &Table, _params: InfoParams) -> Result<QueryResult, FrameError> {
        let mut names = Vec::new();
        let mut non_null = Vec::new();
        let mut dtypes = Vec::new();
        let mut memory = Vec::new();
        for col in table.columns() {
            names.push(Cell::Str(col.name().to_string()));
            non_null.push(Cell::Int(col.non_null_count() as i64));
            dtypes.push(Cell::Str(col.dtype().tag().to_string()));
            memory.push(Cell::Int(col.memory_bytes() as i64));
        }
        let data = Table::new(vec![
            Column::new("Column", DType::Str, names)?,
            Column::new("Non-Null Count", DType::Int64, non_null)?,
            Column::new("Dtype", DType::Str, dtypes)?,
            Column::new("Memory Usage", DType::Int64, memory)?,
        ])?;

        let total_memory = table.deep_memory_bytes();
        let mut provenance = shapes(table, &data);
        provenance.insert("total_memory_usage".into(), json!(total_memory));
        provenance.insert(
            "total_memory_mb".into(),
            json!(total_memory as f64 / (1024.0 * 1024.0)),
        );
        provenance.insert("column_count".into(), json!(table.col_count()));
        provenance.insert("row_count".into(), json!(table.row_count()));
        Ok(QueryResult {
            data,
            operation: "info",
            parameters: Map::new(),
            provenance,
            execution_time_ms: 0.0,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn filter(&self, table: &Table, params: FilterParams) -> Result<QueryResult, FrameError> {
        params.validate()?;
        let conditions = parse_conditions(&params.conditions)?;
        let data = self.engine.filter_by_conditions(table, &conditions)?;

        let applied: Vec<String> = conditions.iter().map(|c| c.describe()).collect();
        let ratio = if table.row_count() > 0 {
            data.row_count() as f64 / table.row_count() as f64
        } else {
            0.0
        };
        let mut provenance = shapes(table, &data);
        provenance.insert(
            "rows_filtered".into(),
            json!(table.row_count() - data.row_count()),
        );
        provenance.insert("filter_ratio".into(), json!(ratio));
        provenance.insert("applied_conditions".into(), json!(applied));
        Ok(QueryResult {
            data,
            operation: "filter",
            parameters: object(json!({ "conditions": params.conditions })),
            provenance,
            execution_time_ms: 0.0,
        })
    }

    fn search(&self, table: &Table, params: SearchParams) -> Result<QueryResult, FrameError> {
        let columns: Vec<String> = match &params.columns {
            Some(requested) => {
                let missing: Vec<&String> = requested
                    .iter()
                    .filter(|name| table.column(name).is_none())
                    .collect();
                if !missing.is_empty() {
                    return Err(FrameError::invalid(format!(
                        "columns not found: {missing:?}"
                    )));
                }
                requested.clone()
            }
            None => table
                .columns()
                .iter()
                .filter(|c| c.dtype() == DType::Str)
                .map(|c| c.name().to_string())
                .collect(),
        };
        if columns.is_empty() {
            return Err(FrameError::invalid(
                "no searchable columns found in dataset",
            ));
        }

        let needle = params.query.to_lowercase();
        let mut indices = Vec::new();
        for row in 0..table.row_count() {
            let hit = columns.iter().any(|name| {
                table
                    .column(name)
                    .and_then(|col| col.cell(row))
                    .is_some_and(|cell| {
                        !cell.is_null() && cell.display_string().to_lowercase().contains(&needle)
                    })
            });
            if hit {
                indices.push(row);
            }
        }
        let data = table.take_rows(&indices)?;

        let mut provenance = shapes(table, &data);
        provenance.insert("matches_found".into(), json!(data.row_count()));
        provenance.insert("columns_searched".into(), json!(columns));
        provenance.insert("search_query".into(), json!(params.query));
        Ok(QueryResult {
            data,
            operation: "search",
            parameters: object(json!({
                "query": params.query,
                "columns": params.columns,
            })),
            provenance,
            execution_time_ms: 0.0,
        })
    }

    fn value_counts(
        &self,
        table: &Table,
        params: ValueCountsParams,
    ) -> Result<QueryResult, FrameError> {
        let data = self
            .engine
            .value_counts(table, &params.column, params.normalize, params.dropna)?;

        let column = table
            .column(&params.column)
            .expect("column checked by the engine");
        let total_values = if params.dropna {
            column.non_null_count()
        } else {
            column.len()
        };
        let mut provenance = shapes(table, &data);
        provenance.insert("unique_values".into(), json!(data.row_count()));
        provenance.insert("column_analyzed".into(), json!(params.column));
        provenance.insert("total_values".into(), json!(total_values));
        provenance.insert("null_values".into(), json!(column.null_count()));
        Ok(QueryResult {
            data,
            operation: "value_counts",
            parameters: object(json!({
                "column": params.column,
                "normalize": params.normalize,
                "dropna": params.dropna,
            })),
            provenance,
            execution_time_ms: 0.0,
        })
    }
}

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn shape_json(shape: (usize, usize)) -> JsonValue {
    json!([shape.0, shape.1])
}

fn shapes(original: &Table, result: &Table) -> Map<String, JsonValue> {
    let mut provenance = Map::new();
    provenance.insert("original_shape".into(), shape_json(original.shape()));
    provenance.insert("result_shape".into(), shape_json(result.shape()));
    provenance
}

fn object(value: JsonValue) -> Map<String, JsonValue> {
    value.as_object().cloned().unwrap_or_default()
}

fn windowed_result(
    operation: &'static str,
    original: &Table,
    data: Table,
    n: u64,
) -> QueryResult {
    let mut provenance = shapes(original, &data);
    provenance.insert("rows_returned".into(), json!(data.row_count()));
    QueryResult {
        data,
        operation,
        parameters: object(json!({ "n": n })),
        provenance,
        execution_time_ms: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecache_core::{ColumnarEngine, TableBuilder};
    use serde_json::json;

    fn processor() -> QueryProcessor {
        QueryProcessor::new(Arc::new(ColumnarEngine::new()))
    }

    fn people() -> Table {
        TableBuilder::new()
            .int("id", (1..=6).collect())
            .str("name", vec!["alice", "bob", "carol", "dave", "erin", "frank"])
            .int("age", vec![30, 55, 62, 41, 55, 28])
            .str("status", vec!["active", "idle", "active", "active", "idle", "gone"])
            .build()
            .unwrap()
    }

    fn params(v: serde_json::Value) -> Map<String, JsonValue> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn head_returns_first_rows_with_provenance() {
        let result = processor()
            .dispatch(&people(), "head", &params(json!({"n": 2})))
            .await
            .unwrap();
        assert_eq!(result.operation, "head");
        assert_eq!(result.data.shape(), (2, 4));
        assert_eq!(result.parameters, params(json!({"n": 2})));
        assert_eq!(result.provenance["original_shape"], json!([6, 4]));
        assert_eq!(result.provenance["result_shape"], json!([2, 4]));
        assert_eq!(result.provenance["rows_returned"], json!(2));
        assert!(result.execution_time_ms >= 0.0);
        assert!(result.execution_time_ms.is_finite());
    }

    #[tokio::test]
    async fn head_defaults_and_clamps() {
        let result = processor()
            .dispatch(&people(), "head", &params(json!({})))
            .await
            .unwrap();
        assert_eq!(result.data.row_count(), 5);

        let result = processor()
            .dispatch(&people(), "head", &params(json!({"n": 100})))
            .await
            .unwrap();
        assert_eq!(result.data.row_count(), 6);
    }

    #[tokio::test]
    async fn tail_returns_last_rows() {
        let result = processor()
            .dispatch(&people(), "tail", &params(json!({"n": 2})))
            .await
            .unwrap();
        let names: Vec<String> = result.data.column("name").unwrap().cells().iter()
            .map(Cell::display_string).collect();
        assert_eq!(names, vec!["erin", "frank"]);
    }

    #[tokio::test]
    async fn sample_respects_seed_and_reports_ratio() {
        let p = processor();
        let result = p
            .dispatch(&people(), "sample", &params(json!({"n": 3, "random_state": 9})))
            .await
            .unwrap();
        assert_eq!(result.data.row_count(), 3);
        assert_eq!(result.provenance["sampling_ratio"], json!(0.5));

        let again = p
            .dispatch(&people(), "sample", &params(json!({"n": 3, "random_state": 9})))
            .await
            .unwrap();
        assert_eq!(result.data, again.data);
    }

    #[tokio::test]
    async fn sample_conflicting_params_rejected() {
        let err = processor()
            .dispatch(&people(), "sample", &params(json!({"n": 3, "frac": 0.5})))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn describe_reports_statistics() {
        let result = processor()
            .dispatch(&people(), "describe", &params(json!({})))
            .await
            .unwrap();
        assert_eq!(result.provenance["columns_analyzed"], json!(["id", "age"]));
        let stats = result.provenance["statistics_computed"].as_array().unwrap();
        assert!(stats.contains(&json!("mean")));
    }

    #[tokio::test]
    async fn info_lists_every_column() {
        let result = processor()
            .dispatch(&people(), "info", &params(json!({})))
            .await
            .unwrap();
        assert_eq!(result.data.shape(), (4, 4));
        assert_eq!(
            result.data.column_names(),
            vec!["Column", "Non-Null Count", "Dtype", "Memory Usage"]
        );
        assert_eq!(result.provenance["row_count"], json!(6));
        assert_eq!(result.provenance["column_count"], json!(4));
    }

    #[tokio::test]
    async fn filter_applies_operator_grammar() {
        let result = processor()
            .dispatch(
                &people(),
                "filter",
                &params(json!({"conditions": {"age": {"gt": 50}}})),
            )
            .await
            .unwrap();
        assert_eq!(result.data.row_count(), 3);
        assert_eq!(result.provenance["rows_filtered"], json!(3));
        assert_eq!(
            result.provenance["applied_conditions"],
            json!(["age gt 50"])
        );
    }

    #[tokio::test]
    async fn filter_unknown_column_is_caller_error() {
        let err = processor()
            .dispatch(
                &people(),
                "filter",
                &params(json!({"conditions": {"salary": {"gt": 50}}})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn search_defaults_to_string_columns() {
        let result = processor()
            .dispatch(&people(), "search", &params(json!({"query": "AL"})))
            .await
            .unwrap();
        let names: Vec<String> = result.data.column("name").unwrap().cells().iter()
            .map(Cell::display_string).collect();
        assert_eq!(names, vec!["alice"]);
        assert_eq!(
            result.provenance["columns_searched"],
            json!(["name", "status"])
        );
    }

    #[tokio::test]
    async fn search_without_string_columns_is_caller_error() {
        let numbers = TableBuilder::new().int("a", vec![1, 2]).build().unwrap();
        let err = processor()
            .dispatch(&numbers, "search", &params(json!({"query": "1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn search_explicit_columns_coerce_values() {
        let result = processor()
            .dispatch(
                &people(),
                "search",
                &params(json!({"query": "5", "columns": ["age"]})),
            )
            .await
            .unwrap();
        assert_eq!(result.data.row_count(), 2); // 55 appears twice

        let err = processor()
            .dispatch(
                &people(),
                "search",
                &params(json!({"query": "x", "columns": ["ghost"]})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn value_counts_reports_uniques() {
        let result = processor()
            .dispatch(
                &people(),
                "value_counts",
                &params(json!({"column": "status"})),
            )
            .await
            .unwrap();
        assert_eq!(result.data.column_names(), vec!["Value", "Count"]);
        assert_eq!(result.provenance["unique_values"], json!(3));
        assert_eq!(result.provenance["total_values"], json!(6));
        assert_eq!(result.provenance["null_values"], json!(0));
    }

    #[tokio::test]
    async fn unknown_operation_rejected() {
        let err = processor()
            .dispatch(&people(), "pivot", &params(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }
}
